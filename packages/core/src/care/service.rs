//! Observation recording.
//!
//! [`CareService::record_observation`] is the single write path: validate,
//! resolve identities, then resolve plan, evaluate, advance the schedule and
//! persist inside one write transaction. Urgent alerts are handed to a
//! background task after commit.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

use crate::alerts::publisher::AlertPublisher;
use crate::care::{
    config::MonitoringPolicy,
    error::CareError,
    evaluator::evaluate,
    resolver::{resolve_care_plan, PlanScope},
    schedule::{apply_observation, ScheduleInput, ScheduleOutcome},
    types::*,
};
use crate::metrics::AppMetrics;
use crate::repository::CareRepository;
use crate::services::directory::{resolve_recorder, IdentityResolver};

/// How far ahead of the server clock an observation time may be.
pub const MAX_FUTURE_SKEW_MINUTES: i64 = 15;

/// What one write transaction produced.
struct Persisted {
    observation: Observation,
    outcome: ScheduleOutcome,
    opened: bool,
}

#[derive(Clone)]
pub struct CareService {
    repository: Arc<CareRepository>,
    directory: Arc<dyn IdentityResolver + Send + Sync>,
    publisher: AlertPublisher,
    policy: MonitoringPolicy,
    metrics: Option<Arc<AppMetrics>>,
}

impl CareService {
    pub fn new(
        repository: Arc<CareRepository>,
        directory: Arc<dyn IdentityResolver + Send + Sync>,
        publisher: AlertPublisher,
        policy: MonitoringPolicy,
        metrics: Option<Arc<AppMetrics>>,
    ) -> Self {
        Self {
            repository,
            directory,
            publisher,
            policy,
            metrics,
        }
    }

    pub fn policy(&self) -> &MonitoringPolicy {
        &self.policy
    }

    pub fn repository(&self) -> &Arc<CareRepository> {
        &self.repository
    }

    pub async fn record_observation(
        &self,
        request: ObservationRequest,
    ) -> Result<ObservationResponse, CareError> {
        self.record_observation_at(request, Utc::now()).await
    }

    /// Record one observation against the clock value `now`.
    pub async fn record_observation_at(
        &self,
        request: ObservationRequest,
        now: DateTime<Utc>,
    ) -> Result<ObservationResponse, CareError> {
        validate_request(&request, now)?;

        let patient = self.directory.resolve_patient(request.patient_id).await?;
        self.directory.resolve_hospital(request.hospital_id).await?;
        if let Some(registration_id) = request.registration_id {
            let registration = self.directory.resolve_registration(registration_id).await?;
            if registration.patient_id != patient.id {
                return Err(CareError::validation(format!(
                    "registration {} does not belong to patient {}",
                    registration_id, patient.id
                )));
            }
        }
        let recorder = resolve_recorder(self.directory.as_ref(), &request.recorded_by).await?;

        let observation_time = request.observation_time.unwrap_or(now);
        let scope = PlanScope {
            patient_id: request.patient_id,
            hospital_id: request.hospital_id,
            registration_id: request.registration_id,
            delivery_occurred_at: request.delivery_occurred_at,
            explicit_plan_id: request.care_plan_id,
        };

        let mut tx = self.repository.begin().await?;
        let persisted = self
            .persist(&mut tx, request, &scope, observation_time, recorder.clone(), now)
            .await;
        let Persisted {
            observation,
            outcome,
            opened,
        } = match persisted {
            Ok(persisted) => {
                tx.commit().await?;
                persisted
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback after failed observation write: {}", rollback_err);
                }
                return Err(err);
            }
        };

        tracing::info!(
            "Recorded observation {} on care plan {} ({} alerts)",
            observation.id,
            observation.care_plan_id,
            observation.alerts.len()
        );
        self.log_outcome(&outcome, opened, &observation);

        // Delivery is best effort and must not hold up the response.
        self.publisher.dispatch(observation.clone(), patient, recorder);

        Ok(ObservationResponse::from(observation))
    }

    /// Resolve the plan, evaluate and advance it, and write both rows on `conn`.
    async fn persist(
        &self,
        conn: &mut SqliteConnection,
        request: ObservationRequest,
        scope: &PlanScope,
        observation_time: DateTime<Utc>,
        recorder: Identity,
        now: DateTime<Utc>,
    ) -> Result<Persisted, CareError> {
        let resolved = resolve_care_plan(conn, scope, &self.policy, now).await?;

        if let Some(prior_id) = request.supersedes_observation_id {
            let prior = CareRepository::find_observation(conn, prior_id)
                .await?
                .ok_or_else(|| {
                    CareError::validation(format!(
                        "corrected observation {} does not exist",
                        prior_id
                    ))
                })?;
            if prior.care_plan_id != resolved.plan.id {
                return Err(CareError::validation(format!(
                    "observation {} belongs to care plan {}, not {}",
                    prior_id, prior.care_plan_id, resolved.plan.id
                )));
            }
        }

        let evaluation = evaluate(&request.findings);
        let outcome = apply_observation(
            &resolved.plan,
            &ScheduleInput {
                observation_time,
                evaluation: &evaluation,
                controls: &request.controls,
                protocol: &request.protocol,
                discharge: &request.discharge,
            },
            &self.policy,
            now,
        );

        let mut observation = Observation {
            id: 0,
            care_plan_id: outcome.plan.id,
            observation_time,
            documented_at: now,
            late_entry: request.late_entry,
            original_entry_time: request.original_entry_time,
            recorded_by: recorder,
            findings: evaluation.annotate(&request.findings),
            protocol: request.protocol,
            discharge: request.discharge,
            signoff: request.signoff,
            referrals: evaluation.referrals,
            alerts: evaluation.alerts,
            schedule_phase_at_entry: outcome.snapshot.phase,
            next_due_at_snapshot: outcome.snapshot.next_due_at,
            overdue_since_snapshot: outcome.snapshot.overdue_since,
            supersedes_observation_id: request.supersedes_observation_id,
        };

        observation.id = CareRepository::insert_observation(conn, &observation).await?;
        CareRepository::update_plan(conn, &outcome.plan).await?;

        Ok(Persisted {
            observation,
            outcome,
            opened: resolved.opened,
        })
    }

    fn log_outcome(&self, outcome: &ScheduleOutcome, opened: bool, observation: &Observation) {
        if let Some(transition) = outcome.transition {
            tracing::info!(
                "Care plan {} moved {} -> {}",
                outcome.plan.id,
                transition.from.as_str(),
                transition.to.as_str()
            );
        }
        if outcome.escalated {
            tracing::warn!(
                "Care plan {} in enhanced monitoring every {} minutes: {}",
                outcome.plan.id,
                outcome.plan.shift_frequency_minutes,
                outcome.plan.escalation_reason.as_deref().unwrap_or("unspecified")
            );
        }

        let Some(metrics) = &self.metrics else {
            return;
        };
        metrics.observations_recorded_total.inc();
        if opened {
            metrics.care_plans_opened_total.inc();
        }
        if let Some(transition) = outcome.transition {
            metrics
                .phase_transitions_total
                .with_label_values(&[transition.from.as_str(), transition.to.as_str()])
                .inc();
        }
        for alert in &observation.alerts {
            metrics
                .alerts_raised_total
                .with_label_values(&[alert.alert_type.as_str(), alert.severity.as_str()])
                .inc();
        }
    }

    // ---- Reads ----

    pub async fn schedule(&self, care_plan_id: i64) -> Result<ScheduleView, CareError> {
        let plan = self
            .repository
            .fetch_plan(care_plan_id)
            .await?
            .ok_or_else(|| CareError::not_found("care plan", care_plan_id))?;
        Ok(ScheduleView::at(&plan, &self.policy, Utc::now()))
    }

    pub async fn active_schedule(
        &self,
        patient_id: i64,
        hospital_id: i64,
    ) -> Result<ScheduleView, CareError> {
        let plan = self
            .repository
            .fetch_active_plan(patient_id, hospital_id)
            .await?
            .ok_or_else(|| {
                CareError::not_found(
                    "active care plan",
                    format!("patient {} at hospital {}", patient_id, hospital_id),
                )
            })?;
        Ok(ScheduleView::at(&plan, &self.policy, Utc::now()))
    }

    pub async fn observation(&self, id: i64) -> Result<ObservationResponse, CareError> {
        self.repository
            .fetch_observation(id)
            .await?
            .map(ObservationResponse::from)
            .ok_or_else(|| CareError::not_found("observation", id))
    }

    pub async fn observations_for_plan(
        &self,
        care_plan_id: i64,
    ) -> Result<Vec<ObservationResponse>, CareError> {
        if self.repository.fetch_plan(care_plan_id).await?.is_none() {
            return Err(CareError::not_found("care plan", care_plan_id));
        }
        let observations = self.repository.list_observations(care_plan_id).await?;
        Ok(observations
            .into_iter()
            .map(ObservationResponse::from)
            .collect())
    }
}

/// Reject malformed requests before anything is read or written.
pub fn validate_request(request: &ObservationRequest, now: DateTime<Utc>) -> Result<(), CareError> {
    if request.patient_id <= 0 {
        return Err(CareError::validation("patient_id is required"));
    }
    if request.hospital_id <= 0 {
        return Err(CareError::validation("hospital_id is required"));
    }
    if request.recorded_by.trim().is_empty() {
        return Err(CareError::validation("recorded_by is required"));
    }

    if let Some(observed) = request.observation_time {
        if observed > now + Duration::minutes(MAX_FUTURE_SKEW_MINUTES) {
            return Err(CareError::validation(format!(
                "observation_time {} is in the future",
                observed.to_rfc3339()
            )));
        }
    }
    if request.late_entry && request.original_entry_time.is_none() {
        return Err(CareError::validation(
            "original_entry_time is required for a late entry",
        ));
    }

    let findings = &request.findings;
    if let Some(score) = findings.pain_score {
        if !(0..=10).contains(&score) {
            return Err(CareError::validation(format!(
                "pain_score must be between 0 and 10, got {}",
                score
            )));
        }
    }
    if let Some(ebl) = findings.estimated_blood_loss_ml {
        if ebl < 0 {
            return Err(CareError::validation(
                "estimated_blood_loss_ml must not be negative",
            ));
        }
    }

    let controls = &request.controls;
    for (field, value) in [
        ("shift_frequency_minutes", controls.shift_frequency_minutes),
        (
            "enhanced_monitoring_frequency_minutes",
            controls.enhanced_monitoring_frequency_minutes,
        ),
    ] {
        if value.is_some_and(|minutes| minutes <= 0) {
            return Err(CareError::validation(format!("{} must be positive", field)));
        }
    }

    Ok(())
}
