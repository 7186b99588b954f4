//! CarePlan Resolver
//!
//! Finds or opens the single active plan for a (patient, hospital) pair.
//! Runs on the caller's connection so the lookup, the insert and the later
//! plan update share one transaction.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::care::{config::MonitoringPolicy, error::CareError, schedule::open_plan, types::CarePlan};
use crate::repository::{is_unique_violation, CareRepository};

/// Scope of a single resolve call.
#[derive(Debug, Clone, Copy)]
pub struct PlanScope {
    pub patient_id: i64,
    pub hospital_id: i64,
    pub registration_id: Option<i64>,
    pub delivery_occurred_at: Option<DateTime<Utc>>,
    pub explicit_plan_id: Option<i64>,
}

/// Plan found or opened by [`resolve_care_plan`].
#[derive(Debug, Clone)]
pub struct Resolved {
    pub plan: CarePlan,
    /// `true` when this call inserted the plan.
    pub opened: bool,
}

/// Locate or create the plan an observation belongs to.
pub async fn resolve_care_plan(
    conn: &mut SqliteConnection,
    scope: &PlanScope,
    policy: &MonitoringPolicy,
    now: DateTime<Utc>,
) -> Result<Resolved, CareError> {
    if let Some(plan_id) = scope.explicit_plan_id {
        let plan = CareRepository::find_plan(&mut *conn, plan_id)
            .await?
            .ok_or_else(|| CareError::not_found("care plan", plan_id))?;

        if plan.patient_id != scope.patient_id || plan.hospital_id != scope.hospital_id {
            return Err(CareError::validation(format!(
                "care plan {} does not belong to patient {} at hospital {}",
                plan_id, scope.patient_id, scope.hospital_id
            )));
        }
        return Ok(Resolved {
            plan,
            opened: false,
        });
    }

    if let Some(plan) =
        CareRepository::find_active_plan(&mut *conn, scope.patient_id, scope.hospital_id).await?
    {
        return reuse(conn, plan, scope).await;
    }

    let delivery = scope.delivery_occurred_at.unwrap_or(now);
    let mut plan = open_plan(
        scope.patient_id,
        scope.hospital_id,
        scope.registration_id,
        delivery,
        policy,
        now,
    );

    match CareRepository::insert_plan(&mut *conn, &plan).await {
        Ok(id) => {
            plan.id = id;
            tracing::info!(
                "Opened care plan {} for patient {} at hospital {}",
                id,
                scope.patient_id,
                scope.hospital_id
            );
            Ok(Resolved { plan, opened: true })
        }
        Err(err) if is_unique_violation(&err) => {
            // Lost the race to a concurrent first observation.
            tracing::warn!(
                "Active care plan for patient {} created concurrently; reusing it",
                scope.patient_id
            );
            let plan =
                CareRepository::find_active_plan(&mut *conn, scope.patient_id, scope.hospital_id)
                    .await?
                    .ok_or_else(|| CareError::not_found("care plan", scope.patient_id))?;
            reuse(conn, plan, scope).await
        }
        Err(err) => Err(err.into()),
    }
}

async fn reuse(
    conn: &mut SqliteConnection,
    mut plan: CarePlan,
    scope: &PlanScope,
) -> Result<Resolved, CareError> {
    let mut changed = false;

    if plan.registration_id.is_none() && scope.registration_id.is_some() {
        plan.registration_id = scope.registration_id;
        changed = true;
    }
    if plan.delivery_occurred_at.is_none() && scope.delivery_occurred_at.is_some() {
        plan.delivery_occurred_at = scope.delivery_occurred_at;
        changed = true;
    }

    if changed {
        CareRepository::update_plan(&mut *conn, &plan).await?;
        tracing::info!("Backfilled care plan {}", plan.id);
    }
    tracing::info!(
        "Reusing active care plan {} for patient {}",
        plan.id,
        plan.patient_id
    );
    Ok(Resolved {
        plan,
        opened: false,
    })
}
