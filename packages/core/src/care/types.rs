//! Core data types for postpartum monitoring

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::care::config::MonitoringPolicy;

/// Monitoring regime a care plan is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulePhase {
    Immediate,
    ShiftBaseline,
    EnhancedMonitoring,
    DischargePlanning,
}

impl SchedulePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulePhase::Immediate => "IMMEDIATE",
            SchedulePhase::ShiftBaseline => "SHIFT_BASELINE",
            SchedulePhase::EnhancedMonitoring => "ENHANCED_MONITORING",
            SchedulePhase::DischargePlanning => "DISCHARGE_PLANNING",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SchedulePhase::DischargePlanning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundusTone {
    Firm,
    SlightlyBoggy,
    Boggy,
    Deviated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LochiaAmount {
    Scant,
    Light,
    Moderate,
    Heavy,
    Excessive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LochiaCharacter {
    Rubra,
    Serosa,
    Alba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoodStatus {
    Stable,
    Anxious,
    Tearful,
    Depressed,
    Withdrawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupportStatus {
    Adequate,
    Limited,
    #[serde(rename = "NONE")]
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SleepStatus {
    Adequate,
    Interrupted,
    Poor,
}

/// Clinical category of a safety alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    Hemorrhage,
    Infection,
    Pain,
    Psychosocial,
}

impl AlertType {
    /// Every category, in evaluation order.
    pub const ALL: [AlertType; 4] = [
        AlertType::Hemorrhage,
        AlertType::Infection,
        AlertType::Pain,
        AlertType::Psychosocial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Hemorrhage => "HEMORRHAGE",
            AlertType::Infection => "INFECTION",
            AlertType::Pain => "PAIN",
            AlertType::Psychosocial => "PSYCHOSOCIAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alert_type| alert_type.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Urgent,
    Caution,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Urgent => "URGENT",
            AlertSeverity::Caution => "CAUTION",
        }
    }
}

/// A safety alert embedded in an observation. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub code: String,
    pub message: String,
    /// Comma-separated names of the source fields that fired the rule.
    pub triggered_by: String,
}

/// Raw clinical findings captured in one check.
///
/// Every vital is optional; an absent value simply never fires its rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalFindings {
    pub temperature_c: Option<f64>,
    pub systolic_bp: Option<i32>,
    pub diastolic_bp: Option<i32>,
    pub pulse: Option<i32>,
    pub respirations: Option<i32>,
    pub pain_score: Option<i32>,

    pub fundus_height_cm: Option<i32>,
    pub fundus_tone: Option<FundusTone>,
    pub lochia_amount: Option<LochiaAmount>,
    pub lochia_character: Option<LochiaCharacter>,
    pub lochia_notes: Option<String>,
    pub perineum_findings: Option<String>,

    pub excessive_bleeding: bool,
    pub estimated_blood_loss_ml: Option<i32>,
    pub uterine_atony_suspected: bool,
    pub uterotonic_given: bool,
    pub hemorrhage_protocol_activated: bool,
    pub foul_lochia_odor: bool,
    pub uterine_tenderness: bool,
    pub chills_or_rigors: bool,

    pub mood_status: Option<MoodStatus>,
    pub support_status: Option<SupportStatus>,
    pub sleep_status: Option<SleepStatus>,
}

/// Protocol confirmations carried by an observation and OR-merged into the plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfirmations {
    pub hemorrhage_protocol_confirmed: bool,
    pub uterotonic_availability_confirmed: bool,
    pub rh_immunoglobulin_completed: bool,
    pub immunizations_updated: bool,
    pub contact_info_verified: bool,
}

impl ProtocolConfirmations {
    pub fn merge(&self, other: &ProtocolConfirmations) -> ProtocolConfirmations {
        ProtocolConfirmations {
            hemorrhage_protocol_confirmed: self.hemorrhage_protocol_confirmed
                || other.hemorrhage_protocol_confirmed,
            uterotonic_availability_confirmed: self.uterotonic_availability_confirmed
                || other.uterotonic_availability_confirmed,
            rh_immunoglobulin_completed: self.rh_immunoglobulin_completed
                || other.rh_immunoglobulin_completed,
            immunizations_updated: self.immunizations_updated || other.immunizations_updated,
            contact_info_verified: self.contact_info_verified || other.contact_info_verified,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DischargeReadiness {
    pub discharge_checklist_complete: bool,
    pub follow_up_contact_method: Option<String>,
    pub discharge_safety_notes: Option<String>,
    pub postpartum_visit_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Signoff {
    pub signed_off_by: Option<String>,
    pub signed_off_at: Option<DateTime<Utc>>,
    pub signoff_notes: Option<String>,
}

/// Referral suggestions derived by the evaluator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralSuggestions {
    pub pain_management_referral_suggested: bool,
    pub mental_health_referral_suggested: bool,
    pub social_support_referral_suggested: bool,
}

/// Optional cadence controls a caller may attach to an observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleControls {
    pub stabilization_confirmed: bool,
    pub shift_frequency_minutes: Option<i64>,
    pub enhanced_monitoring: bool,
    pub enhanced_monitoring_resolved: bool,
    pub enhanced_monitoring_frequency_minutes: Option<i64>,
    pub escalation_reason: Option<String>,
}

/// Frozen copy of a plan's schedule state at the moment an observation was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub phase: SchedulePhase,
    pub next_due_at: Option<DateTime<Utc>>,
    pub overdue_since: Option<DateTime<Utc>>,
}

/// One postpartum monitoring episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarePlan {
    pub id: i64,
    pub patient_id: i64,
    pub hospital_id: i64,
    pub registration_id: Option<i64>,
    pub delivery_occurred_at: Option<DateTime<Utc>>,

    pub active_phase: SchedulePhase,
    pub immediate_observations_completed: u32,
    pub immediate_observation_target: u32,
    pub immediate_window_completed: bool,
    pub stabilization_achieved_at: Option<DateTime<Utc>>,

    pub shift_frequency_minutes: i64,
    pub baseline_frequency_minutes: i64,
    pub next_due_at: Option<DateTime<Utc>>,
    pub overdue_since: Option<DateTime<Utc>>,
    pub escalation_reason: Option<String>,

    pub protocol: ProtocolConfirmations,
    pub mental_health_referral_outstanding: bool,
    pub social_support_referral_outstanding: bool,
    pub pain_followup_outstanding: bool,

    pub discharge_checklist_complete: bool,
    pub follow_up_contact_method: Option<String>,
    pub discharge_safety_notes: Option<String>,
    pub postpartum_visit_date: Option<NaiveDate>,

    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl CarePlan {
    pub fn snapshot(&self) -> ScheduleSnapshot {
        ScheduleSnapshot {
            phase: self.active_phase,
            next_due_at: self.next_due_at,
            overdue_since: self.overdue_since,
        }
    }
}

/// Kind of actor that recorded an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Staff,
    User,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Staff => "staff",
            IdentityKind::User => "user",
        }
    }
}

/// Resolved staff member or user acting as recorder and alert recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub kind: IdentityKind,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRef {
    pub id: i64,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HospitalRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRef {
    pub id: i64,
    pub patient_id: i64,
}

/// One point-in-time clinical check. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    pub care_plan_id: i64,
    pub observation_time: DateTime<Utc>,
    pub documented_at: DateTime<Utc>,
    pub late_entry: bool,
    pub original_entry_time: Option<DateTime<Utc>>,
    pub recorded_by: Identity,

    pub findings: ClinicalFindings,
    pub protocol: ProtocolConfirmations,
    pub discharge: DischargeReadiness,
    pub signoff: Signoff,
    pub referrals: ReferralSuggestions,
    pub alerts: Vec<Alert>,

    pub schedule_phase_at_entry: SchedulePhase,
    pub next_due_at_snapshot: Option<DateTime<Utc>>,
    pub overdue_since_snapshot: Option<DateTime<Utc>>,

    pub supersedes_observation_id: Option<i64>,
}

impl Observation {
    pub fn schedule_snapshot(&self) -> ScheduleSnapshot {
        ScheduleSnapshot {
            phase: self.schedule_phase_at_entry,
            next_due_at: self.next_due_at_snapshot,
            overdue_since: self.overdue_since_snapshot,
        }
    }

    pub fn urgent_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts
            .iter()
            .filter(|alert| alert.severity == AlertSeverity::Urgent)
    }
}

/// Inbound request to record one clinical check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationRequest {
    pub patient_id: i64,
    pub hospital_id: i64,
    #[serde(default)]
    pub registration_id: Option<i64>,
    #[serde(default)]
    pub care_plan_id: Option<i64>,
    /// Raw staff or user identifier of the person recording the check.
    pub recorded_by: String,
    #[serde(default)]
    pub delivery_occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub observation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub late_entry: bool,
    #[serde(default)]
    pub original_entry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub supersedes_observation_id: Option<i64>,

    #[serde(default)]
    pub findings: ClinicalFindings,
    #[serde(default)]
    pub protocol: ProtocolConfirmations,
    #[serde(default)]
    pub discharge: DischargeReadiness,
    #[serde(default)]
    pub signoff: Signoff,
    #[serde(default)]
    pub controls: ScheduleControls,
}

/// Observation returned to callers, with its schedule snapshot surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationResponse {
    #[serde(flatten)]
    pub observation: Observation,
    pub schedule: ScheduleSnapshot,
}

impl From<Observation> for ObservationResponse {
    fn from(observation: Observation) -> Self {
        let schedule = observation.schedule_snapshot();
        Self {
            observation,
            schedule,
        }
    }
}

/// Read-only schedule projection, evaluated against the clock at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleView {
    pub care_plan_id: i64,
    pub phase: SchedulePhase,
    pub active: bool,
    pub immediate_window_complete: bool,
    pub immediate_checks_completed: u32,
    pub immediate_check_target: u32,
    pub frequency_minutes: i64,
    pub next_due_at: Option<DateTime<Utc>>,
    pub overdue_since: Option<DateTime<Utc>>,
    pub overdue: bool,
    pub escalation_reason: Option<String>,
}

impl ScheduleView {
    /// Project `plan` at `now`. While the plan is in IMMEDIATE the reported
    /// cadence is the policy's immediate interval, not the stored shift one.
    pub fn at(plan: &CarePlan, policy: &MonitoringPolicy, now: DateTime<Utc>) -> Self {
        let overdue_since = if plan.active && !plan.active_phase.is_terminal() {
            plan.next_due_at.filter(|due| *due < now)
        } else {
            None
        };

        Self {
            care_plan_id: plan.id,
            phase: plan.active_phase,
            active: plan.active,
            immediate_window_complete: plan.immediate_window_completed,
            immediate_checks_completed: plan.immediate_observations_completed,
            immediate_check_target: plan.immediate_observation_target,
            frequency_minutes: match plan.active_phase {
                SchedulePhase::Immediate => policy.immediate_interval_minutes,
                _ => plan.shift_frequency_minutes,
            },
            next_due_at: plan.next_due_at,
            overdue_since,
            overdue: overdue_since.is_some(),
            escalation_reason: plan.escalation_reason.clone(),
        }
    }
}
