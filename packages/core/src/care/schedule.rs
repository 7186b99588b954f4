//! Schedule Phase Engine
//!
//! Pure state machine over [`SchedulePhase`]. Given the current plan and one
//! evaluated observation it returns the next plan state and the snapshot to
//! stamp onto that observation. Persisting the result is the caller's job.
//!
//! ```text
//! IMMEDIATE -> SHIFT_BASELINE -> (ENHANCED_MONITORING <-> SHIFT_BASELINE)* -> DISCHARGE_PLANNING
//! ```
//!
//! Escalation signals during IMMEDIATE only record `escalation_reason`. The
//! observation that completes the immediate phase passes through
//! SHIFT_BASELINE and lands in ENHANCED_MONITORING if a reason is still held.

use chrono::{DateTime, Duration, Utc};

use crate::care::{
    config::MonitoringPolicy,
    evaluator::Evaluation,
    types::*,
};

/// Everything the engine needs to know about one observation.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleInput<'a> {
    pub observation_time: DateTime<Utc>,
    pub evaluation: &'a Evaluation,
    pub controls: &'a ScheduleControls,
    pub protocol: &'a ProtocolConfirmations,
    pub discharge: &'a DischargeReadiness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: SchedulePhase,
    pub to: SchedulePhase,
}

/// Result of applying one observation to a plan.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub plan: CarePlan,
    pub snapshot: ScheduleSnapshot,
    pub transition: Option<PhaseTransition>,
    /// `true` when this observation moved or kept the plan in enhanced monitoring.
    pub escalated: bool,
}

/// Build the initial state of a freshly opened plan.
pub fn open_plan(
    patient_id: i64,
    hospital_id: i64,
    registration_id: Option<i64>,
    delivery_occurred_at: DateTime<Utc>,
    policy: &MonitoringPolicy,
    now: DateTime<Utc>,
) -> CarePlan {
    let baseline = policy.baseline_frequency(None);
    let next_due_at = delivery_occurred_at + policy.immediate_interval();

    CarePlan {
        id: 0,
        patient_id,
        hospital_id,
        registration_id,
        delivery_occurred_at: Some(delivery_occurred_at),
        active_phase: SchedulePhase::Immediate,
        immediate_observations_completed: 0,
        immediate_observation_target: policy.immediate_observation_target,
        immediate_window_completed: false,
        stabilization_achieved_at: None,
        shift_frequency_minutes: baseline,
        baseline_frequency_minutes: baseline,
        next_due_at: Some(next_due_at),
        overdue_since: overdue_since(Some(next_due_at), now),
        escalation_reason: None,
        protocol: ProtocolConfirmations::default(),
        mental_health_referral_outstanding: false,
        social_support_referral_outstanding: false,
        pain_followup_outstanding: false,
        discharge_checklist_complete: false,
        follow_up_contact_method: None,
        discharge_safety_notes: None,
        postpartum_visit_date: None,
        active: true,
        created_at: now,
        closed_at: None,
    }
}

/// Apply one evaluated observation to `plan`.
pub fn apply_observation(
    plan: &CarePlan,
    input: &ScheduleInput<'_>,
    policy: &MonitoringPolicy,
    now: DateTime<Utc>,
) -> ScheduleOutcome {
    let from = plan.active_phase;
    let mut next = plan.clone();

    next.protocol = next.protocol.merge(input.protocol);

    // Closed plans keep their schedule frozen.
    if from.is_terminal() {
        return finish(next, from, false);
    }

    merge_referrals(&mut next, &input.evaluation.referrals);

    if input.discharge.discharge_checklist_complete {
        close_plan(&mut next, input.discharge, now);
        return finish(next, from, false);
    }

    if next.active_phase == SchedulePhase::Immediate {
        advance_immediate(&mut next, input, policy);
    } else if let Some(requested) = input.controls.shift_frequency_minutes {
        next.baseline_frequency_minutes = policy.clamp_frequency(requested);
        if next.active_phase == SchedulePhase::ShiftBaseline {
            next.shift_frequency_minutes = next.baseline_frequency_minutes;
        }
    }

    let escalate = input.evaluation.escalate_monitoring || input.controls.enhanced_monitoring;
    let resolved = input.controls.enhanced_monitoring_resolved;
    // A signal raised during IMMEDIATE is held on the plan until the phase completes.
    let held = from == SchedulePhase::Immediate && next.escalation_reason.is_some() && !resolved;
    let mut escalated = false;
    let phase = next.active_phase;

    match phase {
        SchedulePhase::ShiftBaseline | SchedulePhase::EnhancedMonitoring if escalate || held => {
            next.active_phase = SchedulePhase::EnhancedMonitoring;
            next.shift_frequency_minutes = policy.enhanced_frequency(
                input.controls.enhanced_monitoring_frequency_minutes,
                next.baseline_frequency_minutes,
            );
            if escalate {
                next.escalation_reason = Some(escalation_reason(input));
            }
            escalated = true;
        }
        SchedulePhase::EnhancedMonitoring if resolved => {
            next.active_phase = SchedulePhase::ShiftBaseline;
            next.shift_frequency_minutes = policy.clamp_frequency(next.baseline_frequency_minutes);
            next.escalation_reason = None;
        }
        // The immediate cadence is already tighter than any enhanced one.
        SchedulePhase::Immediate if escalate => {
            next.escalation_reason = Some(escalation_reason(input));
        }
        SchedulePhase::Immediate | SchedulePhase::ShiftBaseline if resolved => {
            next.escalation_reason = None;
        }
        SchedulePhase::Immediate
        | SchedulePhase::ShiftBaseline
        | SchedulePhase::EnhancedMonitoring
        | SchedulePhase::DischargePlanning => {}
    }

    let interval = match next.active_phase {
        SchedulePhase::Immediate => policy.immediate_interval(),
        _ => Duration::minutes(next.shift_frequency_minutes),
    };
    next.next_due_at = Some(input.observation_time + interval);
    next.overdue_since = overdue_since(next.next_due_at, now);

    finish(next, from, escalated)
}

/// `next_due_at` when it lies strictly before `now`.
pub fn overdue_since(
    next_due_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    next_due_at.filter(|due| *due < now)
}

fn advance_immediate(plan: &mut CarePlan, input: &ScheduleInput<'_>, policy: &MonitoringPolicy) {
    plan.immediate_observations_completed = plan.immediate_observations_completed.saturating_add(1);

    let target_met = plan.immediate_observations_completed >= plan.immediate_observation_target;
    let window_elapsed = plan
        .delivery_occurred_at
        .is_some_and(|delivery| input.observation_time > delivery + policy.immediate_window());

    if target_met || window_elapsed || input.controls.stabilization_confirmed {
        let baseline = policy.baseline_frequency(input.controls.shift_frequency_minutes);
        plan.active_phase = SchedulePhase::ShiftBaseline;
        plan.immediate_window_completed = true;
        plan.stabilization_achieved_at = Some(input.observation_time);
        plan.baseline_frequency_minutes = baseline;
        plan.shift_frequency_minutes = baseline;
    }
}

fn merge_referrals(plan: &mut CarePlan, referrals: &ReferralSuggestions) {
    plan.mental_health_referral_outstanding |= referrals.mental_health_referral_suggested;
    plan.social_support_referral_outstanding |= referrals.social_support_referral_suggested;
    plan.pain_followup_outstanding |= referrals.pain_management_referral_suggested;
}

fn close_plan(plan: &mut CarePlan, discharge: &DischargeReadiness, now: DateTime<Utc>) {
    plan.active_phase = SchedulePhase::DischargePlanning;
    plan.next_due_at = None;
    plan.overdue_since = None;
    plan.escalation_reason = None;
    plan.active = false;
    plan.closed_at = Some(now);

    plan.discharge_checklist_complete = true;
    if discharge.follow_up_contact_method.is_some() {
        plan.follow_up_contact_method = discharge.follow_up_contact_method.clone();
    }
    if discharge.discharge_safety_notes.is_some() {
        plan.discharge_safety_notes = discharge.discharge_safety_notes.clone();
    }
    if discharge.postpartum_visit_date.is_some() {
        plan.postpartum_visit_date = discharge.postpartum_visit_date;
    }

    // Outstanding referrals are handed off with the discharge checklist.
    plan.mental_health_referral_outstanding = false;
    plan.social_support_referral_outstanding = false;
    plan.pain_followup_outstanding = false;
}

fn escalation_reason(input: &ScheduleInput<'_>) -> String {
    if let Some(reason) = input.controls.escalation_reason.as_ref() {
        return reason.clone();
    }

    let codes: Vec<&str> = input
        .evaluation
        .alerts
        .iter()
        .filter(|alert| alert.severity == AlertSeverity::Urgent)
        .map(|alert| alert.code.as_str())
        .collect();

    if codes.is_empty() {
        "Enhanced monitoring requested".to_string()
    } else {
        format!("Urgent alerts: {}", codes.join(", "))
    }
}

fn finish(plan: CarePlan, from: SchedulePhase, escalated: bool) -> ScheduleOutcome {
    let transition = (plan.active_phase != from).then_some(PhaseTransition {
        from,
        to: plan.active_phase,
    });

    ScheduleOutcome {
        snapshot: plan.snapshot(),
        plan,
        transition,
        escalated,
    }
}
