//! Threshold Evaluator
//!
//! Scores one set of clinical findings against four independent rule groups
//! (hemorrhage, infection, pain, psychosocial). Every group runs on every
//! call, and alerts come back in that fixed order.

use crate::care::types::*;

pub const HEMORRHAGE_BLOOD_LOSS_ML: i32 = 500;
pub const HYPOTENSION_SYSTOLIC_BP: i32 = 90;
pub const TACHYCARDIA_PULSE: i32 = 100;
pub const FEVER_TEMPERATURE_C: f64 = 38.0;
pub const SEVERE_PAIN_SCORE: i32 = 7;

pub const HEMORRHAGE_CODE: &str = "PPH_RISK";
pub const INFECTION_CODE: &str = "INFECTION_RISK";
pub const PAIN_CODE: &str = "PAIN_UNCONTROLLED";
pub const PSYCHOSOCIAL_CODE: &str = "PSYCHOSOCIAL_RISK";

/// Output of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub alerts: Vec<Alert>,
    /// `true` when any alert is URGENT.
    pub escalate_monitoring: bool,
    pub hemorrhage_protocol_activated: bool,
    pub referrals: ReferralSuggestions,
}

impl Evaluation {
    /// Findings as they should be recorded, with derived flags folded in.
    pub fn annotate(&self, findings: &ClinicalFindings) -> ClinicalFindings {
        let mut annotated = findings.clone();
        annotated.hemorrhage_protocol_activated |= self.hemorrhage_protocol_activated;
        annotated
    }

    pub fn has_alert(&self, alert_type: AlertType) -> bool {
        self.alerts.iter().any(|alert| alert.alert_type == alert_type)
    }
}

/// Evaluate raw findings. Pure and infallible.
pub fn evaluate(findings: &ClinicalFindings) -> Evaluation {
    let mut evaluation = Evaluation::default();

    if let Some(alert) = hemorrhage_alert(findings) {
        evaluation.hemorrhage_protocol_activated = true;
        evaluation.alerts.push(alert);
    }

    if let Some(alert) = infection_alert(findings) {
        evaluation.alerts.push(alert);
    }

    if let Some(alert) = pain_alert(findings) {
        evaluation.referrals.pain_management_referral_suggested = true;
        evaluation.alerts.push(alert);
    }

    let mood_concern = findings.mood_status.is_some_and(mood_needs_referral);
    let support_concern = findings.support_status.is_some_and(support_needs_referral);
    evaluation.referrals.mental_health_referral_suggested = mood_concern;
    evaluation.referrals.social_support_referral_suggested = support_concern;
    if let Some(alert) = psychosocial_alert(findings, mood_concern, support_concern) {
        evaluation.alerts.push(alert);
    }

    evaluation.escalate_monitoring = evaluation
        .alerts
        .iter()
        .any(|alert| alert.severity == AlertSeverity::Urgent);

    evaluation
}

fn tone_signals_hemorrhage(tone: FundusTone) -> bool {
    match tone {
        FundusTone::Firm => false,
        FundusTone::SlightlyBoggy | FundusTone::Boggy | FundusTone::Deviated => true,
    }
}

fn lochia_signals_hemorrhage(amount: LochiaAmount) -> bool {
    match amount {
        LochiaAmount::Scant | LochiaAmount::Light | LochiaAmount::Moderate => false,
        LochiaAmount::Heavy | LochiaAmount::Excessive => true,
    }
}

fn mood_needs_referral(mood: MoodStatus) -> bool {
    match mood {
        MoodStatus::Stable | MoodStatus::Anxious => false,
        MoodStatus::Depressed | MoodStatus::Tearful | MoodStatus::Withdrawn => true,
    }
}

fn support_needs_referral(support: SupportStatus) -> bool {
    match support {
        SupportStatus::Adequate => false,
        SupportStatus::Limited | SupportStatus::Absent => true,
    }
}

fn hemorrhage_alert(findings: &ClinicalFindings) -> Option<Alert> {
    let mut fields = Vec::new();
    let mut reasons = Vec::new();

    if findings.excessive_bleeding {
        fields.push("excessive_bleeding");
        reasons.push("excessive bleeding reported".to_string());
    }
    if let Some(ebl) = findings
        .estimated_blood_loss_ml
        .filter(|ebl| *ebl >= HEMORRHAGE_BLOOD_LOSS_ML)
    {
        fields.push("estimated_blood_loss_ml");
        reasons.push(format!("estimated blood loss {} mL", ebl));
    }
    if findings.uterine_atony_suspected {
        fields.push("uterine_atony_suspected");
        reasons.push("uterine atony suspected".to_string());
    }
    if findings.fundus_tone.is_some_and(tone_signals_hemorrhage) {
        fields.push("fundus_tone");
        reasons.push("fundus not firm".to_string());
    }
    if findings.lochia_amount.is_some_and(lochia_signals_hemorrhage) {
        fields.push("lochia_amount");
        reasons.push("heavy lochia".to_string());
    }
    if let Some(systolic) = findings
        .systolic_bp
        .filter(|bp| *bp < HYPOTENSION_SYSTOLIC_BP)
    {
        fields.push("systolic_bp");
        reasons.push(format!("systolic BP {} mmHg", systolic));
    }
    if let Some(pulse) = findings.pulse.filter(|pulse| *pulse > TACHYCARDIA_PULSE) {
        fields.push("pulse");
        reasons.push(format!("pulse {} bpm", pulse));
    }

    if fields.is_empty() {
        return None;
    }

    Some(Alert {
        alert_type: AlertType::Hemorrhage,
        severity: AlertSeverity::Urgent,
        code: HEMORRHAGE_CODE.to_string(),
        message: format!(
            "Possible postpartum hemorrhage: {}. Activate hemorrhage protocol.",
            reasons.join(", ")
        ),
        triggered_by: fields.join(","),
    })
}

fn infection_alert(findings: &ClinicalFindings) -> Option<Alert> {
    let mut fields = Vec::new();
    let mut reasons = Vec::new();

    if let Some(temperature) = findings
        .temperature_c
        .filter(|t| *t >= FEVER_TEMPERATURE_C)
    {
        fields.push("temperature_c");
        reasons.push(format!("temperature {:.1} C", temperature));
    }
    if findings.foul_lochia_odor {
        fields.push("foul_lochia_odor");
        reasons.push("foul-smelling lochia".to_string());
    }
    if findings.uterine_tenderness {
        fields.push("uterine_tenderness");
        reasons.push("uterine tenderness".to_string());
    }
    if findings.chills_or_rigors {
        fields.push("chills_or_rigors");
        reasons.push("chills or rigors".to_string());
    }

    if fields.is_empty() {
        return None;
    }

    Some(Alert {
        alert_type: AlertType::Infection,
        severity: AlertSeverity::Urgent,
        code: INFECTION_CODE.to_string(),
        message: format!("Possible postpartum infection: {}.", reasons.join(", ")),
        triggered_by: fields.join(","),
    })
}

fn pain_alert(findings: &ClinicalFindings) -> Option<Alert> {
    let score = findings.pain_score.filter(|s| *s >= SEVERE_PAIN_SCORE)?;

    Some(Alert {
        alert_type: AlertType::Pain,
        severity: AlertSeverity::Caution,
        code: PAIN_CODE.to_string(),
        message: format!(
            "Pain score {}/10. Review analgesia and consider pain management referral.",
            score
        ),
        triggered_by: "pain_score".to_string(),
    })
}

fn psychosocial_alert(
    findings: &ClinicalFindings,
    mood_concern: bool,
    support_concern: bool,
) -> Option<Alert> {
    let mut fields = Vec::new();
    let mut reasons = Vec::new();

    if mood_concern {
        fields.push("mood_status");
        reasons.push("mood concern noted");
    }
    if support_concern {
        fields.push("support_status");
        reasons.push("limited social support");
    }

    if fields.is_empty() {
        return None;
    }

    // Sleep is context for the message only; it never fires the rule alone.
    let sleep = match findings.sleep_status {
        Some(SleepStatus::Poor) => " Sleep reported as poor.",
        Some(SleepStatus::Adequate) | Some(SleepStatus::Interrupted) | None => "",
    };

    Some(Alert {
        alert_type: AlertType::Psychosocial,
        severity: AlertSeverity::Caution,
        code: PSYCHOSOCIAL_CODE.to_string(),
        message: format!(
            "Psychosocial follow-up needed: {}.{}",
            reasons.join(", "),
            sleep
        ),
        triggered_by: fields.join(","),
    })
}
