//! Alert Publisher
//!
//! Forwards the URGENT alerts of a recorded observation to the notifier and
//! logs each attempt to `alert_events`. Runs after the observation is
//! committed, so nothing here can fail the caller. [`AlertPublisher::dispatch`]
//! moves delivery onto its own task so a slow notifier never delays the
//! recording request.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::alerts::Notifier;
use crate::care::types::{Alert, Identity, Observation, PatientRef};
use crate::metrics::AppMetrics;
use crate::repository::{timestamp, AlertEvent, CareRepository};

/// Text handed to the notifier for one alert.
pub fn format_alert(alert: &Alert, patient: &PatientRef) -> String {
    format!(
        "{} alert for {}: {}",
        alert.alert_type.as_str(),
        patient.display_name,
        alert.message
    )
}

#[derive(Clone)]
pub struct AlertPublisher {
    notifier: Arc<dyn Notifier + Send + Sync>,
    repository: Arc<CareRepository>,
    metrics: Option<Arc<AppMetrics>>,
}

impl AlertPublisher {
    pub fn new(
        notifier: Arc<dyn Notifier + Send + Sync>,
        repository: Arc<CareRepository>,
        metrics: Option<Arc<AppMetrics>>,
    ) -> Self {
        Self {
            notifier,
            repository,
            metrics,
        }
    }

    /// Publish on a background task. Returns `None` when there is nothing
    /// urgent to send.
    pub fn dispatch(
        &self,
        observation: Observation,
        patient: PatientRef,
        recipient: Identity,
    ) -> Option<JoinHandle<usize>> {
        if observation.urgent_alerts().next().is_none() {
            return None;
        }
        let publisher = self.clone();
        Some(tokio::spawn(async move {
            publisher.publish(&observation, &patient, &recipient).await
        }))
    }

    /// Notify `recipient` of every urgent alert on `observation`.
    ///
    /// Returns the number of notifications the notifier accepted.
    pub async fn publish(
        &self,
        observation: &Observation,
        patient: &PatientRef,
        recipient: &Identity,
    ) -> usize {
        let mut delivered_count = 0;

        for alert in observation.urgent_alerts() {
            let message = format_alert(alert, patient);

            let delivered = match self.notifier.notify(&message, recipient).await {
                Ok(()) => {
                    tracing::info!(
                        "Published {} alert for observation {}",
                        alert.alert_type.as_str(),
                        observation.id
                    );
                    true
                }
                Err(err) => {
                    tracing::error!(
                        "Failed to publish {} alert for observation {}: {}",
                        alert.alert_type.as_str(),
                        observation.id,
                        err
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.alert_notifications_failed_total.inc();
                    }
                    false
                }
            };
            if delivered {
                delivered_count += 1;
            }

            let event = AlertEvent {
                id: None,
                observation_id: observation.id,
                care_plan_id: observation.care_plan_id,
                alert_type: alert.alert_type.as_str().to_string(),
                severity: alert.severity.as_str().to_string(),
                code: alert.code.clone(),
                message,
                recipient_id: recipient.id,
                recipient_kind: recipient.kind.as_str().to_string(),
                delivered,
                triggered_at: timestamp(Utc::now()),
            };

            if let Err(err) = self.repository.log_alert_event(&event).await {
                tracing::error!(
                    "Failed to log alert event for observation {}: {}",
                    observation.id,
                    err
                );
            }
        }

        delivered_count
    }
}
