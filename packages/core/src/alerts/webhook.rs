//! Webhook alert delivery.
//!
//! POSTs one JSON document per urgent alert to a configured endpoint. Any
//! non-2xx answer counts as a rejection.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::alerts::{Notifier, NotifyError};
use crate::care::types::Identity;

/// Body sent to the webhook endpoint.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    message: &'a str,
    recipient_id: i64,
    recipient_name: &'a str,
    recipient_kind: &'a str,
}

#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    http: Client,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| NotifyError::Transport(err.to_string()))?;

        Ok(Self { url, http })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str, recipient: &Identity) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            message,
            recipient_id: recipient.id,
            recipient_name: &recipient.display_name,
            recipient_kind: recipient.kind.as_str(),
        };

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }

        tracing::debug!("Webhook {} accepted alert", self.url);
        Ok(())
    }
}
