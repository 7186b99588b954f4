//! Urgent alert delivery.
//!
//! [`Notifier`] is the outbound collaborator; [`publisher::AlertPublisher`]
//! decides what reaches it and records every attempt.

pub mod publisher;
pub mod webhook;

use async_trait::async_trait;
use thiserror::Error;

use crate::care::types::Identity;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification transport error: {0}")]
    Transport(String),

    #[error("Notification rejected with HTTP {0}")]
    Rejected(u16),
}

/// Best-effort outbound notification channel.
#[async_trait]
pub trait Notifier {
    async fn notify(&self, message: &str, recipient: &Identity) -> Result<(), NotifyError>;
}

/// Notifier that only writes the message to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str, recipient: &Identity) -> Result<(), NotifyError> {
        tracing::warn!(
            "ALERT to {} {} ({}): {}",
            recipient.kind.as_str(),
            recipient.id,
            recipient.display_name,
            message
        );
        Ok(())
    }
}
