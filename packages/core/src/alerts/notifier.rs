//! Caregiver notification interface.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Delivery urgency, mapped onto the transport's own levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Priority {
    Normal,
    High,
    Emergency,
}

/// A formatted notification ready to dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMessage {
    pub title: String,
    pub body: String,
    pub priority: Priority,
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Notification network error: {message}")]
    Network { message: String },

    #[error("Notification rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Notification timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// A channel that can deliver an [`AlertMessage`] to the caregiver.
#[async_trait]
pub trait Notifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), DeliveryError>;

    fn notifier_name(&self) -> &str;
}
