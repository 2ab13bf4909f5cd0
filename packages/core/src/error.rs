use thiserror::Error;

use crate::alerts::{DeliveryError, StoreError};
use crate::detection::{DetectionError, ProviderError};

/// Unified application error.
///
/// Lower layers raise their own typed errors; these variants are the
/// classes the poll loop acts on (retry, skip, or abort).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Transient network error: {0}")]
    TransientNetwork(ProviderError),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Notification delivery error: {0}")]
    NotificationDelivery(#[from] DeliveryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Retry budget exhausted after {failures} consecutive failed cycles")]
    RetryBudgetExhausted { failures: u32 },
}

impl AppError {
    /// Process exit code for an error that ends the program.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 1,
            AppError::RetryBudgetExhausted { .. } => 2,
            _ => 3,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientNetwork(_))
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        if err.is_transient() {
            AppError::TransientNetwork(err)
        } else {
            AppError::DataIntegrity(err.to_string())
        }
    }
}

impl From<DetectionError> for AppError {
    fn from(err: DetectionError) -> Self {
        AppError::DataIntegrity(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(StoreError::Database(err))
    }
}
