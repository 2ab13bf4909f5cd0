//! Error types for detection and data fetching

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by the detection engine. Both indicate a window that
/// cannot be analysed as given; nothing here is corrected in place.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Insufficient data for detection: {available} reading(s), need at least 2")]
    InsufficientData { available: usize },

    #[error("Readings out of order at index {index}: {current} does not follow {previous}")]
    OutOfOrderData {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

/// Errors from glucose/treatment data providers
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Remote service returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Data format error: {message}")]
    FormatError { message: String },

    #[error("Authentication error: {message}")]
    AuthError { message: String },
}

impl ProviderError {
    /// Transient failures are worth retrying after a backoff delay.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkError { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status } => *status == 429 || *status >= 500,
            Self::FormatError { .. } | Self::AuthError { .. } => false,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::FormatError { message: message.into() }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::FormatError { message: err.to_string() }
        } else {
            Self::NetworkError { message: err.to_string() }
        }
    }

    pub(crate) fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            401 | 403 => Self::AuthError {
                message: format!("remote service rejected credentials (HTTP {})", status),
            },
            code => Self::HttpStatus { status: code },
        }
    }
}
