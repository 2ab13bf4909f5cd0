//! Glucose Data Provider Interface
//!
//! Abstraction over where readings and treatments come from, so the poll
//! cycle can run against the remote care service or a test double.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::detection::{error::ProviderError, types::DataWindow};

/// Trait for sources of CGM readings and treatment records
#[async_trait]
pub trait GlucoseDataProvider {
    /// Fetch readings recorded at or after `readings_since` and treatments
    /// recorded at or after `treatments_since`.
    ///
    /// Treatments reach further back so that a rise starting at the edge of
    /// the readings still has its whole bolus lookback covered. Both lists
    /// come back oldest first.
    async fn fetch_window(
        &self,
        readings_since: DateTime<Utc>,
        treatments_since: DateTime<Utc>,
    ) -> Result<DataWindow, ProviderError>;

    /// Get the name of this provider for logging/debugging
    fn provider_name(&self) -> &str;

    /// Record a note against the source, where supported.
    async fn annotate(&self, _at: DateTime<Utc>, _note: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;
