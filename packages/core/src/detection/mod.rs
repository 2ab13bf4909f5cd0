//! Missed-Bolus Detection Module
//!
//! Finds glucose rises with no recorded bolus to explain them, from a
//! window of CGM readings and treatment records.

pub mod config;
pub mod detector;
pub mod error;
pub mod nightscout_adapter;
pub mod provider;
pub mod types;


pub use config::DetectionConfig;
pub use detector::{detect, MissedBolusDetector};
pub use error::{DetectionError, ProviderError};
pub use provider::GlucoseDataProvider;
pub use types::*;
