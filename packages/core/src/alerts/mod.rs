//! Alert deduplication and delivery.

pub mod fingerprint;
pub mod message;
pub mod notifier;
pub mod pushover;
pub mod state;

pub use fingerprint::Fingerprint;
pub use notifier::{AlertMessage, DeliveryError, Notifier, Priority};
pub use state::{AlertDecision, AlertPolicy, AlertStateStore, StoreError};
