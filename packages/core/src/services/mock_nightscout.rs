//! Scripted stand-ins for the remote care service and the push service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alerts::notifier::{AlertMessage, DeliveryError, Notifier};
use crate::detection::{
    error::ProviderError,
    provider::{GlucoseDataProvider, ProviderResult},
    types::DataWindow,
};

/// Provider that replays queued errors, then serves a fixed window.
#[derive(Default)]
pub struct MockNightscoutClient {
    window: Mutex<DataWindow>,
    errors: Mutex<VecDeque<ProviderError>>,
    hang: bool,
    honour_since: bool,
    calls: AtomicUsize,
    /// `(readings_since, treatments_since)` of every fetch.
    pub requests: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    pub annotations: Mutex<Vec<String>>,
}

impl MockNightscoutClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(self, window: DataWindow) -> Self {
        *self.window.lock().unwrap() = window;
        self
    }

    pub fn with_error(self, error: ProviderError) -> Self {
        self.errors.lock().unwrap().push_back(error);
        self
    }

    /// Every fetch waits forever.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Treat the window as full history and serve only what each fetch asks for.
    pub fn honouring_since(mut self) -> Self {
        self.honour_since = true;
        self
    }

    pub fn push_error(&self, error: ProviderError) {
        self.errors.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GlucoseDataProvider for MockNightscoutClient {
    async fn fetch_window(
        &self,
        readings_since: DateTime<Utc>,
        treatments_since: DateTime<Utc>,
    ) -> ProviderResult<DataWindow> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((readings_since, treatments_since));
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.errors.lock().unwrap().pop_front() {
            return Err(error);
        }

        let mut window = self.window.lock().unwrap().clone();
        if self.honour_since {
            window.readings.retain(|r| r.timestamp >= readings_since);
            window.treatments.retain(|t| t.timestamp >= treatments_since);
        }
        Ok(window)
    }

    fn provider_name(&self) -> &str {
        "MockNightscout"
    }

    async fn annotate(&self, _at: DateTime<Utc>, note: &str) -> ProviderResult<()> {
        self.annotations.lock().unwrap().push(note.to_string());
        Ok(())
    }
}

/// Notifier that records what it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<AlertMessage>>,
    failures_left: AtomicUsize,
    hang: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` sends fail.
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Every send waits forever.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn sent(&self) -> Vec<AlertMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), DeliveryError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(DeliveryError::Rejected {
                status: 500,
                message: "push service unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn notifier_name(&self) -> &str {
        "Recording"
    }
}
