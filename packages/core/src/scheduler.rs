//! Poll cycle scheduler.
//!
//! Drives the main loop: each cycle fetches the lookback window from the
//! data provider, runs the detector, filters episodes through the alert
//! state store, notifies for the ones that pass, and records them. Exactly
//! one cycle runs at a time; a shutdown request is honoured between cycles
//! so the alert state is never left half-updated.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time;

use crate::alerts::{message, AlertDecision, AlertMessage, AlertStateStore, DeliveryError, Notifier};
use crate::backoff::BackoffPolicy;
use crate::clock::Clock;
use crate::config::Config;
use crate::detection::{
    DataWindow, Episode, GlucoseDataProvider, MissedBolusDetector, ProviderError,
};
use crate::error::AppError;
use crate::metrics::AppMetrics;

/// Where the loop is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    Evaluating,
    Notifying,
    Stopped,
}

/// Timing and failure-handling knobs for the loop.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// How far back readings are fetched.
    pub lookback: chrono::Duration,
    /// Extra reach for treatments, so a rise at the oldest reading still has
    /// its whole bolus lookback in view.
    pub bolus_lookback: chrono::Duration,
    pub backoff: BackoffPolicy,
    /// Consecutive failed fetches tolerated before the loop gives up.
    pub max_consecutive_failures: Option<u32>,
    /// Consecutive failed fetches before a "detector unavailable" notice; 0 disables it.
    pub unavailable_notify_after: u32,
    pub annotate: bool,
}

impl PollSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            request_timeout: config.request_timeout,
            lookback: config.lookback_span(),
            bolus_lookback: config.detection.bolus_lookback,
            backoff: config.backoff.clone(),
            max_consecutive_failures: config.max_consecutive_failures,
            unavailable_notify_after: config.unavailable_notify_after,
            annotate: config.annotate_nightscout,
        }
    }
}

/// What a completed cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub episodes: usize,
    pub alerts_sent: usize,
    pub suppressed: usize,
    pub delivery_failures: usize,
    pub storage_failures: usize,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Nothing was evaluated or recorded this cycle.
    Skipped(AppError),
}

pub struct PollCycle {
    provider: Arc<dyn GlucoseDataProvider + Send + Sync>,
    notifier: Arc<dyn Notifier + Send + Sync>,
    clock: Arc<dyn Clock + Send + Sync>,
    store: AlertStateStore,
    detector: MissedBolusDetector,
    settings: PollSettings,
    metrics: Option<Arc<AppMetrics>>,
    state: CycleState,
    /// Skipped cycles of any kind since the last completed one.
    consecutive_failures: u32,
    /// Failed fetches since the last successful one.
    fetch_failures: u32,
    transient_failures: u32,
    unavailable_notified: bool,
}

impl PollCycle {
    pub fn new(
        provider: Arc<dyn GlucoseDataProvider + Send + Sync>,
        notifier: Arc<dyn Notifier + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        store: AlertStateStore,
        detector: MissedBolusDetector,
        settings: PollSettings,
    ) -> Self {
        Self {
            provider,
            notifier,
            clock,
            store,
            detector,
            settings,
            metrics: None,
            state: CycleState::Idle,
            consecutive_failures: 0,
            fetch_failures: 0,
            transient_failures: 0,
            unavailable_notified: false,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn fetch_failures(&self) -> u32 {
        self.fetch_failures
    }

    pub fn store(&self) -> &AlertStateStore {
        &self.store
    }

    /// Run the loop until `shutdown` flips to `true` (or its sender goes away).
    ///
    /// Returns an error only when a configured retry budget for fetches is
    /// exhausted.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), AppError> {
        tracing::info!(
            "Polling {} every {}s (lookback {} min), alerting via {}",
            self.provider.provider_name(),
            self.settings.poll_interval.as_secs(),
            self.settings.lookback.num_minutes(),
            self.notifier.notifier_name()
        );

        while !*shutdown.borrow() {
            let outcome = self.run_cycle().await;

            if let Some(budget) = self.settings.max_consecutive_failures {
                if self.fetch_failures > budget {
                    self.state = CycleState::Stopped;
                    tracing::error!(
                        "Giving up after {} consecutive failed fetches",
                        self.fetch_failures
                    );
                    return Err(AppError::RetryBudgetExhausted {
                        failures: self.fetch_failures,
                    });
                }
            }

            let delay = self.next_delay(&outcome);
            tracing::debug!("Next cycle in {:?}", delay);

            tokio::select! {
                _ = time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.state = CycleState::Stopped;
        tracing::info!("Polling stopped cleanly");
        Ok(())
    }

    /// Delay before the next cycle: backoff after a transient failure,
    /// the regular interval otherwise.
    pub fn next_delay(&self, outcome: &CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::Skipped(err) if err.is_transient() => {
                self.settings.backoff.delay(self.transient_failures)
            }
            _ => self.settings.poll_interval,
        }
    }

    /// Execute one fetch → detect → filter → notify → record pass.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let started = Instant::now();
        if let Some(m) = &self.metrics {
            m.polls_total.inc();
        }

        let now = self.clock.now();
        self.state = CycleState::Fetching;
        let window = match self.fetch(now).await {
            Ok(window) => window,
            Err(err) => {
                self.fetch_failures += 1;
                return self.fail(err).await;
            }
        };
        self.fetch_failures = 0;
        self.unavailable_notified = false;

        if let (Some(m), Some(latest)) = (&self.metrics, window.latest_reading()) {
            m.last_glucose_mgdl.set(latest.value_mgdl);
        }

        self.state = CycleState::Evaluating;
        let episodes = match self.detector.detect(&window) {
            Ok(episodes) => episodes,
            Err(err) => return self.fail(err.into()).await,
        };
        if let Some(m) = &self.metrics {
            m.episodes_detected_total.inc_by(episodes.len() as f64);
        }

        self.state = CycleState::Notifying;
        let mut report = CycleReport {
            episodes: episodes.len(),
            ..CycleReport::default()
        };
        for episode in &episodes {
            self.handle_episode(episode, &window, now, &mut report).await;
        }

        if let Err(err) = self.store.prune(now).await {
            tracing::warn!("Failed to prune alert state: {}", err);
        }

        self.recover();
        self.state = CycleState::Idle;
        if let Some(m) = &self.metrics {
            m.cycle_duration.observe(started.elapsed().as_secs_f64());
        }

        tracing::info!(
            "Cycle complete: {} reading(s), {} episode(s), {} alert(s) sent, {} suppressed",
            window.readings.len(),
            report.episodes,
            report.alerts_sent,
            report.suppressed
        );
        CycleOutcome::Completed(report)
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<DataWindow, AppError> {
        let readings_since = now - self.settings.lookback;
        let treatments_since = readings_since - self.settings.bolus_lookback;
        let request = self.provider.fetch_window(readings_since, treatments_since);
        match time::timeout(self.settings.request_timeout, request).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(ProviderError::Timeout {
                seconds: self.settings.request_timeout.as_secs(),
            }
            .into()),
        }
    }

    async fn handle_episode(
        &mut self,
        episode: &Episode,
        window: &DataWindow,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let (prior_sends, escalated) = match self.store.decide(episode, now) {
            AlertDecision::Suppressed {
                fingerprint,
                eligible_at,
                ..
            } => {
                report.suppressed += 1;
                if let Some(m) = &self.metrics {
                    m.alerts_suppressed_total.inc();
                }
                tracing::debug!(
                    "Episode {} in cooldown until {}",
                    fingerprint,
                    eligible_at.format("%H:%M")
                );
                return;
            }
            AlertDecision::Send {
                prior_sends,
                escalated,
                ..
            } => (prior_sends, escalated),
        };

        let carbs = self.detector.unbolused_carbs(episode, &window.treatments);
        let alert = message::episode_alert(episode, &carbs, escalated, prior_sends);

        if let Err(err) = self.deliver(&alert).await {
            // Not recorded, so the episode stays eligible next cycle.
            report.delivery_failures += 1;
            tracing::warn!("Alert delivery failed, will retry next cycle: {}", err);
            return;
        }

        match self.store.record_alert(episode, now).await {
            Ok(record) => {
                report.alerts_sent += 1;
                if let Some(m) = &self.metrics {
                    m.alerts_sent_total.inc();
                }
                tracing::info!(
                    "Missed-bolus alert sent for rise of {:.0} mg/dL starting {} (send #{}{})",
                    episode.delta_mgdl,
                    episode.start_ts.format("%H:%M"),
                    record.send_count,
                    if escalated { ", escalated" } else { "" }
                );
            }
            Err(err) => {
                report.storage_failures += 1;
                tracing::error!("Alert sent but not recorded: {}", err);
            }
        }

        if self.settings.annotate {
            let note = message::annotation(episode);
            match time::timeout(
                self.settings.request_timeout,
                self.provider.annotate(now, &note),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!("Failed to annotate care record: {}", err),
                Err(_) => tracing::warn!("Timed out annotating care record"),
            }
        }
    }

    async fn deliver(&self, alert: &AlertMessage) -> Result<(), DeliveryError> {
        let result = match time::timeout(self.settings.request_timeout, self.notifier.send(alert)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout {
                seconds: self.settings.request_timeout.as_secs(),
            }),
        };
        if result.is_err() {
            if let Some(m) = &self.metrics {
                m.delivery_failures_total.inc();
            }
        }
        result
    }

    async fn fail(&mut self, err: AppError) -> CycleOutcome {
        self.consecutive_failures += 1;
        if err.is_transient() {
            self.transient_failures += 1;
            tracing::warn!(
                "Fetch failed ({} in a row), backing off: {}",
                self.fetch_failures,
                err
            );
        } else {
            self.transient_failures = 0;
            tracing::warn!("Skipping cycle: {}", err);
        }

        if let Some(m) = &self.metrics {
            m.poll_errors_total.inc();
            m.consecutive_failures.set(f64::from(self.consecutive_failures));
        }

        self.notify_unavailable(&err).await;
        self.state = CycleState::Idle;
        CycleOutcome::Skipped(err)
    }

    async fn notify_unavailable(&mut self, err: &AppError) {
        let threshold = self.settings.unavailable_notify_after;
        if threshold == 0 || self.unavailable_notified || self.fetch_failures < threshold {
            return;
        }

        let notice = message::detector_unavailable(self.fetch_failures, &err.to_string());
        match self.deliver(&notice).await {
            Ok(()) => {
                self.unavailable_notified = true;
                tracing::warn!("Sent detector-unavailable notice");
            }
            Err(delivery) => tracing::error!("Failed to send detector-unavailable notice: {}", delivery),
        }
    }

    fn recover(&mut self) {
        if self.consecutive_failures > 0 {
            tracing::info!(
                "Recovered after {} failed cycle(s)",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.transient_failures = 0;
        if let Some(m) = &self.metrics {
            m.consecutive_failures.set(0.0);
        }
    }
}
