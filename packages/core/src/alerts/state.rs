//! Alert deduplication state.
//!
//! `AlertStateStore` decides whether an episode may alert and remembers
//! that it did. Records are loaded once at startup and kept in memory;
//! every mutation is committed to SQLite first and only then applied to
//! the in-memory view, so readers never see a write that did not land.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::alerts::fingerprint::Fingerprint;
use crate::detection::Episode;
use crate::repository::{AlertRecord, AlertRepository};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Alert state storage error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Dedup, cooldown and escalation settings.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    pub cooldown: Duration,
    pub fingerprint_bucket: Duration,
    /// Alerts for one episode beyond this many prior sends are escalated.
    pub escalation_threshold: u32,
    pub retention: Duration,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::minutes(120),
            fingerprint_bucket: Duration::minutes(30),
            escalation_threshold: 2,
            retention: Duration::hours(48),
        }
    }
}

/// Outcome of checking an episode against stored state.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    Send {
        fingerprint: Fingerprint,
        prior_sends: u32,
        escalated: bool,
    },
    Suppressed {
        fingerprint: Fingerprint,
        last_sent_ts: DateTime<Utc>,
        eligible_at: DateTime<Utc>,
    },
}

impl AlertDecision {
    pub fn is_send(&self) -> bool {
        matches!(self, AlertDecision::Send { .. })
    }
}

pub struct AlertStateStore {
    repository: AlertRepository,
    policy: AlertPolicy,
    records: HashMap<Fingerprint, AlertRecord>,
}

impl AlertStateStore {
    /// Load every persisted record into memory.
    pub async fn load(repository: AlertRepository, policy: AlertPolicy) -> Result<Self, StoreError> {
        let records: HashMap<_, _> = repository
            .load_all()
            .await?
            .into_iter()
            .map(|record| (record.fingerprint, record))
            .collect();

        tracing::info!("Loaded {} alert record(s)", records.len());

        Ok(Self {
            repository,
            policy,
            records,
        })
    }

    pub fn fingerprint(&self, episode: &Episode) -> Fingerprint {
        Fingerprint::for_episode(episode, self.policy.fingerprint_bucket)
    }

    /// Stored records describing the same episode as `fingerprint`.
    fn matching(&self, fingerprint: &Fingerprint) -> Vec<&AlertRecord> {
        self.records
            .values()
            .filter(|record| record.fingerprint.overlaps(fingerprint))
            .collect()
    }

    /// Check the cooldown gate and escalation level for `episode` at `now`.
    pub fn decide(&self, episode: &Episode, now: DateTime<Utc>) -> AlertDecision {
        let fingerprint = self.fingerprint(episode);
        let matches = self.matching(&fingerprint);

        let last_sent = matches.iter().map(|r| r.last_sent_ts).max();
        let prior_sends = matches.iter().map(|r| r.send_count).max().unwrap_or(0);

        match last_sent {
            Some(last_sent_ts) if now - last_sent_ts < self.policy.cooldown => {
                AlertDecision::Suppressed {
                    fingerprint,
                    last_sent_ts,
                    eligible_at: last_sent_ts + self.policy.cooldown,
                }
            }
            _ => AlertDecision::Send {
                fingerprint,
                prior_sends,
                escalated: prior_sends > self.policy.escalation_threshold,
            },
        }
    }

    pub fn should_alert(&self, episode: &Episode, now: DateTime<Utc>) -> bool {
        self.decide(episode, now).is_send()
    }

    /// Record a delivered alert for `episode`.
    ///
    /// Overlapping records fold into one keyed by the union of their bucket
    /// ranges, carrying the send count forward.
    pub async fn record_alert(
        &mut self,
        episode: &Episode,
        now: DateTime<Utc>,
    ) -> Result<AlertRecord, StoreError> {
        let fingerprint = self.fingerprint(episode);
        let matches = self.matching(&fingerprint);

        let superseded: Vec<Fingerprint> = matches.iter().map(|r| r.fingerprint).collect();
        let merged = superseded
            .iter()
            .fold(fingerprint, |acc, fp| acc.union(fp));
        let send_count = matches.iter().map(|r| r.send_count).max().unwrap_or(0) + 1;
        let first_sent_ts = matches
            .iter()
            .map(|r| r.first_sent_ts)
            .min()
            .unwrap_or(now);

        let record = AlertRecord {
            fingerprint: merged,
            first_sent_ts,
            last_sent_ts: now,
            send_count,
        };

        self.repository.replace(&superseded, &record).await?;

        for fp in &superseded {
            self.records.remove(fp);
        }
        self.records.insert(merged, record.clone());

        tracing::debug!(
            fingerprint = %merged,
            send_count,
            "Recorded alert"
        );
        Ok(record)
    }

    /// Forget records whose last alert is older than the retention period.
    pub async fn prune(&mut self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff = now - self.policy.retention;
        let deleted = self.repository.prune_older_than(cutoff).await?;
        self.records.retain(|_, record| record.last_sent_ts >= cutoff);
        Ok(deleted)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
