//! Episode fingerprints for alert deduplication.
//!
//! An episode's start and end are floored into fixed-width time buckets.
//! Two fingerprints whose bucket ranges overlap describe the same episode,
//! which keeps a rise that is still growing across poll cycles from
//! looking new each time its end moves.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::detection::Episode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub start_bucket: i64,
    pub end_bucket: i64,
}

impl Fingerprint {
    pub fn for_episode(episode: &Episode, bucket: Duration) -> Self {
        let width = bucket.num_minutes().max(1);
        let bucket_of = |ts: chrono::DateTime<chrono::Utc>| {
            ts.timestamp().div_euclid(60).div_euclid(width)
        };
        Self {
            start_bucket: bucket_of(episode.start_ts),
            end_bucket: bucket_of(episode.end_ts),
        }
    }

    /// Storage key, `"<start_bucket>:<end_bucket>"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.start_bucket, self.end_bucket)
    }

    pub fn parse(key: &str) -> Option<Self> {
        let (start, end) = key.split_once(':')?;
        Some(Self {
            start_bucket: start.parse().ok()?,
            end_bucket: end.parse().ok()?,
        })
    }

    pub fn overlaps(&self, other: &Fingerprint) -> bool {
        self.start_bucket <= other.end_bucket && other.start_bucket <= self.end_bucket
    }

    pub fn union(&self, other: &Fingerprint) -> Self {
        Self {
            start_bucket: self.start_bucket.min(other.start_bucket),
            end_bucket: self.end_bucket.max(other.end_bucket),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
