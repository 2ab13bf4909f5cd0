//! Missed-bolus rise detection
//!
//! Slides over a window of CGM readings looking for rises of at least
//! `rise_threshold_mgdl` within `rise_window`, drops any rise that a bolus
//! in `[start - bolus_lookback, end]` accounts for, and merges what is left
//! into non-overlapping episodes. Everything here is a pure function of the
//! inputs: the same window always yields the same episodes.

use chrono::{DateTime, Duration, Utc};

use crate::detection::{
    config::DetectionConfig,
    error::DetectionError,
    types::*,
};

/// Detector bound to a fixed configuration
#[derive(Debug, Clone)]
pub struct MissedBolusDetector {
    config: DetectionConfig,
}

impl MissedBolusDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Run detection over a fetched window.
    pub fn detect(&self, window: &DataWindow) -> Result<Vec<Episode>, DetectionError> {
        detect(&window.readings, &window.treatments, &self.config)
    }

    /// Carb entries that sit inside an episode's lookback interval.
    pub fn unbolused_carbs<'a>(
        &self,
        episode: &Episode,
        treatments: &'a [TreatmentEvent],
    ) -> Vec<&'a TreatmentEvent> {
        unbolused_carbs(episode, treatments, &self.config)
    }
}

/// Find unexplained glucose rises in `readings`.
///
/// Fails with [`DetectionError::InsufficientData`] for fewer than two
/// readings and [`DetectionError::OutOfOrderData`] if timestamps are not
/// strictly increasing. Episodes come back sorted by start time.
pub fn detect(
    readings: &[GlucoseReading],
    treatments: &[TreatmentEvent],
    config: &DetectionConfig,
) -> Result<Vec<Episode>, DetectionError> {
    validate_readings(readings)?;

    let boluses: Vec<DateTime<Utc>> = treatments
        .iter()
        .filter(|t| t.is_qualifying_bolus())
        .map(|t| t.timestamp)
        .collect();

    let surviving = candidate_rises(readings, config)
        .into_iter()
        .filter(|&(start, end)| {
            !bolus_explains(
                &boluses,
                readings[start].timestamp,
                readings[end].timestamp,
                config.bolus_lookback,
            )
        });

    let episodes = merge_candidates(readings, surviving);
    tracing::debug!(
        readings = readings.len(),
        boluses = boluses.len(),
        episodes = episodes.len(),
        "Detection pass complete"
    );
    Ok(episodes)
}

/// Check the window is analysable: at least two readings, strictly increasing in time.
pub fn validate_readings(readings: &[GlucoseReading]) -> Result<(), DetectionError> {
    if readings.len() < 2 {
        return Err(DetectionError::InsufficientData {
            available: readings.len(),
        });
    }

    for (offset, pair) in readings.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(DetectionError::OutOfOrderData {
                index: offset + 1,
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }

    Ok(())
}

/// Index pairs `(start, end)` whose rise qualifies, ordered by `start` then `end`.
fn candidate_rises(readings: &[GlucoseReading], config: &DetectionConfig) -> Vec<(usize, usize)> {
    let mut candidates = Vec::new();

    for (i, start) in readings.iter().enumerate() {
        for j in (i + 1)..readings.len() {
            let end = &readings[j];
            if end.timestamp - start.timestamp > config.rise_window {
                break;
            }
            // A gap poisons every wider window from this start as well.
            if end.timestamp - readings[j - 1].timestamp > config.max_gap {
                break;
            }
            if end.value_mgdl - start.value_mgdl >= config.rise_threshold_mgdl {
                candidates.push((i, j));
            }
        }
    }

    candidates
}

fn bolus_explains(
    boluses: &[DateTime<Utc>],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    lookback: Duration,
) -> bool {
    let from = start - lookback;
    boluses.iter().any(|&at| at >= from && at <= end)
}

/// Fold start-ordered candidates into episodes spanning each overlapping run.
fn merge_candidates(
    readings: &[GlucoseReading],
    candidates: impl IntoIterator<Item = (usize, usize)>,
) -> Vec<Episode> {
    let mut episodes = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for (start, end) in candidates {
        current = match current {
            Some((run_start, run_end)) if start <= run_end => Some((run_start, run_end.max(end))),
            Some((run_start, run_end)) => {
                episodes.push(Episode::spanning(&readings[run_start], &readings[run_end]));
                Some((start, end))
            }
            None => Some((start, end)),
        };
    }

    if let Some((run_start, run_end)) = current {
        episodes.push(Episode::spanning(&readings[run_start], &readings[run_end]));
    }

    episodes
}

/// Carb entries above the ignore floor inside `[start - bolus_lookback, end]`.
///
/// Only meaningful for an emitted episode, where no bolus covers that interval.
pub fn unbolused_carbs<'a>(
    episode: &Episode,
    treatments: &'a [TreatmentEvent],
    config: &DetectionConfig,
) -> Vec<&'a TreatmentEvent> {
    let from = episode.start_ts - config.bolus_lookback;
    treatments
        .iter()
        .filter(|t| t.kind == TreatmentKind::Carb)
        .filter(|t| t.carbs_grams.map_or(false, |g| g > config.ignore_carbs_grams))
        .filter(|t| t.timestamp >= from && t.timestamp <= episode.end_ts)
        .collect()
}
