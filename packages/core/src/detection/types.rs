//! Core data types for missed-bolus detection

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A single CGM glucose reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    pub timestamp: DateTime<Utc>,
    pub value_mgdl: f64,
}

impl GlucoseReading {
    pub fn new(timestamp: DateTime<Utc>, value_mgdl: f64) -> Self {
        Self {
            timestamp,
            value_mgdl,
        }
    }
}

/// What a treatment entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentKind {
    Bolus,
    Carb,
    BasalChange,
    Other,
}

/// A treatment entry from the care record (insulin, carbs, basal changes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: TreatmentKind,
    pub insulin_units: Option<f64>,
    pub carbs_grams: Option<f64>,
}

impl TreatmentEvent {
    pub fn bolus(timestamp: DateTime<Utc>, insulin_units: f64) -> Self {
        Self {
            timestamp,
            kind: TreatmentKind::Bolus,
            insulin_units: Some(insulin_units),
            carbs_grams: None,
        }
    }

    pub fn carbs(timestamp: DateTime<Utc>, carbs_grams: f64) -> Self {
        Self {
            timestamp,
            kind: TreatmentKind::Carb,
            insulin_units: None,
            carbs_grams: Some(carbs_grams),
        }
    }

    /// A bolus only explains a rise when it actually delivered insulin.
    pub fn is_qualifying_bolus(&self) -> bool {
        self.kind == TreatmentKind::Bolus && self.insulin_units.map_or(false, |u| u > 0.0)
    }
}

/// Everything fetched for one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct DataWindow {
    pub readings: Vec<GlucoseReading>,
    pub treatments: Vec<TreatmentEvent>,
}

impl DataWindow {
    pub fn latest_reading(&self) -> Option<&GlucoseReading> {
        self.readings.last()
    }
}

/// An interval of glucose rise with no bolus to explain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub start_mgdl: f64,
    pub end_mgdl: f64,
    pub delta_mgdl: f64,
    pub duration_minutes: f64,
    /// Rise rate in mg/dL per minute.
    pub severity: f64,
}

impl Episode {
    /// Build an episode between two readings. `end` must be strictly after `start`.
    pub fn spanning(start: &GlucoseReading, end: &GlucoseReading) -> Self {
        let delta_mgdl = end.value_mgdl - start.value_mgdl;
        let duration_minutes = minutes_between(start.timestamp, end.timestamp);
        Self {
            start_ts: start.timestamp,
            end_ts: end.timestamp,
            start_mgdl: start.value_mgdl,
            end_mgdl: end.value_mgdl,
            delta_mgdl,
            duration_minutes,
            severity: delta_mgdl / duration_minutes,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end_ts - self.start_ts
    }
}

/// Elapsed minutes between two instants, with sub-minute precision.
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn episode_spanning_computes_delta_duration_and_rate() {
        let start = GlucoseReading::new(t0(), 100.0);
        let end = GlucoseReading::new(t0() + Duration::minutes(30), 180.0);

        let episode = Episode::spanning(&start, &end);

        assert_eq!(episode.delta_mgdl, 80.0);
        assert_eq!(episode.duration_minutes, 30.0);
        assert!((episode.severity - 80.0 / 30.0).abs() < f64::EPSILON);
        assert_eq!(episode.duration(), Duration::minutes(30));
    }

    #[test]
    fn zero_unit_bolus_does_not_qualify() {
        assert!(!TreatmentEvent::bolus(t0(), 0.0).is_qualifying_bolus());
        assert!(TreatmentEvent::bolus(t0(), 0.5).is_qualifying_bolus());
    }

    #[test]
    fn carb_entry_is_never_a_bolus() {
        assert!(!TreatmentEvent::carbs(t0(), 40.0).is_qualifying_bolus());
    }

    #[test]
    fn minutes_between_keeps_fractions() {
        let later = t0() + Duration::seconds(90);
        assert_eq!(minutes_between(t0(), later), 1.5);
    }
}
