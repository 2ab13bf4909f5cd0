//! Configuration for the detection engine

use chrono::Duration;

/// Tunables for rise detection. All are conservative defaults, not
/// clinical values.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    /// Minimum glucose delta (mg/dL) that flags a rise.
    pub rise_threshold_mgdl: f64,
    /// Longest elapsed time a qualifying rise may take.
    pub rise_window: Duration,
    /// How far before a rise a bolus still explains it.
    pub bolus_lookback: Duration,
    /// Largest tolerated gap between consecutive readings inside a rise.
    pub max_gap: Duration,
    /// Carb entries at or below this amount are left out of alert context.
    pub ignore_carbs_grams: f64,
}

impl DetectionConfig {
    /// Span of data the engine needs to judge the most recent rise.
    pub fn required_span(&self) -> Duration {
        self.rise_window + self.bolus_lookback
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            rise_threshold_mgdl: 40.0,
            rise_window: Duration::minutes(60),
            bolus_lookback: Duration::minutes(60),
            max_gap: Duration::minutes(10),
            ignore_carbs_grams: 15.0,
        }
    }
}
