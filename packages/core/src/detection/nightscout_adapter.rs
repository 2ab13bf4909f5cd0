//! Nightscout Data Provider Adapter
//!
//! Adapts the NightscoutClient to implement the GlucoseDataProvider trait

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::detection::{
    error::ProviderError,
    provider::{GlucoseDataProvider, ProviderResult},
    types::{DataWindow, GlucoseReading, TreatmentEvent, TreatmentKind},
};
use crate::services::nightscout::{NightscoutClient, NightscoutEntry, NightscoutTreatment};

/// Adapter that implements GlucoseDataProvider for NightscoutClient
pub struct NightscoutDataProvider {
    client: NightscoutClient,
    entries_count: u32,
    treatments_count: u32,
}

impl NightscoutDataProvider {
    pub fn new(client: NightscoutClient, entries_count: u32, treatments_count: u32) -> Self {
        Self {
            client,
            entries_count,
            treatments_count,
        }
    }
}

/// Convert raw entries to readings, oldest first.
///
/// The remote service keeps duplicate uploads of the same reading, so
/// repeated timestamps collapse to the first one seen.
pub(crate) fn readings_from_entries(entries: Vec<NightscoutEntry>) -> Vec<GlucoseReading> {
    let mut readings: Vec<GlucoseReading> = entries
        .into_iter()
        .filter_map(|entry| {
            let value = entry.sgv.filter(|v| *v > 0.0)?;
            match Utc.timestamp_millis_opt(entry.date).single() {
                Some(timestamp) => Some(GlucoseReading::new(timestamp, value)),
                None => {
                    tracing::warn!("Skipping entry with invalid date {}", entry.date);
                    None
                }
            }
        })
        .collect();

    readings.sort_by_key(|r| r.timestamp);
    readings.dedup_by_key(|r| r.timestamp);
    readings
}

pub(crate) fn classify_treatment(record: &NightscoutTreatment) -> TreatmentKind {
    let event_type = record.event_type.as_deref().unwrap_or_default();
    let is_basal = event_type.contains("Basal");

    if is_basal {
        TreatmentKind::BasalChange
    } else if record.insulin.map_or(false, |u| u > 0.0) {
        TreatmentKind::Bolus
    } else if record.carbs.map_or(false, |g| g > 0.0) {
        TreatmentKind::Carb
    } else {
        TreatmentKind::Other
    }
}

pub(crate) fn treatment_from_record(record: NightscoutTreatment) -> ProviderResult<TreatmentEvent> {
    let timestamp = DateTime::parse_from_rfc3339(&record.created_at)
        .map_err(|e| ProviderError::FormatError {
            message: format!("Invalid timestamp '{}': {}", record.created_at, e),
        })?
        .with_timezone(&Utc);

    Ok(TreatmentEvent {
        timestamp,
        kind: classify_treatment(&record),
        insulin_units: record.insulin,
        carbs_grams: record.carbs,
    })
}

#[async_trait]
impl GlucoseDataProvider for NightscoutDataProvider {
    async fn fetch_window(
        &self,
        readings_since: DateTime<Utc>,
        treatments_since: DateTime<Utc>,
    ) -> ProviderResult<DataWindow> {
        let entries = self
            .client
            .fetch_entries(readings_since, self.entries_count)
            .await?;
        let records = self
            .client
            .fetch_treatments(treatments_since, self.treatments_count)
            .await?;

        let readings = readings_from_entries(entries);

        let mut treatments = Vec::with_capacity(records.len());
        for record in records {
            match treatment_from_record(record) {
                Ok(treatment) => treatments.push(treatment),
                // A treatment we cannot place in time cannot rule a rise in or out.
                Err(e) => tracing::warn!("Skipping treatment: {}", e),
            }
        }
        treatments.sort_by_key(|t| t.timestamp);

        Ok(DataWindow {
            readings,
            treatments,
        })
    }

    fn provider_name(&self) -> &str {
        "Nightscout"
    }

    async fn annotate(&self, at: DateTime<Utc>, note: &str) -> ProviderResult<()> {
        self.client.post_note(at, note).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(date: i64, sgv: Option<f64>) -> NightscoutEntry {
        NightscoutEntry {
            date,
            sgv,
            entry_type: Some("sgv".to_string()),
        }
    }

    fn record(event_type: &str, insulin: Option<f64>, carbs: Option<f64>) -> NightscoutTreatment {
        NightscoutTreatment {
            created_at: "2024-03-01T12:05:00.000Z".to_string(),
            event_type: Some(event_type.to_string()),
            insulin,
            carbs,
        }
    }

    #[test]
    fn entries_are_sorted_oldest_first_and_deduplicated() {
        let readings = readings_from_entries(vec![
            entry(1_700_000_600_000, Some(140.0)),
            entry(1_700_000_300_000, Some(120.0)),
            entry(1_700_000_300_000, Some(120.0)),
            entry(1_700_000_000_000, Some(100.0)),
        ]);

        let values: Vec<f64> = readings.iter().map(|r| r.value_mgdl).collect();
        assert_eq!(values, vec![100.0, 120.0, 140.0]);
    }

    #[test]
    fn entries_without_glucose_are_dropped() {
        let readings = readings_from_entries(vec![
            entry(1_700_000_000_000, None),
            entry(1_700_000_300_000, Some(0.0)),
            entry(1_700_000_600_000, Some(110.0)),
        ]);
        assert_eq!(readings.len(), 1);
    }

    #[test]
    fn treatments_are_classified_by_content() {
        assert_eq!(
            classify_treatment(&record("Correction Bolus", Some(2.0), None)),
            TreatmentKind::Bolus
        );
        assert_eq!(
            classify_treatment(&record("Meal Bolus", Some(4.0), Some(45.0))),
            TreatmentKind::Bolus
        );
        assert_eq!(
            classify_treatment(&record("Carb Correction", None, Some(20.0))),
            TreatmentKind::Carb
        );
        assert_eq!(
            classify_treatment(&record("Temp Basal", Some(0.3), None)),
            TreatmentKind::BasalChange
        );
        assert_eq!(
            classify_treatment(&record("Note", None, None)),
            TreatmentKind::Other
        );
    }

    #[test]
    fn treatment_with_bad_timestamp_is_a_format_error() {
        let mut bad = record("Correction Bolus", Some(1.0), None);
        bad.created_at = "yesterday".to_string();
        assert!(matches!(
            treatment_from_record(bad),
            Err(ProviderError::FormatError { .. })
        ));
    }
}
