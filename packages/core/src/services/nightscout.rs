use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::detection::error::ProviderError;

/// `enteredBy` value stamped on notes this service writes back.
pub const APP_NAME: &str = "missed-bolus-detector";

#[derive(Clone)]
pub struct NightscoutClient {
    base_url: String,
    token: String,
    http: Client,
}

impl NightscoutClient {
    pub fn new(base_url: String, token: String, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::network(err.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }
}

/// One CGM entry as stored by the remote service.
#[derive(Debug, Deserialize)]
pub struct NightscoutEntry {
    /// Epoch milliseconds.
    pub date: i64,
    /// Absent for calibration and meter entries.
    pub sgv: Option<f64>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NightscoutTreatment {
    pub created_at: String,
    #[serde(rename = "eventType")]
    pub event_type: Option<String>,
    pub insulin: Option<f64>,
    pub carbs: Option<f64>,
}

#[derive(Debug, Serialize)]
struct NoteTreatment<'a> {
    #[serde(rename = "enteredBy")]
    entered_by: &'a str,
    #[serde(rename = "eventType")]
    event_type: &'a str,
    notes: &'a str,
    created_at: String,
}

impl NightscoutClient {
    /// Most recent `count` glucose entries at or after `since`, newest first.
    pub async fn fetch_entries(
        &self,
        since: DateTime<Utc>,
        count: u32,
    ) -> Result<Vec<NightscoutEntry>, ProviderError> {
        let url = format!("{}/api/v1/entries/sgv.json", self.base_url);
        let query = [
            ("count", count.to_string()),
            ("find[date][$gte]", since.timestamp_millis().to_string()),
            ("token", self.token.clone()),
        ];
        self.get_json(&url, &query).await
    }

    /// Most recent `count` treatments at or after `since`, newest first.
    pub async fn fetch_treatments(
        &self,
        since: DateTime<Utc>,
        count: u32,
    ) -> Result<Vec<NightscoutTreatment>, ProviderError> {
        let url = format!("{}/api/v1/treatments.json", self.base_url);
        let query = [
            ("count", count.to_string()),
            (
                "find[created_at][$gte]",
                since.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ("token", self.token.clone()),
        ];
        self.get_json(&url, &query).await
    }

    /// Store a note treatment so the alert shows up in the care record.
    pub async fn post_note(&self, at: DateTime<Utc>, notes: &str) -> Result<(), ProviderError> {
        let url = format!("{}/api/v1/treatments", self.base_url);
        let body = NoteTreatment {
            entered_by: APP_NAME,
            event_type: "Note",
            notes,
            created_at: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let response = self
            .http
            .post(&url)
            .query(&[("token", self.token.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(ProviderError::from_status(response.status()));
        }

        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(ProviderError::from_status(response.status()));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| ProviderError::format(err.to_string()))
    }
}
