//! Read-only view of the alert dedup state.
//!
//! Routes:
//! - `GET /alerts/history` lists stored alert records, most recent first

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::{AlertRecord, AlertRepository};

#[derive(Debug, Deserialize)]
pub struct AlertHistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AlertHistoryItem {
    pub fingerprint: String,
    pub first_sent_ts: DateTime<Utc>,
    pub last_sent_ts: DateTime<Utc>,
    pub send_count: u32,
}

impl From<AlertRecord> for AlertHistoryItem {
    fn from(record: AlertRecord) -> Self {
        Self {
            fingerprint: record.fingerprint.key(),
            first_sent_ts: record.first_sent_ts,
            last_sent_ts: record.last_sent_ts,
            send_count: record.send_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AlertHistoryResponse {
    pub total: i64,
    pub items: Vec<AlertHistoryItem>,
}

/// `GET /alerts/history`
///
/// Query params:
/// - `limit` max items to return (default 20, clamped to 1..=100)
pub async fn get_alert_history(
    State(repo): State<AlertRepository>,
    Query(params): Query<AlertHistoryQuery>,
) -> Result<Json<AlertHistoryResponse>, (StatusCode, Json<serde_json::Value>)> {
    let limit = params.limit.unwrap_or(20);

    let (records, total) = tokio::try_join!(repo.list_recent(limit), repo.count()).map_err(|e| {
        tracing::error!("Failed to read alert history: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })?;

    Ok(Json(AlertHistoryResponse {
        total,
        items: records.into_iter().map(AlertHistoryItem::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use chrono::{Duration, TimeZone};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::alerts::Fingerprint;
    use crate::db::create_pool;

    async fn seeded_repo(count: i64) -> AlertRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = AlertRepository::new(pool);
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        for i in 0..count {
            let sent = t0 + Duration::minutes(i * 60);
            let record = AlertRecord {
                fingerprint: Fingerprint {
                    start_bucket: 1000 + i * 2,
                    end_bucket: 1001 + i * 2,
                },
                first_sent_ts: sent,
                last_sent_ts: sent,
                send_count: 1,
            };
            repo.replace(&[], &record).await.unwrap();
        }
        repo
    }

    async fn get_json(repo: AlertRepository, uri: &str) -> (StatusCode, serde_json::Value) {
        let app = Router::new()
            .route("/alerts/history", get(get_alert_history))
            .with_state(repo);
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn history_lists_most_recent_first() {
        let (status, json) = get_json(seeded_repo(3).await, "/alerts/history").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 3);
        let items = json["items"].as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["fingerprint"], "1004:1005");
        assert_eq!(items[2]["fingerprint"], "1000:1001");
    }

    #[tokio::test]
    async fn history_respects_limit() {
        let (_, json) = get_json(seeded_repo(5).await, "/alerts/history?limit=2").await;

        assert_eq!(json["total"], 5);
        assert_eq!(json["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn history_is_empty_on_fresh_store() {
        let (status, json) = get_json(seeded_repo(0).await, "/alerts/history").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 0);
        assert!(json["items"].as_array().unwrap().is_empty());
    }
}
