use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::metrics::AppMetrics;

/// `GET /metrics` in the Prometheus text exposition format.
pub async fn metrics(State(metrics): State<Arc<AppMetrics>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                "metrics error".to_string(),
            )
        }
    }
}
