//! Status surface: liveness, Prometheus metrics and alert history.

pub mod alerts;
pub mod health;
pub mod metrics;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::metrics::AppMetrics;
use crate::repository::AlertRepository;

/// Assemble the full status router.
pub fn status_router(repository: AlertRepository, app_metrics: Arc<AppMetrics>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .merge(
            Router::new()
                .route("/metrics", get(metrics::metrics))
                .with_state(app_metrics),
        )
        .merge(
            Router::new()
                .route("/alerts/history", get(alerts::get_alert_history))
                .with_state(repository),
        )
}

/// Bind `addr` and serve `app` until `shutdown` flips to `true`.
pub async fn serve(
    addr: SocketAddr,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Status server listening on {}", listener.local_addr()?);

    let shutdown_signal = async move {
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        tracing::info!("Status server received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
}
