//! Health check and metrics endpoint

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use transfer_core::TransferRegistry;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub uptime_seconds: u64,
    pub bot_username: Option<String>,
    pub active_transfers: usize,
}

/// Metrics data
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metrics {
    pub updates_received: u64,
    pub unauthorized: u64,
    pub transfers_started: u64,
    pub transfers_completed: u64,
    pub transfers_failed: u64,
    pub transfers_rejected: u64,
    pub active_transfers: usize,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<RwLock<Metrics>>,
    pub start_time: SystemTime,
    pub bot_username: Option<String>,
    registry: TransferRegistry,
}

impl AppState {
    pub fn new(bot_username: Option<String>, registry: TransferRegistry) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(Metrics::default())),
            start_time: SystemTime::now(),
            bot_username,
            registry,
        }
    }

    pub async fn increment_updates(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.updates_received += 1;
    }

    pub async fn increment_unauthorized(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.unauthorized += 1;
    }

    pub async fn increment_started(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.transfers_started += 1;
    }

    pub async fn increment_completed(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.transfers_completed += 1;
    }

    pub async fn increment_failed(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.transfers_failed += 1;
    }

    /// A request refused because the file exists or is already in flight.
    pub async fn increment_rejected(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.transfers_rejected += 1;
    }

    pub async fn snapshot(&self) -> Metrics {
        let mut metrics = self.metrics.read().await.clone();
        metrics.active_transfers = self.registry.len();
        metrics
    }
}

/// Health check endpoint handler
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let uptime = state.start_time.elapsed().unwrap_or_default().as_secs();

    (
        StatusCode::OK,
        Json(HealthStatus {
            status: "healthy".to_string(),
            uptime_seconds: uptime,
            bot_username: state.bot_username.clone(),
            active_transfers: state.registry.len(),
        }),
    )
}

/// Metrics endpoint handler
async fn metrics_handler(State(state): State<AppState>) -> Json<Metrics> {
    Json(state.snapshot().await)
}

/// Create health check router
pub fn create_health_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ready", get(ready_handler))
        .route("/live", get(live_handler))
        .with_state(state)
}

/// Readiness check: the bot authenticated with Telegram
async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    if state.bot_username.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check (process is alive)
async fn live_handler() -> StatusCode {
    StatusCode::OK
}

/// Start health check server
pub async fn start_health_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = create_health_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Health check server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use transfer_core::TransferRecord;

    #[tokio::test]
    async fn test_counters_and_active_transfers() {
        let registry = TransferRegistry::new();
        let state = AppState::new(Some("downloader_bot".to_string()), registry.clone());

        state.increment_updates().await;
        state.increment_started().await;
        state.increment_started().await;
        state.increment_completed().await;
        state.increment_failed().await;
        state.increment_rejected().await;
        registry
            .register(TransferRecord::new("id-1", "movie.mkv", 10))
            .unwrap();

        let metrics = state.snapshot().await;
        assert_eq!(metrics.updates_received, 1);
        assert_eq!(metrics.transfers_started, 2);
        assert_eq!(metrics.transfers_completed, 1);
        assert_eq!(metrics.transfers_failed, 1);
        assert_eq!(metrics.transfers_rejected, 1);
        assert_eq!(metrics.active_transfers, 1);
    }

    #[tokio::test]
    async fn test_ready_requires_authenticated_bot() {
        let ready = ready_handler(State(AppState::new(None, TransferRegistry::new()))).await;
        assert_eq!(ready, StatusCode::SERVICE_UNAVAILABLE);

        let ready = ready_handler(State(AppState::new(
            Some("downloader_bot".to_string()),
            TransferRegistry::new(),
        )))
        .await;
        assert_eq!(ready, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_reports_active_transfers() {
        let registry = TransferRegistry::new();
        registry
            .register(TransferRecord::new("id-1", "movie.mkv", 10))
            .unwrap();
        let (code, Json(status)) = health_handler(State(AppState::new(None, registry))).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(status.active_transfers, 1);
        assert_eq!(status.status, "healthy");
    }
}
