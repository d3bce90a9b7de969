//! HTTP API handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::strategy::TickReport;

/// Tick history of the bot served by this process.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BotStatus {
    /// Bot name.
    pub bot: Option<String>,
    /// Successful ticks.
    pub ticks: u64,
    /// Ticks that failed after all retries.
    pub failures: u64,
    /// When the last tick finished, successful or not.
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Last successful tick's report.
    pub last_report: Option<TickReport>,
    /// Error of the last failed tick, cleared on success.
    pub last_error: Option<String>,
}

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the bot loop is running.
    pub ready: Arc<AtomicBool>,
    /// Tick history.
    pub status: Arc<RwLock<BotStatus>>,
    /// Prometheus renderer, when a recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            status: Arc::new(RwLock::new(BotStatus::default())),
            prometheus: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Record a successful tick.
    pub async fn record_tick(&self, bot: &str, report: &TickReport) {
        let mut status = self.status.write().await;
        status.bot = Some(bot.to_string());
        status.ticks += 1;
        status.last_tick_at = Some(Utc::now());
        status.last_report = Some(report.clone());
        status.last_error = None;
    }

    /// Record a tick that failed after all retries.
    pub async fn record_failure(&self, bot: &str, error: String) {
        let mut status = self.status.write().await;
        status.bot = Some(bot.to_string());
        status.failures += 1;
        status.last_tick_at = Some(Utc::now());
        status.last_error = Some(error);
    }

    /// Copy of the tick history.
    pub async fn status(&self) -> BotStatus {
        self.status.read().await.clone()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("ready", &self.is_ready())
            .field("prometheus", &self.prometheus.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the bot loop is running.
    pub ready: bool,
    /// Bot name, once it has ticked.
    pub bot: Option<String>,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Tick history.
    #[serde(flatten)]
    pub bot: BotStatus,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let bot = state.status.read().await.bot.clone();

    let response = ReadyResponse { ready: is_ready, bot };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - last tick summary or risk snapshot.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.is_ready() { "running" } else { "stopped" };
    Json(StatusResponse {
        status,
        bot: state.status().await,
    })
}

/// Prometheus scrape handler - 503 when no recorder is installed.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::QuotingSummary;

    #[test]
    fn app_state_ready_toggle() {
        let state = AppState::new();
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn success_clears_last_error() {
        let state = AppState::new();
        state.record_failure("market_maker", "boom".to_string()).await;
        assert_eq!(state.status().await.last_error.as_deref(), Some("boom"));

        let report = TickReport::Quoting(QuotingSummary {
            markets_seen: 2,
            ..Default::default()
        });
        state.record_tick("market_maker", &report).await;

        let status = state.status().await;
        assert_eq!(status.ticks, 1);
        assert_eq!(status.failures, 1);
        assert!(status.last_error.is_none());
        assert_eq!(status.last_report, Some(report));
    }
}
