//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::sync::watch;

use crate::engine::EngineStatus;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the engine is tracking at least one instrument.
    pub ready: Arc<AtomicBool>,
    /// Latest engine status.
    pub status: watch::Receiver<EngineStatus>,
    /// Prometheus renderer, when a recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
    /// Paper or live.
    pub dry_run: bool,
}

impl AppState {
    /// Create app state reading from `status`.
    pub fn new(status: watch::Receiver<EngineStatus>, dry_run: bool) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            status,
            prometheus: None,
            dry_run,
        }
    }

    /// Serve `/metrics` from this handle.
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
    /// Whether service is ready.
    pub ready: bool,
    /// Instruments being traded.
    pub instruments: usize,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// "running" or "starting".
    pub status: &'static str,
    /// "paper" or "live".
    pub mode: &'static str,
    /// Engine snapshot.
    pub engine: EngineStatus,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let response = ReadyResponse {
        ready: is_ready,
        instruments: state.status.borrow().instruments.len(),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - per-instrument exposure and executor stats.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.status.borrow().clone();
    Json(StatusResponse {
        status: if state.is_ready() { "running" } else { "starting" },
        mode: if state.dry_run { "paper" } else { "live" },
        engine,
    })
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}
