//! Health route
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /health | GET | Cached printer statuses and sensor readings |
//!
//! ```json
//! {
//!   "status": "ok",
//!   "version": "0.1.0",
//!   "uptime_seconds": 42,
//!   "timestamp": "2026-01-01T12:00:00Z",
//!   "printers": { "receipt": { "status": "ready", "reason": null } },
//!   "temperatures": { "28-00000a1b2c3d": 23.125 }
//! }
//! ```

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::StatusReport;
use std::collections::BTreeMap;

use crate::core::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` when every printer is ready, `degraded` otherwise
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    timestamp: DateTime<Utc>,
    printers: BTreeMap<String, StatusReport>,
    temperatures: BTreeMap<String, f64>,
}

/// GET /health - never touches the hardware
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.snapshot();
    Json(HealthResponse {
        status: if snapshot.all_ready() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
        printers: snapshot.printers,
        temperatures: state.sensors.readings(),
    })
}
