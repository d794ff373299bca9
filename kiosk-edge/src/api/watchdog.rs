//! Watchdog routes
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /keepalive | GET | Reset the offline timer |
//! | /reboot | GET | Reboot the device now |

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use shared::SuccessResponse;
use std::sync::Arc;
use tracing::error;

use crate::supervisor::Watchdog;

pub fn router(watchdog: Arc<Watchdog>) -> Router {
    Router::new()
        .route("/keepalive", get(keepalive))
        .route("/reboot", get(reboot))
        .with_state(watchdog)
}

/// GET /keepalive
async fn keepalive(State(watchdog): State<Arc<Watchdog>>) -> Json<SuccessResponse> {
    watchdog.keepalive();
    Json(SuccessResponse::ok().with_message("Keepalive sent"))
}

/// GET /reboot
async fn reboot(State(watchdog): State<Arc<Watchdog>>) -> Json<SuccessResponse> {
    match watchdog.reboot_now().await {
        Ok(()) => Json(SuccessResponse::ok().with_message("Rebooting device")),
        Err(e) => {
            error!(error = %e, "reboot request failed");
            Json(SuccessResponse::failed().with_message(format!("Reboot failed: {e}")))
        }
    }
}
