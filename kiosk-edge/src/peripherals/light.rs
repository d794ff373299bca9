//! Store light follows the remote `store.open` flag

use async_trait::async_trait;
use shared::RemoteDeviceState;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LightError {
    #[error("light request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("light controller returned {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait LightController: Send + Sync {
    async fn set(&self, on: bool) -> Result<(), LightError>;
}

/// Light service answering `GET /on` and `GET /off`
pub struct HttpLightController {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLightController {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LightError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LightController for HttpLightController {
    async fn set(&self, on: bool) -> Result<(), LightError> {
        let path = if on { "on" } else { "off" };
        let response = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(LightError::Rejected(response.status().as_u16()))
        }
    }
}

/// Polls between unconditional re-sends of an unchanged state. A light
/// service restart resets the GPIO without telling us.
pub const REASSERT_EVERY: u32 = 20;

#[derive(Default)]
struct Applied {
    on: Option<bool>,
    polls_since_sent: u32,
}

/// Applies the remote open/closed flag once per poll
///
/// A change is sent right away; an unchanged state is re-sent every
/// [`REASSERT_EVERY`] polls. A failed command is retried on the next poll.
pub struct LightReconciler {
    controller: Box<dyn LightController>,
    applied: Mutex<Applied>,
}

impl LightReconciler {
    pub fn new(controller: Box<dyn LightController>) -> Self {
        Self {
            controller,
            applied: Mutex::new(Applied::default()),
        }
    }

    /// Last state the controller accepted
    pub async fn applied(&self) -> Option<bool> {
        self.applied.lock().await.on
    }

    pub async fn reconcile(&self, state: &RemoteDeviceState) {
        let Some(open) = state.store_open() else {
            return;
        };
        let mut applied = self.applied.lock().await;
        if applied.on == Some(open) {
            applied.polls_since_sent += 1;
            if applied.polls_since_sent < REASSERT_EVERY {
                return;
            }
            debug!(on = open, "re-asserting store light");
        }
        match self.controller.set(open).await {
            Ok(()) => {
                if applied.on != Some(open) {
                    info!(on = open, "store light updated");
                }
                *applied = Applied {
                    on: Some(open),
                    polls_since_sent: 0,
                };
            }
            Err(e) => warn!(on = open, error = %e, "failed to update store light"),
        }
    }
}
