//! Device state synchronization
//!
//! `unauthenticated → authenticated → (expired) → unauthenticated`
//!
//! The token is refreshed lazily before every authenticated call. `get_state`
//! retries a bounded number of times, forcing a fresh login before each
//! retry; `start_polling` never lets a failure end the loop.

use crate::http::HttpClient;
use crate::session::{AuthSession, TokenResponse};
use crate::{ClientConfig, ClientError, ClientResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use shared::{HealthSnapshot, RemoteDeviceState, SyncEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Password grant endpoint
pub const AUTH_PATH: &str = "auth/v1/token?grant_type=password";
/// Prefix for backend functions (state, print, print-label, wave-status)
pub const FUNCTIONS_PATH: &str = "functions/v1";

/// Local collaborators of the polling loop
#[async_trait]
pub trait SyncHooks: Send + Sync {
    /// Health and sensor state to push
    async fn snapshot(&self) -> HealthSnapshot;

    /// Called once per successful poll with the pulled state
    async fn on_remote_state(&self, state: &RemoteDeviceState);

    /// Sleep before the next poll
    fn poll_interval(&self) -> Duration;
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StateRequest<'a> {
    device_id: &'a str,
    device_name: &'a str,
    device_type: &'a str,
    #[serde(flatten)]
    health: &'a HealthSnapshot,
}

/// Backend session and state sync for one device
pub struct DeviceSyncClient {
    http: HttpClient,
    config: ClientConfig,
    session: Mutex<Option<AuthSession>>,
}

impl DeviceSyncClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Ok(Self {
            http: HttpClient::new(&config)?,
            config,
            session: Mutex::new(None),
        })
    }

    /// Replace the cached session (e.g. one persisted by a previous run)
    pub async fn restore_session(&self, session: AuthSession) {
        *self.session.lock().await = Some(session);
    }

    pub async fn session(&self) -> Option<AuthSession> {
        self.session.lock().await.clone()
    }

    /// Drop the cached token; the next call logs in again
    pub async fn invalidate(&self) {
        *self.session.lock().await = None;
    }

    /// Exchange the device credentials for a token.
    ///
    /// Not retried here; transport failures go to the caller.
    #[instrument(skip(self), fields(user = %self.config.user))]
    pub async fn authenticate(&self) -> ClientResult<AuthSession> {
        let mut guard = self.session.lock().await;
        self.login(&mut guard).await
    }

    async fn login(&self, slot: &mut Option<AuthSession>) -> ClientResult<AuthSession> {
        let body = Credentials {
            email: &self.config.user,
            password: &self.config.password,
        };
        let response: TokenResponse = match self.http.post(AUTH_PATH, &body, None).await {
            Ok(r) => r,
            Err(e) => {
                *slot = None;
                error!(error = %e, "authentication failed");
                return Err(e);
            }
        };
        let session = AuthSession::from_response(response, Utc::now());
        info!(expires_at = %session.expires_at, "authenticated");
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Cached token while valid, otherwise authenticate first.
    pub async fn get_access_token(&self) -> ClientResult<String> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref()
            && session.is_valid()
        {
            return Ok(session.access_token.clone());
        }
        debug!("token missing or expired");
        Ok(self.login(&mut guard).await?.access_token)
    }

    async fn push_state(&self, snapshot: &HealthSnapshot) -> ClientResult<RemoteDeviceState> {
        let token = self.get_access_token().await?;
        let body = StateRequest {
            device_id: &self.config.device_id,
            device_name: &self.config.device_name,
            device_type: &self.config.device_type,
            health: snapshot,
        };
        self.http
            .post(&format!("{FUNCTIONS_PATH}/state"), &body, Some(&token))
            .await
    }

    /// Push the local snapshot and pull remote state in one round trip.
    ///
    /// After a failure the session is dropped and the call is retried, up to
    /// `max_retries` times; the last error is returned.
    #[instrument(skip_all)]
    pub async fn get_state(&self, snapshot: &HealthSnapshot) -> ClientResult<RemoteDeviceState> {
        let max_retries = self.config.max_retries;
        let mut attempt = 0;
        loop {
            match self.push_state(snapshot).await {
                Ok(state) => return Ok(state),
                Err(e) if attempt >= max_retries => {
                    error!(error = %e, attempts = attempt + 1, "get_state failed, giving up");
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    warn!(error = %e, attempt, max_retries, "get_state failed, re-authenticating");
                    self.invalidate().await;
                    if !self.config.retry_delay.is_zero() {
                        tokio::time::sleep(self.config.retry_delay * attempt).await;
                    }
                }
            }
        }
    }

    /// Poll until `shutdown` is cancelled. Errors are logged, never fatal.
    pub async fn start_polling(&self, hooks: Arc<dyn SyncHooks>, shutdown: CancellationToken) {
        info!("device sync polling started");
        loop {
            let snapshot = hooks.snapshot().await;
            match self.get_state(&snapshot).await {
                Ok(state) => hooks.on_remote_state(&state).await,
                Err(e) => error!(error = %e, "state poll failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(hooks.poll_interval()) => {}
            }
        }
        info!("device sync polling stopped");
    }

    /// Report a success event. Best effort: failures are logged and the
    /// return value only says whether the backend acknowledged.
    #[instrument(skip(self), fields(path = event.path()))]
    pub async fn notify_success(&self, event: SyncEvent) -> bool {
        let path = format!("{FUNCTIONS_PATH}/{}", event.path());
        let mut reauthed = false;
        loop {
            let result = match self.get_access_token().await {
                Ok(token) => self.http.post_ack(&path, &event, Some(&token)).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    info!("backend notified");
                    return true;
                }
                Err(ClientError::Unauthorized) if !reauthed => {
                    reauthed = true;
                    self.invalidate().await;
                }
                Err(e) => {
                    warn!(error = %e, "failed to notify backend");
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_request_shape() {
        let snapshot = HealthSnapshot::default();
        let body = StateRequest {
            device_id: "dev-1",
            device_name: "Island 1",
            device_type: "island",
            health: &snapshot,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["deviceId"], "dev-1");
        assert_eq!(json["deviceType"], "island");
        assert!(json["printers"].is_object());
        assert!(json["events"].is_array());
    }
}
