//! Local supervisor API client
//!
//! ```text
//! POST {address}/v2/applications/{app}/restart-service?apikey=…  {"serviceName"}
//! POST {address}/v2/applications/{app}/stop-service?apikey=…     {"serviceName"}
//! POST {address}/v2/applications/{app}/start-service?apikey=…    {"serviceName"}
//! POST {address}/v1/restart?apikey=…                              {"appId"}
//! POST {address}/v1/reboot?apikey=…
//! ```

use crate::core::{RestartPolicy, SupervisorConfig};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum ServiceControlError {
    #[error("supervisor request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("supervisor rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

pub type ServiceControlResult<T> = Result<T, ServiceControlError>;

/// Recovery actions available to the health supervisor
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn restart_service(&self, service: &str) -> ServiceControlResult<()>;

    async fn stop_service(&self, service: &str) -> ServiceControlResult<()>;

    async fn start_service(&self, service: &str) -> ServiceControlResult<()>;

    /// Restart every container of the application
    async fn restart_app(&self) -> ServiceControlResult<()>;

    async fn reboot(&self) -> ServiceControlResult<()>;
}

/// Run the whole-device recovery `policy` allows: restart the application
/// or reboot. Returns false when the policy allows neither.
pub async fn hard_restart(control: &dyn ServiceControl, policy: RestartPolicy, cause: &str) -> bool {
    let result = match policy {
        RestartPolicy::None => {
            info!(cause, "hard restart skipped, restart policy is none");
            return false;
        }
        RestartPolicy::Restart => {
            warn!(cause, "restarting application");
            control.restart_app().await
        }
        RestartPolicy::Reboot => {
            warn!(cause, "rebooting device");
            control.reboot().await
        }
    };
    if let Err(e) = result {
        error!(?policy, cause, error = %e, "hard restart failed");
    }
    true
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceBody<'a> {
    service_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AppBody<'a> {
    app_id: &'a str,
}

/// Balena supervisor over HTTP
pub struct BalenaSupervisor {
    client: reqwest::Client,
    address: String,
    api_key: String,
    app_id: String,
}

impl BalenaSupervisor {
    pub fn new(config: &SupervisorConfig, timeout: Duration) -> ServiceControlResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            address: config.address.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            app_id: config.app_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}?apikey={}", self.address, path, self.api_key)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: Option<&B>) -> ServiceControlResult<()> {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceControlError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn service_action(&self, action: &str, service: &str) -> ServiceControlResult<()> {
        let path = format!("v2/applications/{}/{action}-service", self.app_id);
        self.post(&path, Some(&ServiceBody { service_name: service }))
            .await?;
        info!(service, action, "service action accepted");
        Ok(())
    }
}

#[async_trait]
impl ServiceControl for BalenaSupervisor {
    #[instrument(skip(self))]
    async fn restart_service(&self, service: &str) -> ServiceControlResult<()> {
        self.service_action("restart", service).await
    }

    #[instrument(skip(self))]
    async fn stop_service(&self, service: &str) -> ServiceControlResult<()> {
        self.service_action("stop", service).await
    }

    #[instrument(skip(self))]
    async fn start_service(&self, service: &str) -> ServiceControlResult<()> {
        self.service_action("start", service).await
    }

    #[instrument(skip(self))]
    async fn restart_app(&self) -> ServiceControlResult<()> {
        self.post("v1/restart", Some(&AppBody { app_id: &self.app_id }))
            .await?;
        info!("application restart accepted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reboot(&self) -> ServiceControlResult<()> {
        self.post::<()>("v1/reboot", None).await?;
        info!("reboot accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<(String, Value)>>>;

    async fn spawn_supervisor(calls: Calls) -> String {
        async fn service(
            State(calls): State<Calls>,
            Path((app, action)): Path<(String, String)>,
            Query(q): Query<HashMap<String, String>>,
            Json(body): Json<Value>,
        ) -> StatusCode {
            if q.get("apikey").map(String::as_str) != Some("key") {
                return StatusCode::UNAUTHORIZED;
            }
            calls.lock().unwrap().push((format!("{app}/{action}"), body));
            StatusCode::OK
        }

        async fn reboot(State(calls): State<Calls>) -> StatusCode {
            calls.lock().unwrap().push(("reboot".into(), Value::Null));
            StatusCode::ACCEPTED
        }

        let app = Router::new()
            .route("/v2/applications/{app}/{action}", post(service))
            .route("/v1/reboot", post(reboot))
            .with_state(calls);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn supervisor(address: String, api_key: &str) -> BalenaSupervisor {
        let config = SupervisorConfig {
            address,
            api_key: api_key.into(),
            app_id: "42".into(),
        };
        BalenaSupervisor::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_restart_service_request() {
        let calls = Calls::default();
        let address = spawn_supervisor(calls.clone()).await;

        supervisor(address, "key")
            .restart_service("receipt-printer")
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].0, "42/restart-service");
        assert_eq!(calls[0].1["serviceName"], "receipt-printer");
    }

    #[tokio::test]
    async fn test_reboot_without_body() {
        let calls = Calls::default();
        let address = spawn_supervisor(calls.clone()).await;
        supervisor(address, "key").reboot().await.unwrap();
        assert_eq!(calls.lock().unwrap()[0].0, "reboot");
    }

    #[tokio::test]
    async fn test_rejected_key() {
        let calls = Calls::default();
        let address = spawn_supervisor(calls.clone()).await;
        let err = supervisor(address, "wrong")
            .stop_service("label-printer")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceControlError::Rejected { status: 401, .. }));
        assert!(calls.lock().unwrap().is_empty());
    }
}
