//! Recording [`ServiceControl`] for tests

use super::service_control::{ServiceControl, ServiceControlError, ServiceControlResult};
use async_trait::async_trait;
use tokio::time::Instant;

#[derive(Default)]
pub struct FakeControl {
    pub calls: parking_lot::Mutex<Vec<(Instant, String)>>,
    pub fail: bool,
}

impl FakeControl {
    fn record(&self, call: String) -> ServiceControlResult<()> {
        self.calls.lock().push((Instant::now(), call));
        if self.fail {
            Err(ServiceControlError::Rejected {
                status: 503,
                body: "busy".into(),
            })
        } else {
            Ok(())
        }
    }

    /// When each call named `name` was made
    pub fn calls(&self, name: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, c)| c == name)
            .map(|(t, _)| *t)
            .collect()
    }
}

#[async_trait]
impl ServiceControl for FakeControl {
    async fn restart_service(&self, service: &str) -> ServiceControlResult<()> {
        self.record(format!("restart:{service}"))
    }
    async fn stop_service(&self, service: &str) -> ServiceControlResult<()> {
        self.record(format!("stop:{service}"))
    }
    async fn start_service(&self, service: &str) -> ServiceControlResult<()> {
        self.record(format!("start:{service}"))
    }
    async fn restart_app(&self) -> ServiceControlResult<()> {
        self.record("restart_app".into())
    }
    async fn reboot(&self) -> ServiceControlResult<()> {
        self.record("reboot".into())
    }
}
