//! Local side of the backend polling loop
//!
//! A successful poll is the watchdog's keepalive.

use crate::core::{AppState, HealthTimings};
use crate::peripherals::LightReconciler;
use crate::supervisor::{HealthSupervisor, Watchdog};
use async_trait::async_trait;
use kiosk_client::SyncHooks;
use shared::{HealthSnapshot, RemoteDeviceState};
use std::sync::Arc;
use std::time::Duration;

pub struct EdgeSyncHooks {
    state: AppState,
    light: Option<Arc<LightReconciler>>,
    supervisor: Option<Arc<HealthSupervisor>>,
    watchdog: Option<Arc<Watchdog>>,
    timings: HealthTimings,
}

impl EdgeSyncHooks {
    pub fn new(state: AppState, timings: HealthTimings) -> Self {
        Self {
            state,
            light: None,
            supervisor: None,
            watchdog: None,
            timings,
        }
    }

    pub fn with_light(mut self, light: Option<Arc<LightReconciler>>) -> Self {
        self.light = light;
        self
    }

    pub fn with_supervisor(mut self, supervisor: Arc<HealthSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn with_watchdog(mut self, watchdog: Arc<Watchdog>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }
}

#[async_trait]
impl SyncHooks for EdgeSyncHooks {
    /// Cached statuses only; the supervisor does the hardware polling
    async fn snapshot(&self) -> HealthSnapshot {
        self.state.snapshot()
    }

    async fn on_remote_state(&self, state: &RemoteDeviceState) {
        if let Some(watchdog) = &self.watchdog {
            watchdog.keepalive();
        }
        if let Some(light) = &self.light {
            light.reconcile(state).await;
        }
        if let Some(supervisor) = &self.supervisor {
            supervisor.nudge();
        }
    }

    fn poll_interval(&self) -> Duration {
        if self.state.snapshot().all_ready() {
            self.timings.slow_interval
        } else {
            self.timings.fast_interval
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::{LightController, LightError};
    use crate::core::{RestartPolicy, WatchdogSettings};
    use crate::printing::PrinterManager;
    use crate::sensors::TemperatureSensors;
    use crate::supervisor::fake::FakeControl;
    use kiosk_printer::{MockDevice, PrinterModel};
    use serde_json::json;
    use shared::PrinterStatus;

    struct CountingLight(Arc<parking_lot::Mutex<Vec<bool>>>);

    #[async_trait]
    impl LightController for CountingLight {
        async fn set(&self, on: bool) -> Result<(), LightError> {
            self.0.lock().push(on);
            Ok(())
        }
    }

    fn hooks(device: &MockDevice) -> (EdgeSyncHooks, Arc<PrinterManager>) {
        let manager = Arc::new(PrinterManager::new(
            PrinterModel::TmL100,
            Box::new(device.clone()),
        ));
        let sensors = Arc::new(TemperatureSensors::new("/nonexistent"));
        let state = AppState::new(None, Some(manager.clone()), sensors);
        (EdgeSyncHooks::new(state, HealthTimings::default()), manager)
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_uses_cached_status() {
        let device = MockDevice::ready();
        let (hooks, manager) = hooks(&device);

        // Nothing checked yet
        let snapshot = hooks.snapshot().await;
        assert_eq!(snapshot.printers["label"].status, PrinterStatus::Unknown);
        assert_eq!(hooks.poll_interval(), HealthTimings::default().fast_interval);
        assert!(device.queries().is_empty());

        manager.check_status().await;
        assert_eq!(hooks.snapshot().await.printers["label"].status, PrinterStatus::Ready);
        assert_eq!(hooks.poll_interval(), HealthTimings::default().slow_interval);
    }

    #[tokio::test]
    async fn test_remote_state_drives_light_once() {
        let device = MockDevice::ready();
        let commands = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let light = Arc::new(LightReconciler::new(Box::new(CountingLight(commands.clone()))));
        let (hooks, _) = hooks(&device);
        let hooks = hooks.with_light(Some(light));

        let state = RemoteDeviceState::from(json!({"store": {"open": true}}));
        hooks.on_remote_state(&state).await;
        hooks.on_remote_state(&state).await;
        assert_eq!(*commands.lock(), vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_state_is_a_keepalive() {
        let device = MockDevice::ready();
        let watchdog = Arc::new(Watchdog::new(
            Arc::new(FakeControl::default()),
            RestartPolicy::Reboot,
            WatchdogSettings::default(),
        ));
        let (hooks, _) = hooks(&device);
        let hooks = hooks.with_watchdog(watchdog.clone());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(watchdog.silence(), Duration::from_secs(120));
        hooks
            .on_remote_state(&RemoteDeviceState::from(json!({})))
            .await;
        assert_eq!(watchdog.silence(), Duration::ZERO);
    }
}
