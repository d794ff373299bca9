//! Application state
//!
//! [`AppState`] is what the HTTP handlers see: the managed printers, the
//! sensor readings and the watchdog. [`Services`] owns everything else
//! started at boot and spawns the background loops.

use super::config::{Config, PrinterConfig};
use super::tasks::{BackgroundTasks, TaskKind};
use crate::peripherals::{HttpLightController, LightError, LightReconciler};
use crate::printing::{JobNotifier, JobRenderer, PrinterManager};
use crate::sensors::TemperatureSensors;
use crate::supervisor::{
    BalenaSupervisor, HealthSupervisor, ServiceControl, ServiceControlError, Watchdog,
};
use crate::sync_hooks::EdgeSyncHooks;
use kiosk_client::{ClientError, DeviceSyncClient, SyncHooks};
use kiosk_printer::{DeviceIo, MockDevice, PrinterKind, PrinterModel, process_logo};
use shared::HealthSnapshot;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("backend client: {0}")]
    Client(#[from] ClientError),

    #[error("service control: {0}")]
    ServiceControl(#[from] ServiceControlError),

    #[error("light controller: {0}")]
    Light(#[from] LightError),
}

/// State shared by the HTTP handlers
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct AppState {
    pub receipt: Option<Arc<PrinterManager>>,
    pub label: Option<Arc<PrinterManager>>,
    pub sensors: Arc<TemperatureSensors>,
    pub watchdog: Option<Arc<Watchdog>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        receipt: Option<Arc<PrinterManager>>,
        label: Option<Arc<PrinterManager>>,
        sensors: Arc<TemperatureSensors>,
    ) -> Self {
        Self {
            receipt,
            label,
            sensors,
            watchdog: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_watchdog(mut self, watchdog: Arc<Watchdog>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    /// Managed printers, receipt first
    pub fn printers(&self) -> Vec<Arc<PrinterManager>> {
        self.receipt.iter().chain(self.label.iter()).cloned().collect()
    }

    /// Cached statuses and sensor readings
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            printers: self
                .printers()
                .iter()
                .map(|p| (p.name().to_string(), p.cached_status()))
                .collect(),
            events: self.sensors.events(),
        }
    }
}

/// Everything started at boot
pub struct Services {
    pub state: AppState,
    pub sync: Arc<DeviceSyncClient>,
    pub supervisor: Arc<HealthSupervisor>,
    pub watchdog: Arc<Watchdog>,
    pub hooks: Arc<EdgeSyncHooks>,
}

/// Printer description before it is connected
struct PrinterPlan {
    model: PrinterModel,
    device: Box<dyn DeviceIo>,
    allow_low_paper: bool,
    service_name: String,
}

impl PrinterPlan {
    fn from_config(config: &PrinterConfig) -> Self {
        Self {
            model: config.model,
            device: config.address.connect(config.model.io_timeout()),
            allow_low_paper: config.allow_low_paper,
            service_name: config.service_name.clone(),
        }
    }

    /// A ready mock standing in for `model`
    fn mock(model: PrinterModel, config: Option<&PrinterConfig>) -> Self {
        let default_service = match model.kind() {
            PrinterKind::Receipt => "receipt-printer",
            PrinterKind::Label => "label-printer",
        };
        Self {
            model,
            device: Box::new(MockDevice::ready()),
            allow_low_paper: config
                .map(|c| c.allow_low_paper)
                .unwrap_or(model.kind() == PrinterKind::Receipt),
            service_name: config
                .map(|c| c.service_name.clone())
                .unwrap_or_else(|| default_service.to_string()),
        }
    }
}

impl Services {
    /// Build every component from configuration. With `mock` set, both
    /// printers are simulated and always present.
    pub async fn initialize(config: &Config, mock: bool) -> Result<Self, StartupError> {
        let sync = Arc::new(DeviceSyncClient::new(config.client_config())?);
        let notifier: Arc<dyn JobNotifier> = sync.clone();

        let control: Arc<dyn ServiceControl> =
            Arc::new(BalenaSupervisor::new(&config.supervisor, config.http_timeout)?);
        let supervisor = Arc::new(HealthSupervisor::new(
            control.clone(),
            config.restart_policy,
            config.health,
        ));
        let watchdog = Arc::new(Watchdog::new(
            control,
            config.restart_policy,
            config.watchdog,
        ));

        let (receipt_plan, label_plan) = if mock {
            warn!("running with simulated printers");
            let receipt_model = config
                .receipt
                .as_ref()
                .map(|c| c.model)
                .unwrap_or(PrinterModel::EuM30);
            (
                Some(PrinterPlan::mock(receipt_model, config.receipt.as_ref())),
                Some(PrinterPlan::mock(PrinterModel::TmL100, config.label.as_ref())),
            )
        } else {
            (
                config.receipt.as_ref().map(PrinterPlan::from_config),
                config.label.as_ref().map(PrinterPlan::from_config),
            )
        };

        let mut managers = Vec::new();
        for plan in [receipt_plan, label_plan].into_iter().flatten() {
            let service = plan.service_name.clone();
            let manager = Arc::new(build_manager(plan, config, notifier.clone()));
            info!(
                printer = manager.name(),
                model = manager.model().name(),
                usb_id = %manager.model().usb_id(),
                %service,
                "printer managed"
            );
            supervisor.monitor(manager.clone(), service).await;
            managers.push(manager);
        }
        if managers.is_empty() {
            warn!("no printers configured");
        }

        let by_kind = |kind: PrinterKind| {
            managers
                .iter()
                .find(|m| m.model().kind() == kind)
                .cloned()
        };
        let sensors = Arc::new(TemperatureSensors::new(&config.w1_devices_dir));
        let state = AppState::new(
            by_kind(PrinterKind::Receipt),
            by_kind(PrinterKind::Label),
            sensors,
        )
        .with_watchdog(watchdog.clone());

        let light = match &config.light_url {
            Some(url) => {
                let controller = HttpLightController::new(url, config.http_timeout)?;
                Some(Arc::new(LightReconciler::new(Box::new(controller))))
            }
            None => None,
        };

        let hooks = Arc::new(
            EdgeSyncHooks::new(state.clone(), config.health)
                .with_light(light)
                .with_supervisor(supervisor.clone())
                .with_watchdog(watchdog.clone()),
        );

        Ok(Self {
            state,
            sync,
            supervisor,
            watchdog,
            hooks,
        })
    }

    /// Spawn the supervisor, watchdog, backend poller and sensor sampler
    pub fn start_background_tasks(&self, tasks: &mut BackgroundTasks) {
        let token = tasks.shutdown_token();

        let supervisor = self.supervisor.clone();
        let shutdown = token.clone();
        tasks.spawn("health_supervisor", TaskKind::Supervisor, async move {
            supervisor.run(shutdown).await
        });

        let watchdog = self.watchdog.clone();
        let shutdown = token.clone();
        tasks.spawn("device_watchdog", TaskKind::Watchdog, async move {
            watchdog.run(shutdown).await
        });

        let sync = self.sync.clone();
        let hooks: Arc<dyn SyncHooks> = self.hooks.clone();
        let shutdown = token.clone();
        tasks.spawn("backend_poller", TaskKind::Poller, async move {
            sync.start_polling(hooks, shutdown).await
        });

        let sensors = self.state.sensors.clone();
        tasks.spawn("temperature_sampler", TaskKind::Sampler, async move {
            sensors.run(token).await
        });

        tasks.log_summary();
    }
}

fn build_manager(
    plan: PrinterPlan,
    config: &Config,
    notifier: Arc<dyn JobNotifier>,
) -> PrinterManager {
    let logo = config
        .logo_path
        .as_deref()
        .and_then(|path| process_logo(path, plan.model.max_dots()))
        .map(Arc::new);
    let renderer = JobRenderer::new(plan.model)
        .with_logo(logo)
        .with_feedback_url(config.feedback_url.clone());

    PrinterManager::new(plan.model, plan.device)
        .with_allow_low_paper(plan.allow_low_paper)
        .with_renderer(renderer)
        .with_dedupe_window(config.dedupe_window)
        .with_notifier(notifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(extra: &[(&'static str, &'static str)]) -> Config {
        let mut vars = HashMap::from([
            ("API_URL", "http://127.0.0.1:9"),
            ("ANON_KEY", "anon"),
            ("DEVICE_USER", "island@example.com"),
            ("DEVICE_PASSWORD", "secret"),
            ("DEVICE_ID", "dev-1"),
            ("DEVICE_NAME", "Island 1"),
            ("BALENA_SUPERVISOR_ADDRESS", "http://127.0.0.1:9"),
            ("BALENA_SUPERVISOR_API_KEY", "key"),
            ("BALENA_APP_ID", "42"),
            ("DEVICE_RESTART_POLICY", "none"),
            ("W1_DEVICES_DIR", "/nonexistent"),
        ]);
        vars.extend(extra.iter().copied());
        Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_printers_are_not_managed() {
        let services = Services::initialize(&config(&[]), false).await.unwrap();
        assert!(services.state.receipt.is_none());
        assert!(services.state.label.is_none());
        assert!(services.state.snapshot().printers.is_empty());
        // Watchdog routes are served even without printers
        assert!(services.state.watchdog.is_some());
    }

    #[tokio::test]
    async fn test_background_tasks_include_watchdog() {
        let services = Services::initialize(&config(&[]), true).await.unwrap();
        let mut tasks = BackgroundTasks::new();
        services.start_background_tasks(&mut tasks);
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks.check_health(), 0);
        tasks.shutdown(std::time::Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_mock_mode_manages_both_printers() {
        let services = Services::initialize(&config(&[("LABEL_ALLOW_LOW_PAPER", "true")]), true)
            .await
            .unwrap();
        let receipt = services.state.receipt.clone().unwrap();
        let label = services.state.label.clone().unwrap();
        assert_eq!(receipt.model(), PrinterModel::EuM30);
        assert_eq!(label.model(), PrinterModel::TmL100);

        let snapshot = services.state.snapshot();
        assert_eq!(
            snapshot.printers.keys().collect::<Vec<_>>(),
            vec!["label", "receipt"]
        );
    }

    #[tokio::test]
    async fn test_configured_printer_is_managed() {
        // Nothing is opened until the first status query
        let services =
            Services::initialize(&config(&[("RECEIPT_PRINTER", "/dev/usb/lp7")]), false)
                .await
                .unwrap();
        let receipt = services.state.receipt.clone().unwrap();
        assert_eq!(receipt.name(), "receipt");
        assert!(services.state.label.is_none());
    }
}
