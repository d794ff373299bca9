//! Kiosk Edge - peripheral orchestrator for an unattended kiosk
//!
//! # Overview
//!
//! - **Printing** (`printing`): one serialized, throttled manager per
//!   thermal printer, with duplicate-job suppression and backend
//!   notification
//! - **Supervision** (`supervisor`): adaptive health loop that restarts
//!   missing peripherals through the local supervisor API, and a watchdog
//!   that recovers the device when the backend goes silent or on a daily
//!   schedule
//! - **Backend sync** (`sync_hooks`): health snapshots out, remote device
//!   state in (store light, supervisor nudge)
//! - **Sensors** (`sensors`): 1-Wire temperature readings
//! - **HTTP API** (`api`): the peripheral routes the kiosk front door calls
//!
//! # Layout
//!
//! ```text
//! kiosk-edge/src/
//! ├── core/          # config, state, background tasks
//! ├── printing/      # executor, renderer, throttle, dedupe
//! ├── supervisor/    # health loop, watchdog, restart budget, service control
//! ├── peripherals/   # store light
//! ├── api/           # axum routes
//! ├── sensors.rs     # DS18B20 sampling
//! ├── sync_hooks.rs  # backend poll callbacks
//! └── utils/         # logging
//! ```

pub mod api;
pub mod core;
pub mod peripherals;
pub mod printing;
pub mod sensors;
pub mod supervisor;
pub mod sync_hooks;
pub mod utils;

// Re-exports
pub use api::{build_app, build_router};
pub use core::{AppState, BackgroundTasks, Config, ConfigError, Services, StartupError};
pub use printing::{ExecutorError, PrinterManager};
pub use supervisor::{HealthSupervisor, Watchdog};
pub use sync_hooks::EdgeSyncHooks;
pub use utils::init_logger_with_file;
