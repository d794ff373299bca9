//! Configuration, application state and background task management

pub mod config;
pub mod state;
pub mod tasks;

pub use config::{
    Config, ConfigError, HealthTimings, PrinterConfig, RestartPolicy, SupervisorConfig,
    WatchdogSettings,
};
pub use state::{AppState, Services, StartupError};
pub use tasks::{BackgroundTasks, TaskKind};
