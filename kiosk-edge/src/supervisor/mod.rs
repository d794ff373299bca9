//! Peripheral health supervision
//!
//! - [`health`] - adaptive health loop and restart escalation
//! - [`budget`] - restart spacing
//! - [`service_control`] - local supervisor API
//! - [`watchdog`] - keepalive and scheduled device recovery

pub mod budget;
#[cfg(test)]
pub(crate) mod fake;
pub mod health;
pub mod service_control;
pub mod watchdog;

pub use budget::RestartBudget;
pub use health::HealthSupervisor;
pub use service_control::{
    BalenaSupervisor, ServiceControl, ServiceControlError, ServiceControlResult,
};
pub use watchdog::Watchdog;
