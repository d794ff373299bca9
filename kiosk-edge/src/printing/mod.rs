//! Printing
//!
//! - [`executor`] - per-printer lock, readiness check and job execution
//! - [`renderer`] - receipt, label and maintenance layouts
//! - [`throttle`] - print/poll cooldown
//! - [`dedupe`] - duplicate submission guard

pub mod dedupe;
pub mod executor;
pub mod renderer;
pub mod throttle;

pub use executor::{ExecutorError, ExecutorResult, JobNotifier, PrinterManager};
pub use renderer::{JobRenderer, PrinterSettings};
