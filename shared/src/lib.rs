//! Shared types for the kiosk peripheral stack
//!
//! Wire and domain types used by the printer library, the backend sync
//! client and the edge orchestrator: printer status, print jobs, health
//! snapshots, remote device state and HTTP response bodies.

pub mod models;
pub mod response;

// Re-exports
pub use models::{
    HealthSnapshot, LabelJob, PrinterStatus, ReceiptJob, RemoteDeviceState, SensorEvent,
    StatusReport, SyncEvent, TemperatureData, is_valid_upc, parse_upc_list,
};
pub use response::SuccessResponse;
pub use serde::{Deserialize, Serialize};
