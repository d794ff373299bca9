//! Success notifications sent to the backend

use serde::{Deserialize, Serialize};

/// Event reported through `notify_success`
///
/// Serializes to the request body of its endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncEvent {
    /// Receipt printed for an order
    PrintSuccess { order: String },
    /// Label printed for a fulfillment
    LabelSuccess { fulfillment: String },
    /// Audio service state change
    WaveStatus { status: String },
}

impl SyncEvent {
    /// Backend path, relative to the functions base URL
    pub fn path(&self) -> &'static str {
        match self {
            SyncEvent::PrintSuccess { .. } => "print",
            SyncEvent::LabelSuccess { .. } => "print-label",
            SyncEvent::WaveStatus { .. } => "wave-status",
        }
    }
}
