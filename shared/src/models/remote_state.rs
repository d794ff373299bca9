//! Remote device state returned by the backend

use serde::{Deserialize, Serialize};

/// Opaque JSON document; only a few well-known fields are read locally.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteDeviceState(pub serde_json::Value);

impl RemoteDeviceState {
    /// `store.open`, when present and boolean.
    pub fn store_open(&self) -> Option<bool> {
        self.0.pointer("/store/open").and_then(|v| v.as_bool())
    }
}

impl From<serde_json::Value> for RemoteDeviceState {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}
