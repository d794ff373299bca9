//! Kiosk Client - backend sync client for the kiosk device
//!
//! Authenticates the device, pushes local health, pulls remote device state
//! and reports print/label/audio events.

pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod sync;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::HttpClient;
pub use session::AuthSession;
pub use sync::{DeviceSyncClient, SyncHooks};

// Re-export shared types for convenience
pub use shared::{HealthSnapshot, RemoteDeviceState, SyncEvent};
