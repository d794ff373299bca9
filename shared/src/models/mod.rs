//! Data models
//!
//! Shared between the peripheral managers, the sync client and the HTTP surface.

pub mod health;
pub mod job;
pub mod printer;
pub mod remote_state;
pub mod sync;

// Re-exports
pub use health::*;
pub use job::*;
pub use printer::*;
pub use remote_state::*;
pub use sync::*;
