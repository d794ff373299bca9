//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// The peripheral is absent (unplugged, no device node, nothing listening)
    #[error("Device not found: {0}")]
    NotFound(String),

    /// Network connection error
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation on a device that was never opened
    #[error("Device not open: {0}")]
    NotOpen(String),

    /// The device stopped accepting data or stopped answering
    #[error("Device timed out: {0}")]
    Timeout(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl PrintError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PrintError::NotFound(_))
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
