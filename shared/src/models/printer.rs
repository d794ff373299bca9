//! Printer status model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall printer status
///
/// Exactly one value is current at a time; it is replaced wholesale on every
/// status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterStatus {
    Ready,
    LowPaper,
    NoPaper,
    PrinterOffline,
    Error,
    NotFound,
    #[default]
    Unknown,
}

impl PrinterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrinterStatus::Ready => "ready",
            PrinterStatus::LowPaper => "low_paper",
            PrinterStatus::NoPaper => "no_paper",
            PrinterStatus::PrinterOffline => "printer_offline",
            PrinterStatus::Error => "error",
            PrinterStatus::NotFound => "not_found",
            PrinterStatus::Unknown => "unknown",
        }
    }

    /// Whether a print job may run in this state.
    ///
    /// `low_paper` is only eligible when the printer is configured to allow it.
    pub fn is_print_eligible(&self, allow_low_paper: bool) -> bool {
        match self {
            PrinterStatus::Ready => true,
            PrinterStatus::LowPaper => allow_low_paper,
            _ => false,
        }
    }
}

impl fmt::Display for PrinterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status plus an optional human-readable reason
///
/// Body of `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: PrinterStatus,
    pub reason: Option<String>,
}

impl StatusReport {
    pub fn new(status: PrinterStatus) -> Self {
        Self {
            status,
            reason: None,
        }
    }

    pub fn with_reason(status: PrinterStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        let report = StatusReport::with_reason(PrinterStatus::PrinterOffline, "cover_open");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "printer_offline");
        assert_eq!(json["reason"], "cover_open");

        let json = serde_json::to_value(StatusReport::new(PrinterStatus::Ready)).unwrap();
        assert_eq!(json["reason"], serde_json::Value::Null);
    }

    #[test]
    fn test_print_eligibility() {
        assert!(PrinterStatus::Ready.is_print_eligible(false));
        assert!(PrinterStatus::LowPaper.is_print_eligible(true));
        assert!(!PrinterStatus::LowPaper.is_print_eligible(false));
        assert!(!PrinterStatus::NotFound.is_print_eligible(true));
        assert!(!PrinterStatus::Unknown.is_print_eligible(true));
    }
}
