//! Real-time status decoding (DLE EOT n)
//!
//! Each query sends `DLE EOT n` and reads a short reply. The reply bytes are
//! read as a big-endian integer, checked against the query's allow-list,
//! and every flag is computed by mask equality: `(v & MASK) == MASK`.
//! Overlap is not enough; the vendor's bit layout sets fixed bits in every
//! reply, so only exact mask matches are meaningful.

use crate::device::DeviceIo;
use crate::error::{PrintError, PrintResult};
use crate::model::PrinterModel;
use shared::{PrinterStatus, StatusReport};
use tracing::{debug, instrument, warn};

/// Reply read timeout on top of the model's reply delay
const READ_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);

// Printer status (n = 1)
pub const VALID_PRINTER_STATUSES: [u32; 8] = [
    0b0001_0110,
    0b0001_1110,
    0b0011_0110,
    0b0011_1110,
    0b0101_0110,
    0b0101_1110,
    0b0111_0110,
    0b0111_1110,
];
pub const OFFLINE_MASK: u32 = 0b0001_1110;
pub const WAITING_FOR_RECOVERY_MASK: u32 = 0b0011_0110;
pub const PAPER_FEED_BUTTON_MASK: u32 = 0b0101_0110;

// Offline cause (n = 2)
pub const OFFLINE_COVER_OPEN_MASK: u32 = 0b0001_0110;
pub const OFFLINE_PAPER_FEED_BUTTON_MASK: u32 = 0b0001_1010;
pub const OFFLINE_PAPER_OUT_MASK: u32 = 0b0011_0010;
pub const OFFLINE_ERROR_MASK: u32 = 0b0101_0010;

// Error cause (n = 3)
pub const ERROR_RECOVERABLE_MASK: u32 = 0b0001_0110;
pub const ERROR_AUTOCUTTER_MASK: u32 = 0b0001_1010;
pub const ERROR_UNRECOVERABLE_MASK: u32 = 0b0011_0010;
pub const ERROR_AUTORECOVERABLE_MASK: u32 = 0b0101_0010;

// Paper sensor (n = 4)
pub const VALID_PAPER_STATUSES: [u32; 4] = [0b0001_0010, 0b0111_0010, 0b0001_1110, 0b0111_1110];
pub const VALID_PAPER_STATUSES_NO_LOW: [u32; 2] = [0b0001_0010, 0b0111_0010];
pub const PAPER_OUT_MASK: u32 = 0b0111_0010;
pub const PAPER_LOW_MASK: u32 = 0b0001_1110;

/// Status query subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusQuery {
    Printer = 1,
    OfflineCause = 2,
    ErrorCause = 3,
    Paper = 4,
}

impl StatusQuery {
    /// DLE EOT n
    pub fn command(self) -> [u8; 3] {
        [0x10, 0x04, self as u8]
    }

    /// Inverse of [`command`](Self::command)
    pub fn from_command(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0x10, 0x04, 1] => Some(StatusQuery::Printer),
            [0x10, 0x04, 2] => Some(StatusQuery::OfflineCause),
            [0x10, 0x04, 3] => Some(StatusQuery::ErrorCause),
            [0x10, 0x04, 4] => Some(StatusQuery::Paper),
            _ => None,
        }
    }
}

/// Reply bytes as a big-endian integer. An empty reply is 0, which no
/// allow-list contains.
pub fn reply_value(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

#[inline]
fn flag(value: u32, mask: u32) -> bool {
    value & mask == mask
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrinterFlags {
    pub query_error: bool,
    pub offline: bool,
    pub waiting_for_recovery: bool,
    pub paper_feed_button: bool,
}

pub fn decode_printer_status(value: u32) -> PrinterFlags {
    let valid = VALID_PRINTER_STATUSES.contains(&value);
    PrinterFlags {
        query_error: !valid,
        offline: valid && flag(value, OFFLINE_MASK),
        waiting_for_recovery: valid && flag(value, WAITING_FOR_RECOVERY_MASK),
        paper_feed_button: valid && flag(value, PAPER_FEED_BUTTON_MASK),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OfflineCause {
    pub query_error: bool,
    pub cover_open: bool,
    pub paper_feed_button: bool,
    pub paper_out: bool,
    pub error: bool,
}

impl OfflineCause {
    /// First matching cause other than `error`
    pub fn reason(&self) -> Option<&'static str> {
        if self.query_error {
            None
        } else if self.cover_open {
            Some("cover_open")
        } else if self.paper_feed_button {
            Some("paper_feed_button")
        } else if self.paper_out {
            Some("paper_out")
        } else {
            None
        }
    }
}

/// Valid only when at least one cause matches
pub fn decode_offline_cause(value: u32) -> OfflineCause {
    let cover_open = flag(value, OFFLINE_COVER_OPEN_MASK);
    let paper_feed_button = flag(value, OFFLINE_PAPER_FEED_BUTTON_MASK);
    let paper_out = flag(value, OFFLINE_PAPER_OUT_MASK);
    let error = flag(value, OFFLINE_ERROR_MASK);
    OfflineCause {
        query_error: !(cover_open || paper_feed_button || paper_out || error),
        cover_open,
        paper_feed_button,
        paper_out,
        error,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorCause {
    pub query_error: bool,
    pub recoverable: bool,
    pub autocutter: bool,
    pub unrecoverable: bool,
    pub autorecoverable: bool,
}

impl ErrorCause {
    /// autorecoverable > unrecoverable > recoverable > autocutter
    pub fn reason(&self) -> Option<&'static str> {
        if self.query_error {
            None
        } else if self.autorecoverable {
            Some("autorecoverable")
        } else if self.unrecoverable {
            Some("unrecoverable")
        } else if self.recoverable {
            Some("recoverable")
        } else if self.autocutter {
            Some("autocutter")
        } else {
            None
        }
    }
}

pub fn decode_error_cause(value: u32) -> ErrorCause {
    let recoverable = flag(value, ERROR_RECOVERABLE_MASK);
    let autocutter = flag(value, ERROR_AUTOCUTTER_MASK);
    let unrecoverable = flag(value, ERROR_UNRECOVERABLE_MASK);
    let autorecoverable = flag(value, ERROR_AUTORECOVERABLE_MASK);
    ErrorCause {
        query_error: !(recoverable || autocutter || unrecoverable || autorecoverable),
        recoverable,
        autocutter,
        unrecoverable,
        autorecoverable,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaperFlags {
    pub query_error: bool,
    pub paper_out: bool,
    pub paper_low: bool,
}

/// Decode the paper sensor reply. Models without a near-end sensor use the
/// shorter allow-list and never report low paper.
pub fn decode_paper_status(value: u32, has_low_sensor: bool) -> PaperFlags {
    let valid = if has_low_sensor {
        VALID_PAPER_STATUSES.contains(&value)
    } else {
        VALID_PAPER_STATUSES_NO_LOW.contains(&value)
    };
    let paper_out = valid && flag(value, PAPER_OUT_MASK);
    PaperFlags {
        query_error: !valid,
        paper_out,
        paper_low: has_low_sensor && valid && !paper_out && flag(value, PAPER_LOW_MASK),
    }
}

/// Compose overall status from the sub-queries. First match wins.
pub fn compose_status(
    printer: PrinterFlags,
    paper: PaperFlags,
    offline_cause: Option<OfflineCause>,
    error_cause: Option<ErrorCause>,
) -> StatusReport {
    if printer.query_error {
        return StatusReport::with_reason(PrinterStatus::Unknown, "invalid printer status");
    }
    if paper.query_error {
        return StatusReport::with_reason(PrinterStatus::Unknown, "invalid paper status");
    }
    if paper.paper_out {
        return StatusReport::new(PrinterStatus::NoPaper);
    }
    if !printer.offline {
        return if paper.paper_low {
            StatusReport::new(PrinterStatus::LowPaper)
        } else {
            StatusReport::new(PrinterStatus::Ready)
        };
    }

    let Some(cause) = offline_cause.filter(|c| !c.query_error) else {
        return StatusReport::new(PrinterStatus::PrinterOffline);
    };
    if let Some(reason) = cause.reason() {
        return StatusReport::with_reason(PrinterStatus::PrinterOffline, reason);
    }
    if cause.error {
        return match error_cause.and_then(|e| e.reason()) {
            Some(reason) => StatusReport::with_reason(PrinterStatus::Error, reason),
            None => StatusReport::new(PrinterStatus::Error),
        };
    }
    StatusReport::new(PrinterStatus::PrinterOffline)
}

/// Issue one query: open, write, wait for the reply, read, close.
async fn query(
    device: &mut dyn DeviceIo,
    model: PrinterModel,
    query: StatusQuery,
) -> PrintResult<u32> {
    device.open().await?;
    let result: PrintResult<Vec<u8>> = async {
        device.write(&query.command()).await?;
        tokio::time::sleep(model.reply_delay()).await;
        device.read(READ_TIMEOUT).await
    }
    .await;
    device.close().await?;
    let value = reply_value(&result?);
    debug!(?query, value = %format!("{value:#010b}"), "status reply");
    Ok(value)
}

async fn query_status(device: &mut dyn DeviceIo, model: PrinterModel) -> PrintResult<StatusReport> {
    let printer = decode_printer_status(query(device, model, StatusQuery::Printer).await?);
    let paper = decode_paper_status(
        query(device, model, StatusQuery::Paper).await?,
        model.has_low_paper_sensor(),
    );

    // Cause queries only when they can change the outcome
    let needs_cause =
        !printer.query_error && !paper.query_error && !paper.paper_out && printer.offline;
    let offline_cause = if needs_cause {
        Some(decode_offline_cause(
            query(device, model, StatusQuery::OfflineCause).await?,
        ))
    } else {
        None
    };
    let needs_error = offline_cause.is_some_and(|c| c.reason().is_none() && c.error);
    let error_cause = if needs_error {
        Some(decode_error_cause(
            query(device, model, StatusQuery::ErrorCause).await?,
        ))
    } else {
        None
    };

    Ok(compose_status(printer, paper, offline_cause, error_cause))
}

/// Query the printer and classify its state.
///
/// Never fails: an absent device is `not_found` with the error text as the
/// reason, any other failure is `unknown` with `exception: ...`. The device
/// is always left closed.
#[instrument(skip(device, model), fields(device = %device.describe(), model = model.name()))]
pub async fn check_status(device: &mut dyn DeviceIo, model: PrinterModel) -> StatusReport {
    let report = match query_status(device, model).await {
        Ok(report) => report,
        Err(PrintError::NotFound(msg)) => {
            warn!(error = %msg, "printer not found");
            StatusReport::with_reason(PrinterStatus::NotFound, msg)
        }
        Err(e) => {
            warn!(error = %e, "status check error");
            StatusReport::with_reason(PrinterStatus::Unknown, format!("exception: {e}"))
        }
    };
    let _ = device.close().await;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;

    #[test]
    fn test_printer_status_mask_equality() {
        for v in VALID_PRINTER_STATUSES {
            let flags = decode_printer_status(v);
            assert!(!flags.query_error);
            assert_eq!(flags.offline, v & OFFLINE_MASK == OFFLINE_MASK, "{v:#b}");
        }
        // 0x16 overlaps the offline mask but does not equal it
        assert!(!decode_printer_status(0b0001_0110).offline);
        assert!(decode_printer_status(0b0001_1110).offline);
        assert!(decode_printer_status(0b0011_0110).waiting_for_recovery);
        assert!(decode_printer_status(0b0101_0110).paper_feed_button);
    }

    #[test]
    fn test_invalid_reply_never_ready() {
        for v in 0u32..=0xFF {
            if VALID_PRINTER_STATUSES.contains(&v) {
                continue;
            }
            let flags = decode_printer_status(v);
            assert!(flags.query_error);
            assert!(!flags.offline);
            let report = compose_status(
                flags,
                decode_paper_status(0x12, true),
                None,
                None,
            );
            assert_eq!(report.status, PrinterStatus::Unknown);
        }
    }

    #[test]
    fn test_reply_value_big_endian() {
        assert_eq!(reply_value(&[0x16]), 0x16);
        assert_eq!(reply_value(&[0x01, 0x16]), 0x0116);
        assert_eq!(reply_value(&[]), 0);
    }

    #[test]
    fn test_offline_cause_validity() {
        assert!(decode_offline_cause(0).query_error);
        let cause = decode_offline_cause(OFFLINE_COVER_OPEN_MASK);
        assert!(cause.cover_open);
        assert_eq!(cause.reason(), Some("cover_open"));
        let cause = decode_offline_cause(OFFLINE_ERROR_MASK);
        assert!(cause.error);
        assert_eq!(cause.reason(), None);
    }

    #[test]
    fn test_error_cause_precedence() {
        assert_eq!(
            decode_error_cause(ERROR_AUTORECOVERABLE_MASK).reason(),
            Some("autorecoverable")
        );
        // 0x7E matches every mask; autorecoverable wins
        assert_eq!(decode_error_cause(0x7E).reason(), Some("autorecoverable"));
        assert_eq!(
            decode_error_cause(ERROR_UNRECOVERABLE_MASK | ERROR_RECOVERABLE_MASK).reason(),
            Some("unrecoverable")
        );
        assert_eq!(decode_error_cause(ERROR_AUTOCUTTER_MASK).reason(), Some("autocutter"));
        assert!(decode_error_cause(0).query_error);
    }

    #[test]
    fn test_paper_status() {
        let flags = decode_paper_status(0x12, true);
        assert!(!flags.query_error && !flags.paper_out && !flags.paper_low);
        assert!(decode_paper_status(0x72, true).paper_out);
        assert!(decode_paper_status(0x1E, true).paper_low);
        // Out takes priority over low
        let flags = decode_paper_status(0x7E, true);
        assert!(flags.paper_out && !flags.paper_low);
        // No near-end sensor: 0x1E is not a legal reply
        assert!(decode_paper_status(0x1E, false).query_error);
    }

    #[test]
    fn test_compose_precedence() {
        let online = decode_printer_status(0x16);
        let offline = decode_printer_status(0x1E);
        let paper_ok = decode_paper_status(0x12, true);

        assert_eq!(
            compose_status(online, decode_paper_status(0x00, true), None, None).reason.as_deref(),
            Some("invalid paper status")
        );
        assert_eq!(
            compose_status(offline, decode_paper_status(0x72, true), None, None).status,
            PrinterStatus::NoPaper
        );
        assert_eq!(
            compose_status(online, decode_paper_status(0x1E, true), None, None).status,
            PrinterStatus::LowPaper
        );

        let report = compose_status(offline, paper_ok, Some(decode_offline_cause(0)), None);
        assert_eq!(report, StatusReport::new(PrinterStatus::PrinterOffline));

        let report = compose_status(
            offline,
            paper_ok,
            Some(decode_offline_cause(OFFLINE_ERROR_MASK)),
            Some(decode_error_cause(ERROR_UNRECOVERABLE_MASK)),
        );
        assert_eq!(
            report,
            StatusReport::with_reason(PrinterStatus::Error, "unrecoverable")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_status_cover_open() {
        let mut device = MockDevice::ready();
        device.set_reply(StatusQuery::Printer, 0b0001_1110);
        device.set_reply(StatusQuery::OfflineCause, OFFLINE_COVER_OPEN_MASK as u8);

        let report = check_status(&mut device, PrinterModel::EuM30).await;
        assert_eq!(
            report,
            StatusReport::with_reason(PrinterStatus::PrinterOffline, "cover_open")
        );
        assert!(!device.is_open());
        // printer, paper, offline cause; no error-cause query
        assert_eq!(device.queries().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_status_ready_skips_cause_queries() {
        let mut device = MockDevice::ready();
        let report = check_status(&mut device, PrinterModel::TmL100).await;
        assert_eq!(report, StatusReport::new(PrinterStatus::Ready));
        assert_eq!(
            device.queries(),
            vec![StatusQuery::Printer, StatusQuery::Paper]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_status_not_found() {
        let mut device = MockDevice::ready();
        device.set_not_found(true);
        let report = check_status(&mut device, PrinterModel::EuM30).await;
        assert_eq!(report.status, PrinterStatus::NotFound);
        assert!(report.reason.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_status_io_failure_is_unknown() {
        let mut device = MockDevice::ready();
        device.fail_writes_after(0);
        let report = check_status(&mut device, PrinterModel::EuM30).await;
        assert_eq!(report.status, PrinterStatus::Unknown);
        assert!(report.reason.unwrap().starts_with("exception: "));
        assert!(!device.is_open());
    }
}
