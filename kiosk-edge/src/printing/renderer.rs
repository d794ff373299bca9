//! Job layouts
//!
//! Every layout renders to a list of segments. The executor writes them one
//! at a time with a short pause so the printer buffer can drain. The final
//! cut is not part of a layout: the executor always sends [`finish`], even
//! when a segment write failed.

use kiosk_printer::text::wrap;
use kiosk_printer::{EscPosBuilder, PrinterModel, QrErrorCorrection};
use shared::models::title_case;
use shared::{LabelJob, ReceiptJob, is_valid_upc};
use std::sync::Arc;

pub const INVALID_UPC: &str = "Invalid UPC";
pub const RELOADING_PAPER: &str = "RELOADING PAPER";
pub const FEEDBACK_PROMPT: &str = "How was your order? Scan to let us know:";
pub const PAID: &str = "PAID";

const BARCODE_WIDTH: u8 = 2;
const QR_SIZE: u8 = 5;

/// User-setting values written by `/configure`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterSettings {
    Receipt { fast: bool, high_density: bool },
    Label { buzzer: bool, paper_removal_standby: bool },
}

/// Customized value ids (GS ( E function 5)
mod customize {
    pub const PRINT_DENSITY: u8 = 5;
    pub const PRINT_SPEED: u8 = 6;
    pub const PAPER_REMOVAL_STANDBY: u8 = 0x0E;
    pub const BUZZER: u8 = 0x77;
}

/// Final segment of every job
pub fn finish() -> Vec<u8> {
    let mut b = EscPosBuilder::segment();
    b.normal().cut();
    b.build()
}

/// Renders jobs for one printer model
#[derive(Debug, Clone)]
pub struct JobRenderer {
    model: PrinterModel,
    logo: Option<Arc<Vec<u8>>>,
    feedback_url: Option<String>,
}

impl JobRenderer {
    pub fn new(model: PrinterModel) -> Self {
        Self {
            model,
            logo: None,
            feedback_url: None,
        }
    }

    /// Raster logo printed at the top of receipts and labels
    pub fn with_logo(mut self, logo: Option<Arc<Vec<u8>>>) -> Self {
        self.logo = logo;
        self
    }

    /// Base URL encoded in label QR codes
    pub fn with_feedback_url(mut self, url: Option<String>) -> Self {
        self.feedback_url = url;
        self
    }

    fn start(&self) -> Vec<Vec<u8>> {
        let mut b = EscPosBuilder::new();
        b.normal();
        let mut segments = vec![b.build()];
        if let Some(logo) = &self.logo {
            segments.push(logo.as_ref().clone());
        }
        segments
    }

    pub fn receipt(&self, job: &ReceiptJob) -> Vec<Vec<u8>> {
        let mut segments = self.start();

        if let Some(heading) = job.heading_text() {
            segments.push(heading_segment(&heading));
        }
        if let Some(instructions) = non_empty(job.instructions.as_deref()) {
            segments.push(message_segment(instructions, true));
        }
        let details = job.body_lines.join("\n");
        if !details.trim().is_empty() {
            let mut b = EscPosBuilder::segment();
            b.ln(2).normal().text(&wrap(&details, false));
            segments.push(b.build());
        }
        if let Some(minutes) = job.wait_minutes {
            segments.push(message_segment(&format!("Estimated wait: {minutes} min"), false));
        }
        for upc in job.upcs.iter().filter(|u| !u.is_empty()) {
            if is_valid_upc(upc) {
                let mut b = EscPosBuilder::segment();
                b.ln(2)
                    .barcode_upc_a(upc, self.model.barcode_height(), BARCODE_WIDTH);
                segments.push(b.build());
            } else {
                tracing::warn!(upc = %upc, "invalid UPC");
                segments.push(message_segment(INVALID_UPC, false));
            }
        }
        if let Some(message) = non_empty(job.message.as_deref()) {
            segments.push(message_segment(message, false));
        }
        segments
    }

    pub fn label(&self, job: &LabelJob) -> Vec<Vec<u8>> {
        let mut segments = self.start();

        if !job.order.is_empty() {
            segments.push(heading_segment(&format!("Order #: {}", title_case(&job.order))));
        }

        if !job.item.is_empty() {
            let detail = match job.item_count() {
                Some((n, total)) => format!("{} ({n} of {total})", job.item),
                None => job.item.clone(),
            };
            let mut b = EscPosBuilder::segment();
            b.ln(2).normal().text(&wrap(&detail, false)).ln(3);
            segments.push(b.build());
        }

        if job.wants_feedback_qr()
            && let (Some(base), Some(fulfillment)) = (&self.feedback_url, &job.fulfillment)
        {
            let mut b = EscPosBuilder::segment();
            b.normal().text(FEEDBACK_PROMPT).ln(2).qr_code(
                &format!("{base}?meta={fulfillment}&item={}", job.item),
                QR_SIZE,
                QrErrorCorrection::M,
            );
            segments.push(b.build());
        }

        if job.paid {
            let mut b = EscPosBuilder::segment();
            b.ln(1)
                .center()
                .double_size()
                .bold()
                .text(PAID)
                .ln(1)
                .normal();
            segments.push(b.build());
        } else {
            let count = job.upcs.len();
            for (i, upc) in job.upcs.iter().enumerate() {
                let mut b = EscPosBuilder::segment();
                if is_valid_upc(upc) {
                    b.barcode_upc_a(upc, self.model.barcode_height(), BARCODE_WIDTH);
                } else {
                    tracing::warn!(upc = %upc, "invalid UPC");
                    b.ln(2).normal().text(INVALID_UPC);
                }
                if i + 1 < count {
                    b.ln(3);
                }
                segments.push(b.build());
            }
        }
        segments
    }

    /// Large centered text between blank feeds
    pub fn text(&self, text: &str) -> Vec<Vec<u8>> {
        let mut b = EscPosBuilder::new();
        b.ln(4)
            .center()
            .double_size()
            .bold()
            .text(text)
            .ln(4)
            .normal();
        vec![b.build()]
    }

    /// Blank feed used while swapping the paper roll
    pub fn reload(&self) -> Vec<Vec<u8>> {
        let mut b = EscPosBuilder::new();
        b.ln(12).text(RELOADING_PAPER).ln(12);
        vec![b.build()]
    }

    /// User-setting mode session. The printer resets on close, so no cut follows.
    pub fn configure(&self, settings: PrinterSettings) -> Vec<Vec<u8>> {
        let values = match settings {
            PrinterSettings::Receipt { fast, high_density } => [
                (customize::PRINT_DENSITY, if high_density { 6 } else { 0 }),
                (customize::PRINT_SPEED, if fast { 12 } else { 8 }),
            ],
            PrinterSettings::Label {
                buzzer,
                paper_removal_standby,
            } => [
                (customize::BUZZER, if buzzer { 2 } else { 0 }),
                (
                    customize::PAPER_REMOVAL_STANDBY,
                    if paper_removal_standby { 0x40 } else { 0 },
                ),
            ],
        };

        let mut segments = Vec::with_capacity(values.len() + 2);
        let mut open = EscPosBuilder::segment();
        open.user_setting_open();
        segments.push(open.build());
        for (a, n) in values {
            let mut b = EscPosBuilder::segment();
            b.customize_value(a, n);
            segments.push(b.build());
        }
        let mut close = EscPosBuilder::segment();
        close.user_setting_close();
        segments.push(close.build());
        segments
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

fn heading_segment(heading: &str) -> Vec<u8> {
    let mut b = EscPosBuilder::segment();
    b.ln(1)
        .center()
        .double_size()
        .bold()
        .text(&wrap(heading, true))
        .normal();
    b.build()
}

fn message_segment(message: &str, bold: bool) -> Vec<u8> {
    let mut b = EscPosBuilder::segment();
    b.ln(2).normal();
    if bold {
        b.bold();
    }
    b.text(&wrap(message, false));
    if bold {
        b.bold_off();
    }
    b.build()
}
