//! # kiosk-printer
//!
//! ESC/POS thermal printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to talk to a printer:
//! - ESC/POS command building (text, barcodes, QR, raster logo, user settings)
//! - Real-time status queries and their decoding
//! - Device transports (raw TCP, `/dev/usb/lp*`) and a scripted mock
//! - Word wrapping for fixed-width text
//!
//! WHAT to print, and when, stays in the orchestrator (`kiosk-edge`).
//!
//! ## Example
//!
//! ```ignore
//! use kiosk_printer::{DeviceAddress, EscPosBuilder, PrinterModel, check_status};
//!
//! let model = PrinterModel::EuM30;
//! let mut device = DeviceAddress::parse("tcp://192.168.1.50:9100")?.connect(model.io_timeout());
//! let report = check_status(device.as_mut(), model).await;
//!
//! let mut b = EscPosBuilder::new();
//! b.center().double_size().line("Order #: 12").cut();
//! device.open().await?;
//! device.write(&b.build()).await?;
//! device.close().await?;
//! ```

mod device;
mod error;
mod escpos;
pub mod mock;
mod model;
pub mod status;
pub mod text;

// Re-exports
pub use device::{CharDevice, DeviceAddress, DeviceIo, TcpDevice};
pub use error::{PrintError, PrintResult};
pub use escpos::{EscPosBuilder, QrErrorCorrection, raster_from_pixels};
pub use mock::MockDevice;
pub use model::{
    CONFIGURATION_SLEEP, PRINT_COOLDOWN, PrinterKind, PrinterModel, SEGMENT_SLEEP, VENDOR_EPSON,
};
pub use status::{StatusQuery, check_status};

#[cfg(feature = "image")]
pub use escpos::process_logo;
