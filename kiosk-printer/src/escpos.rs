//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data. Kiosk text is
//! ASCII, so bytes go to the printer as written.

#[cfg(feature = "image")]
use tracing::instrument;

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;

/// QR code error correction level (GS ( k, function 169)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrErrorCorrection {
    L,
    M,
    Q,
    H,
}

impl QrErrorCorrection {
    fn code(self) -> u8 {
        match self {
            QrErrorCorrection::L => 0x30,
            QrErrorCorrection::M => 0x31,
            QrErrorCorrection::Q => 0x32,
            QrErrorCorrection::H => 0x33,
        }
    }
}

/// ESC/POS command builder
///
/// Builds ESC/POS byte sequences for thermal printers. A job is usually
/// built as several small segments so the printer's receive buffer can
/// drain between them.
pub struct EscPosBuilder {
    buf: Vec<u8>,
}

impl EscPosBuilder {
    /// Start a segment with the printer initialize command (ESC @)
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(512);
        buf.extend_from_slice(&[ESC, 0x40]);
        Self { buf }
    }

    /// Start a segment without initializing the printer
    pub fn segment() -> Self {
        Self {
            buf: Vec::with_capacity(256),
        }
    }

    // === Text Output ===

    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    /// Emit `lines` line feeds
    pub fn ln(&mut self, lines: u8) -> &mut Self {
        self.buf.extend(std::iter::repeat_n(b'\n', lines as usize));
        self
    }

    // === Alignment ===

    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, 0x61, 0x01]);
        self
    }

    // === Text Style ===

    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, 0x45, 0x01]);
        self
    }

    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, 0x45, 0x00]);
        self
    }

    /// Double width and height
    pub fn double_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[GS, 0x21, 0x11]);
        self
    }

    /// Reset to normal size
    pub fn reset_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[GS, 0x21, 0x00]);
        self
    }

    /// Centered, normal size, bold off
    pub fn normal(&mut self) -> &mut Self {
        self.center().reset_size().bold_off()
    }

    // === Paper Control ===

    /// Feed past the cutter and cut (GS V 66 n)
    pub fn cut(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[GS, 0x56, 0x42, 0x00]);
        self
    }

    // === Barcodes ===

    /// UPC-A barcode with human-readable digits below in font A
    ///
    /// `upc` must already be validated as 12 digits.
    pub fn barcode_upc_a(&mut self, upc: &str, height: u8, width: u8) -> &mut Self {
        // GS h n - height in dots
        self.buf.extend_from_slice(&[GS, 0x68, height]);
        // GS w n - module width
        self.buf.extend_from_slice(&[GS, 0x77, width.clamp(2, 6)]);
        // GS H 2 - HRI below
        self.buf.extend_from_slice(&[GS, 0x48, 0x02]);
        // GS f 0 - HRI font A
        self.buf.extend_from_slice(&[GS, 0x66, 0x00]);
        // GS k 65 n d1..dn - UPC-A
        let data = upc.as_bytes();
        self.buf.extend_from_slice(&[GS, 0x6B, 0x41, data.len() as u8]);
        self.buf.extend_from_slice(data);
        self
    }

    // === QR Code ===

    /// Print a QR code (model 2)
    ///
    /// Size: 1-16 (module size in dots)
    pub fn qr_code(&mut self, data: &str, size: u8, ec: QrErrorCorrection) -> &mut Self {
        let size = size.clamp(1, 16);

        // Function 165: Select model (Model 2)
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, 0x32, 0x00]);

        // Function 167: Set module size
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43, size]);

        // Function 169: Set error correction
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45, ec.code()]);

        // Function 180: Store data
        let data_bytes = data.as_bytes();
        let len = data_bytes.len() + 3;
        let p_l = (len & 0xFF) as u8;
        let p_h = ((len >> 8) & 0xFF) as u8;
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, p_l, p_h, 0x31, 0x50, 0x30]);
        self.buf.extend_from_slice(data_bytes);

        // Function 181: Print
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]);

        self
    }

    // === User Setting Mode (GS ( E) ===

    /// Function 1: enter user setting mode
    pub fn user_setting_open(&mut self) -> &mut Self {
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x45, 0x03, 0x00, 0x01, b'I', b'N']);
        self
    }

    /// Function 5: set customized value `a` to `n`
    pub fn customize_value(&mut self, a: u8, n: u8) -> &mut Self {
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x45, 0x04, 0x00, 0x05, a, n, 0x00]);
        self
    }

    /// Function 2: leave user setting mode (the printer resets)
    pub fn user_setting_close(&mut self) -> &mut Self {
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x45, 0x04, 0x00, 0x02, b'O', b'U', b'T']);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Image Processing
// ============================================================================

/// Process an image file and return ESC/POS raster data
///
/// The image will be:
/// - Resized to fit `max_width` dots
/// - Converted to 1-bit monochrome
/// - Encoded as GS v 0 raster graphics
///
/// Returns `None` when the file cannot be opened; the logo section is then
/// skipped.
#[cfg(feature = "image")]
#[instrument]
pub fn process_logo(path: &std::path::Path, max_width: u32) -> Option<Vec<u8>> {
    use image::GenericImageView;
    use tracing::{info, warn};

    let img = match image::open(path) {
        Ok(i) => {
            info!(dimensions = ?i.dimensions(), "logo image opened");
            i
        }
        Err(e) => {
            warn!(error = %e, "open logo failed, logo disabled");
            return None;
        }
    };

    let (w, h) = img.dimensions();
    let (new_w, new_h) = if w > max_width {
        let ratio = max_width as f64 / w as f64;
        (max_width, (h as f64 * ratio) as u32)
    } else {
        (w, h)
    };

    let resized = img.resize(new_w, new_h, image::imageops::FilterType::Nearest);
    let rgba = resized.to_rgba8();
    Some(raster_from_pixels(new_w, new_h, |x, y| {
        let pixel = rgba.get_pixel(x, y);
        // Transparent pixels stay white
        if pixel[3] < 128 {
            return false;
        }
        let luma = 0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32;
        luma < 128.0
    }))
}

/// Encode a monochrome bitmap as a centered GS v 0 raster image
pub fn raster_from_pixels(width: u32, height: u32, dark: impl Fn(u32, u32) -> bool) -> Vec<u8> {
    let x_bytes = width.div_ceil(8);
    let mut data = Vec::with_capacity(12 + (x_bytes * height) as usize);

    data.extend_from_slice(&[ESC, 0x61, 0x01]);

    // GS v 0 m xL xH yL yH
    data.extend_from_slice(&[GS, 0x76, 0x30, 0x00]);
    data.push(x_bytes as u8);
    data.push((x_bytes >> 8) as u8);
    data.push(height as u8);
    data.push((height >> 8) as u8);

    for y in 0..height {
        for x_byte in 0..x_bytes {
            let mut byte = 0u8;
            for bit in 0..8 {
                let x = x_byte * 8 + bit;
                if x < width && dark(x, y) {
                    byte |= 1 << (7 - bit);
                }
            }
            data.push(byte);
        }
    }

    data.push(b'\n');
    data
}
