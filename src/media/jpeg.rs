//! JPEG header probing
//!
//! Only the frame dimensions are read; the entropy-coded data is never
//! touched.
//!
//! JPEG Marker Structure:
//! ```text
//! +------+------+----------------+----------------------+
//! | 0xFF | code | length (u16 BE)| payload (length - 2) |
//! +------+------+----------------+----------------------+
//! ```
//!
//! Start-of-frame payload (SOF0..SOF15, except DHT/JPG/DAC):
//! ```text
//! precision (1) | height (2) | width (2) | components (1) | ...
//! ```

use bytes::Buf;

/// Start of image
const SOI: u8 = 0xD8;
/// Start of scan: header ends here
const SOS: u8 = 0xDA;
/// End of image
const EOI: u8 = 0xD9;

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

fn is_start_of_frame(code: u8) -> bool {
    matches!(code, 0xC0..=0xCF) && !matches!(code, 0xC4 | 0xC8 | 0xCC)
}

/// Markers that stand alone without a length field
fn is_standalone(code: u8) -> bool {
    matches!(code, 0x01 | 0xD0..=0xD7)
}

/// Read the dimensions from a JPEG stream's start-of-frame header.
///
/// Returns `None` if the data is not a JPEG, is truncated before the SOF
/// segment, or declares a zero dimension.
pub fn probe_dimensions(data: &[u8]) -> Option<Dimensions> {
    let mut buf = data;
    if buf.remaining() < 2 || buf.get_u8() != 0xFF || buf.get_u8() != SOI {
        return None;
    }

    loop {
        // Skip to the next marker, allowing 0xFF fill bytes
        if buf.remaining() < 2 || buf.get_u8() != 0xFF {
            return None;
        }
        let mut code = buf.get_u8();
        while code == 0xFF {
            if !buf.has_remaining() {
                return None;
            }
            code = buf.get_u8();
        }

        if is_standalone(code) {
            continue;
        }
        if code == SOS || code == EOI || buf.remaining() < 2 {
            return None;
        }

        let length = buf.get_u16() as usize;
        if length < 2 || buf.remaining() < length - 2 {
            return None;
        }

        if is_start_of_frame(code) {
            if length < 7 {
                return None;
            }
            let _precision = buf.get_u8();
            let height = buf.get_u16() as u32;
            let width = buf.get_u16() as u32;
            if width == 0 || height == 0 {
                return None;
            }
            return Some(Dimensions { width, height });
        }

        buf.advance(length - 2);
    }
}
