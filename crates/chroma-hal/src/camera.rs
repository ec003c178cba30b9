//! [`CameraFrame`] – an RGB24 image as it travels over the link.
//!
//! The executor answers `GET_CAMERA` with a single text line:
//!
//! ```text
//! FRAME rgb24 <width> <height> <base64 pixel data>
//! ```
//!
//! [`CameraFrame::encode_payload`] and [`CameraFrame::decode_payload`] handle
//! everything after the `FRAME ` keyword.

use base64::{Engine as _, engine::general_purpose};
use chroma_types::RobotError;

/// Pixel format tag carried in the frame header. Only RGB24 is produced.
pub const PIXEL_FORMAT: &str = "rgb24";

/// A raw RGB24 image, row-major, 3 bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl CameraFrame {
    /// Wrap existing pixel data.
    ///
    /// # Errors
    ///
    /// [`RobotError::Protocol`] when `data` does not hold exactly
    /// `width * height * 3` bytes.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, RobotError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(RobotError::Protocol(format!(
                "frame {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with one color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.index(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let i = self.index(x, y);
        self.data[i..i + 3].copy_from_slice(&rgb);
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }

    /// `rgb24 <w> <h> <base64>`
    pub fn encode_payload(&self) -> String {
        format!(
            "{PIXEL_FORMAT} {} {} {}",
            self.width,
            self.height,
            general_purpose::STANDARD.encode(&self.data)
        )
    }

    /// Inverse of [`encode_payload`][Self::encode_payload].
    ///
    /// # Errors
    ///
    /// [`RobotError::Protocol`] on an unknown format, bad dimensions, invalid
    /// base64 or a size mismatch.
    pub fn decode_payload(payload: &str) -> Result<Self, RobotError> {
        let mut parts = payload.split_ascii_whitespace();
        let (Some(format), Some(w), Some(h), Some(b64), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(RobotError::Protocol(
                "frame header must be '<format> <width> <height> <data>'".into(),
            ));
        };
        if format != PIXEL_FORMAT {
            return Err(RobotError::Protocol(format!(
                "unsupported pixel format '{format}'"
            )));
        }
        let width = w
            .parse::<u32>()
            .map_err(|e| RobotError::Protocol(format!("bad frame width '{w}': {e}")))?;
        let height = h
            .parse::<u32>()
            .map_err(|e| RobotError::Protocol(format!("bad frame height '{h}': {e}")))?;
        let data = general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| RobotError::Protocol(format!("bad frame data: {e}")))?;
        Self::new(width, height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_access() {
        let mut frame = CameraFrame::filled(4, 3, [10, 20, 30]);
        assert_eq!(frame.data.len(), 36);
        assert_eq!(frame.pixel(3, 2), [10, 20, 30]);
        frame.set_pixel(1, 2, [255, 0, 0]);
        assert_eq!(frame.pixel(1, 2), [255, 0, 0]);
        assert_eq!(frame.pixel(2, 2), [10, 20, 30]);
    }

    #[test]
    fn payload_survives_the_wire() {
        let mut frame = CameraFrame::filled(5, 2, [0, 0, 0]);
        frame.set_pixel(4, 1, [1, 2, 3]);
        let payload = frame.encode_payload();
        assert!(payload.starts_with("rgb24 5 2 "));
        assert!(!payload.contains('\n'));
        assert_eq!(CameraFrame::decode_payload(&payload).unwrap(), frame);
    }

    #[test]
    fn decode_rejects_size_mismatch() {
        let data = general_purpose::STANDARD.encode([0u8; 5]);
        let err = CameraFrame::decode_payload(&format!("rgb24 2 2 {data}")).unwrap_err();
        assert!(matches!(err, RobotError::Protocol(_)));
    }

    #[test]
    fn decode_rejects_unknown_format() {
        assert!(CameraFrame::decode_payload("bgr24 1 1 AAAA").is_err());
        assert!(CameraFrame::decode_payload("rgb24 1 1").is_err());
        assert!(CameraFrame::decode_payload("rgb24 one 1 AAAA").is_err());
    }
}
