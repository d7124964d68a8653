//! Frame types shared by the codec, the frame store and the server.
//!
//! A [`Frame`] is the raw sensor image as handed over by the capture
//! side; a [`CompressedFrame`] is the immutable codec output that
//! sessions put on the wire.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;

// ── FrameDimensions ──────────────────────────────────────────────

/// Fixed geometry of an 8-bit grayscale sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameDimensions {
    /// Width in pixels (= bytes per row).
    pub width: u32,
    /// Height in rows.
    pub height: u32,
}

impl FrameDimensions {
    /// Half-resolution normalized sensor image.
    pub const HALF: Self = Self::new(960, 540);
    /// Full-resolution normalized sensor image.
    pub const FULL: Self = Self::new(1920, 1080);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes in one row.
    pub const fn row_len(self) -> usize {
        self.width as usize
    }

    /// Bytes in a whole frame.
    pub const fn byte_len(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for FrameDimensions {
    fn default() -> Self {
        Self::HALF
    }
}

impl fmt::Display for FrameDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One raw grayscale frame, one byte per pixel, rows packed tightly.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    dimensions: FrameDimensions,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap `data`, checking it holds exactly one frame of `dimensions`.
    pub fn new(dimensions: FrameDimensions, data: Vec<u8>) -> Result<Self, StreamError> {
        let expected = dimensions.byte_len();
        if data.len() != expected {
            return Err(StreamError::FrameSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dimensions, data })
    }

    /// An all-background frame.
    pub fn blank(dimensions: FrameDimensions) -> Self {
        Self {
            dimensions,
            data: vec![0; dimensions.byte_len()],
        }
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Row `y` of the image.
    ///
    /// # Panics
    ///
    /// Panics if `y` is out of bounds.
    pub fn row(&self, y: u32) -> &[u8] {
        let row_len = self.dimensions.row_len();
        let start = y as usize * row_len;
        &self.data[start..start + row_len]
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("dimensions", &self.dimensions)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ── CompressedFrame ──────────────────────────────────────────────

/// Codec output for one frame, ready to be written to any number of
/// sessions. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedFrame {
    /// Number assigned to the raw frame when it was published.
    pub frame_number: u64,
    /// Geometry the payload decodes to.
    pub dimensions: FrameDimensions,
    /// Self-describing codec stream.
    pub payload: Bytes,
}

impl CompressedFrame {
    /// Compressed size relative to the raw frame (lower is better).
    pub fn ratio(&self) -> f64 {
        let raw = self.dimensions.byte_len();
        if raw == 0 {
            return 0.0;
        }
        self.payload.len() as f64 / raw as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_wrong_length() {
        let dims = FrameDimensions::new(4, 2);
        let err = Frame::new(dims, vec![0; 7]).unwrap_err();
        assert!(matches!(
            err,
            StreamError::FrameSize {
                expected: 8,
                actual: 7
            }
        ));
    }

    #[test]
    fn row_slices_packed_rows() {
        let dims = FrameDimensions::new(3, 2);
        let frame = Frame::new(dims, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(frame.row(1), &[4, 5, 6]);
        assert_eq!(frame.into_bytes(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn half_resolution_len() {
        assert_eq!(FrameDimensions::HALF.byte_len(), 518_400);
        assert_eq!(FrameDimensions::default().to_string(), "960x540");
    }

    #[test]
    fn ratio_of_compressed_frame() {
        let c = CompressedFrame {
            frame_number: 1,
            dimensions: FrameDimensions::new(10, 10),
            payload: Bytes::from_static(&[0; 25]),
        };
        assert!((c.ratio() - 0.25).abs() < 1e-9);
    }
}
