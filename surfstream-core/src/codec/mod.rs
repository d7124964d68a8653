//! Lossless touch-surface frame codec.
//!
//! Pipeline per span: delta + sign fold ([`delta`]), bit-plane
//! rotation ([`rotate`]), run/literal encoding ([`span`]). The frame
//! layer ([`frame`]) wraps spans in self-describing segments and can
//! replace long zero stretches with skip segments.
//!
//! [`FrameCodec`] binds the pipeline to one frame geometry.

pub mod delta;
pub mod frame;
pub mod rotate;
pub mod span;
pub mod tables;

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::frame::{CompressedFrame, Frame, FrameDimensions};

pub use tables::{decode_byte, encode_byte};

// ── CompressionMode ──────────────────────────────────────────────

/// How a frame is split into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    /// One span segment for the whole frame.
    #[default]
    Dense,
    /// Zero stretches become skip segments, the rest independent spans.
    Sparse,
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dense => f.write_str("dense"),
            Self::Sparse => f.write_str("sparse"),
        }
    }
}

impl FromStr for CompressionMode {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dense" => Ok(Self::Dense),
            "sparse" => Ok(Self::Sparse),
            other => Err(StreamError::Other(format!("unknown compression mode: {other}"))),
        }
    }
}

// ── FrameCodec ───────────────────────────────────────────────────

/// Compressor/decompressor for frames of a fixed geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    dimensions: FrameDimensions,
    mode: CompressionMode,
}

impl FrameCodec {
    pub fn new(dimensions: FrameDimensions, mode: CompressionMode) -> Self {
        Self { dimensions, mode }
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    pub fn mode(&self) -> CompressionMode {
        self.mode
    }

    /// Compress `frame` and tag it with `frame_number`.
    pub fn compress(
        &self,
        frame: &Frame,
        frame_number: u64,
    ) -> Result<CompressedFrame, StreamError> {
        if frame.dimensions() != self.dimensions {
            return Err(StreamError::FrameSize {
                expected: self.dimensions.byte_len(),
                actual: frame.as_bytes().len(),
            });
        }

        let row_len = self.dimensions.row_len();
        let payload = match self.mode {
            CompressionMode::Dense => frame::compress_dense(frame.as_bytes(), row_len),
            CompressionMode::Sparse => frame::compress_sparse(frame.as_bytes(), row_len),
        };

        Ok(CompressedFrame {
            frame_number,
            dimensions: self.dimensions,
            payload: Bytes::from(payload),
        })
    }

    /// Decode a payload produced in either mode back into a frame.
    pub fn decompress(&self, payload: &[u8]) -> Result<Frame, StreamError> {
        let dims = self.dimensions;
        let pixels = frame::decompress(payload, dims.byte_len(), dims.row_len())?;
        Frame::new(self.dimensions, pixels)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(FrameDimensions::default(), CompressionMode::default())
    }
}
