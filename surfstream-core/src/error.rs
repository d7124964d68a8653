//! Domain-specific error types for surfstream.
//!
//! Every fallible operation returns `Result<T, StreamError>`. Codec
//! faults carry their own [`CodecError`] so callers can tell a corrupt
//! payload apart from a dropped socket.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// The canonical error type for the frame server and client.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The listener could not bind its socket.
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A request code outside the accepted `[-1, 4)` range.
    #[error("invalid request code: {0}")]
    InvalidRequest(i32),

    /// The peer closed the stream in the middle of a request code.
    #[error("truncated request: received {received} of 4 bytes")]
    TruncatedRequest { received: usize },

    /// A frame response announced more bytes than the client accepts.
    #[error("response too large: {size} bytes (max {max})")]
    ResponseTooLarge { size: usize, max: usize },

    /// A state transition or message violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Frame Errors ─────────────────────────────────────────────
    /// A raw frame buffer did not match its declared dimensions.
    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    /// Decompression failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    // ── Runtime Errors ───────────────────────────────────────────
    /// A watch or mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// A blocking worker panicked or was cancelled.
    #[error("task error: {0}")]
    Task(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── CodecError ───────────────────────────────────────────────────

/// Faults raised while decoding a compressed frame.
///
/// Any of these means the payload is corrupt (or the codec has a bug);
/// the decoder never returns a frame of the wrong length instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The input ended before the decoder was done with it.
    #[error("compressed data truncated at offset {offset}")]
    Truncated { offset: usize },

    /// A header would write past the end of the output buffer.
    #[error("span at input offset {offset} overruns output limit {limit}")]
    Overrun { offset: usize, limit: usize },

    /// The stream decoded to a different number of pixels than expected.
    #[error("decompressed length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for StreamError {
    fn from(s: String) -> Self {
        StreamError::Other(s)
    }
}

impl From<&str> for StreamError {
    fn from(s: &str) -> Self {
        StreamError::Other(s.to_string())
    }
}

impl From<tokio::task::JoinError> for StreamError {
    fn from(e: tokio::task::JoinError) -> Self {
        StreamError::Task(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = StreamError::InvalidRequest(4);
        assert!(e.to_string().contains('4'));

        let e = StreamError::FrameSize {
            expected: 518_400,
            actual: 10,
        };
        assert!(e.to_string().contains("518400"));
        assert!(e.to_string().contains("10"));
    }

    #[test]
    fn codec_error_converts() {
        let e: StreamError = CodecError::LengthMismatch {
            expected: 8,
            actual: 7,
        }
        .into();
        assert!(matches!(e, StreamError::Codec(CodecError::LengthMismatch { .. })));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: StreamError = io_err.into();
        assert!(matches!(e, StreamError::Connection(_)));
    }
}
