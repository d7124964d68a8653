//! # surfstream-core
//!
//! Core library for streaming touch-surface sensor frames over TCP.
//!
//! This crate contains:
//! - **Frames**: `Frame`, `FrameDimensions`, `CompressedFrame`
//! - **Codec**: lossless delta / bit-rotation / span codec behind `FrameCodec`
//! - **Store**: `FrameStore`, latest raw + compressed frame with skip-if-busy compression
//! - **Sources**: `FrameSource` trait, `SyntheticSource`, `FramePump`
//! - **Server**: `FrameServer`, per-connection `Session`, `ServerContext`
//! - **Client**: `FrameClient` for the request/response protocol
//! - **Forwarder**: `FrameForwarder`, rate-capped raw frame push to a sink
//! - **Error**: `StreamError` / `CodecError`, `thiserror`-based

pub mod client;
pub mod codec;
pub mod error;
pub mod forwarder;
pub mod frame;
pub mod parallel;
pub mod server;
pub mod source;
pub mod store;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{ClientConfig, FrameClient};
pub use codec::{CompressionMode, FrameCodec};
pub use error::{CodecError, StreamError};
pub use forwarder::{ForwardOutcome, ForwarderConfig, ForwarderTask, FrameForwarder};
pub use frame::{CompressedFrame, Frame, FrameDimensions};
pub use server::{
    DEFAULT_PORT, DrainReport, FrameServer, Request, ServerConfig, ServerContext, SessionConfig,
    ShutdownConfig,
};
pub use source::{FramePump, FrameSource, PumpConfig, PumpReport, SyntheticSource};
pub use store::{FrameStore, PublishOutcome};
