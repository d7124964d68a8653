//! # surfstream-server: Touch-Surface Frame Server
//!
//! Serves compressed sensor frames to TCP clients. Raw frames come from
//! a configured source (synthetic test pattern or a raw frame file),
//! are compressed in the background, and are handed out on request.
//! Frames can also be forwarded raw to a downstream sink.
//!
//! ## Modules
//!
//! - **config**: TOML configuration and conversion to core settings.
//! - **source**: `RawFileSource`, replaying frames from disk.
//! - **service**: orchestration of store, pump, forwarder and server.

pub mod config;
pub mod service;
pub mod source;
