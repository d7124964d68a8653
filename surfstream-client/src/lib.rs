//! # surfstream-client: Frame Client
//!
//! Connects to a surfstream frame server, requests compressed frames,
//! decodes and verifies them, and reports what it received.
//!
//! ## Modules
//!
//! - **config**: TOML configuration (server address, frame geometry).
//! - **commands**: `ping`, `fetch` and `watch`.

pub mod commands;
pub mod config;
