//! Request/response frame server.
//!
//! - [`context`]: shared running flag, activity counters, listener phase
//! - [`protocol`]: request codes and the length-prefixed response framing
//! - [`session`]: one connection's request loop
//! - [`executor`]: how sessions are scheduled
//! - [`listener`]: accept loop and shutdown drain

pub mod context;
pub mod executor;
pub mod listener;
pub mod protocol;
pub mod session;

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

pub use context::{Activity, ActivityGuard, ServerContext, ServerPhase};
pub use executor::{BoundedExecutor, SessionExecutor, SessionFuture, TokioExecutor};
pub use listener::{DrainReport, FrameServer};
pub use protocol::{Request, RequestCodec, ResponseCodec};
pub use session::{Session, SessionConfig, SessionEnd};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 50001;

// ── ShutdownConfig ───────────────────────────────────────────────

/// How long the listener waits for activity to wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownConfig {
    /// Number of drain intervals to wait.
    pub drain_retries: u32,
    /// Length of one drain interval.
    pub drain_interval: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_retries: 6,
            drain_interval: Duration::from_millis(1500),
        }
    }
}

// ── ServerConfig ─────────────────────────────────────────────────

/// Configuration for [`FrameServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
    /// Cap on concurrently served sessions (`None` = unbounded).
    pub max_connections: Option<usize>,
    pub session: SessionConfig,
    pub shutdown: ShutdownConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_connections: None,
            session: SessionConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}
