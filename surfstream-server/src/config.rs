//! Configuration for the frame server binary.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use surfstream_core::codec::{CompressionMode, FrameCodec};
use surfstream_core::forwarder::ForwarderConfig;
use surfstream_core::frame::FrameDimensions;
use surfstream_core::server::{DEFAULT_PORT, ServerConfig, SessionConfig, ShutdownConfig};
use surfstream_core::source::PumpConfig;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfstreamConfig {
    /// Listening socket.
    pub network: NetworkConfig,
    /// Frame geometry and codec.
    pub frame: FrameConfig,
    /// Per-connection deadlines.
    pub session: SessionSection,
    /// Stop and drain behaviour.
    pub shutdown: ShutdownSection,
    /// Where raw frames come from.
    pub source: SourceConfig,
    /// Optional raw frame forwarding.
    pub forward: ForwardConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface to bind.
    pub listen_addr: IpAddr,
    /// TCP port for frame clients.
    pub port: u16,
    /// Maximum concurrently served clients (0 = unlimited).
    pub max_connections: usize,
}

/// Frame geometry and codec settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub width: u32,
    pub height: u32,
    /// "dense" or "sparse".
    pub mode: CompressionMode,
}

/// Session deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Wait for the next request, in milliseconds.
    pub idle_timeout_ms: u64,
    /// Finish a started read or a write, in milliseconds.
    pub io_timeout_ms: u64,
}

/// Shutdown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSection {
    /// How often the running flag is polled, in milliseconds.
    pub poll_interval_ms: u64,
    /// Number of drain intervals to wait for sessions and workers.
    pub drain_retries: u32,
    /// Length of one drain interval, in milliseconds.
    pub drain_interval_ms: u64,
}

/// Frame source kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Moving test blobs.
    Synthetic,
    /// Raw frames replayed from `path`.
    File,
    /// No producer; clients get the blank frame.
    None,
}

/// Frame source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Target frames per second.
    pub fps: u32,
    /// Raw frame file for `kind = "file"`.
    pub path: PathBuf,
    /// Restart the file when it ends.
    pub looping: bool,
    /// Number of blobs for `kind = "synthetic"`.
    pub blobs: u32,
}

/// Raw frame forwarding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    pub enabled: bool,
    /// Downstream sink address.
    pub target: SocketAddr,
    /// Minimum spacing between forwarded frames, in milliseconds.
    pub min_interval_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            max_connections: 0,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: FrameDimensions::HALF.width,
            height: FrameDimensions::HALF.height,
            mode: CompressionMode::Dense,
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 10_000,
            io_timeout_ms: 3_000,
        }
    }
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            drain_retries: 6,
            drain_interval_ms: 1_500,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Synthetic,
            fps: 30,
            path: PathBuf::new(),
            looping: true,
            blobs: 4,
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT + 1)),
            min_interval_ms: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl SurfstreamConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Frame geometry, each side clamped to `1..=8192`.
    pub fn dimensions(&self) -> FrameDimensions {
        FrameDimensions::new(
            self.frame.width.clamp(1, 8192),
            self.frame.height.clamp(1, 8192),
        )
    }

    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.dimensions(), self.frame.mode)
    }

    /// How often the running flag is polled (at least 1 ms).
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown.poll_interval_ms.clamp(1, 1_000))
    }

    /// Convert network, session and shutdown settings into a
    /// [`ServerConfig`].
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            listen_addr: SocketAddr::new(self.network.listen_addr, self.network.port),
            max_connections: match self.network.max_connections {
                0 => None,
                n => Some(n),
            },
            session: SessionConfig {
                idle_timeout: Duration::from_millis(self.session.idle_timeout_ms.max(1)),
                io_timeout: Duration::from_millis(self.session.io_timeout_ms.max(1)),
            },
            shutdown: ShutdownConfig {
                drain_retries: self.shutdown.drain_retries.min(1_000),
                drain_interval: Duration::from_millis(self.shutdown.drain_interval_ms.max(1)),
            },
        }
    }

    pub fn to_pump_config(&self) -> PumpConfig {
        PumpConfig {
            target_fps: self.source.fps.clamp(1, 240),
        }
    }

    /// Forwarder settings, if forwarding is enabled.
    pub fn to_forwarder_config(&self) -> Option<ForwarderConfig> {
        if !self.forward.enabled {
            return None;
        }
        let mut cfg = ForwarderConfig::new(self.forward.target);
        cfg.min_interval = Duration::from_millis(self.forward.min_interval_ms);
        Some(cfg)
    }
}

// ── Tests ────────────────────────────────────────────────────────
