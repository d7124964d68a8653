//! Configuration for the frame client binary.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use surfstream_core::client::ClientConfig;
use surfstream_core::codec::{CompressionMode, FrameCodec};
use surfstream_core::frame::FrameDimensions;
use surfstream_core::server::DEFAULT_PORT;
use surfstream_core::server::protocol::DEFAULT_MAX_RESPONSE;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Server address and deadlines.
    pub network: NetworkConfig,
    /// Expected frame geometry and codec.
    pub frame: FrameConfig,
    /// `watch` pacing.
    pub watch: WatchConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Frame server address.
    pub server_address: SocketAddr,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-request deadline in milliseconds.
    pub io_timeout_ms: u64,
    /// Largest accepted frame response, in bytes.
    pub max_response_bytes: usize,
}

/// Frame geometry the server is expected to serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub width: u32,
    pub height: u32,
    /// "dense" or "sparse". Decoding accepts either.
    pub mode: CompressionMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Delay between frame requests, in milliseconds.
    pub interval_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            connect_timeout_ms: 3_000,
            io_timeout_ms: 3_000,
            max_response_bytes: DEFAULT_MAX_RESPONSE,
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

impl Default for WatchConfig {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ViewerConfig {
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

    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms.max(1)),
            io_timeout: Duration::from_millis(self.network.io_timeout_ms.max(1)),
            max_response: self.network.max_response_bytes.max(1),
        }
    }

    /// Codec for the configured geometry, each side clamped to `1..=8192`.
    pub fn codec(&self) -> FrameCodec {
        let dims = FrameDimensions::new(
            self.frame.width.clamp(1, 8192),
            self.frame.height.clamp(1, 8192),
        );
        FrameCodec::new(dims, self.frame.mode)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch.interval_ms)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ViewerConfig::default()).unwrap();
        assert!(text.contains("[network]"));
        assert!(text.contains("127.0.0.1:50001"));
        assert!(text.contains("interval_ms = 500"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: ViewerConfig = toml::from_str(
            r#"
            [network]
            server_address = "10.0.0.7:50010"

            [frame]
            width = 1920
            height = 1080
            "#,
        )
        .unwrap();
        assert_eq!(parsed.network.server_address.port(), 50010);
        assert_eq!(parsed.network.io_timeout_ms, 3_000);
        assert_eq!(parsed.codec().dimensions(), FrameDimensions::FULL);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn client_config_clamps_zero_values() {
        let mut cfg = ViewerConfig::default();
        cfg.network.connect_timeout_ms = 0;
        cfg.network.max_response_bytes = 0;
        let client = cfg.to_client_config();
        assert_eq!(client.connect_timeout, Duration::from_millis(1));
        assert_eq!(client.io_timeout, Duration::from_millis(3_000));
        assert_eq!(client.max_response, 1);
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        ViewerConfig::write_default(&path).unwrap();
        let loaded = ViewerConfig::load(&path);
        assert_eq!(loaded.network.server_address.port(), DEFAULT_PORT);
        assert_eq!(loaded.watch.interval_ms, 500);

        std::fs::write(&path, "[[[ broken").unwrap();
        assert_eq!(ViewerConfig::load(&path).frame.width, 960);
    }
}
