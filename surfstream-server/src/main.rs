//! Surfstream frame server entry point.
//!
//! ```text
//! surfstream-server                    Run with surfstream-server.toml (or defaults)
//! surfstream-server --config <path>    Load a custom config TOML
//! surfstream-server --gen-config       Write default config to stdout
//! surfstream-server --port 50010       Override the listening port
//! ```

use std::fs::OpenOptions;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use surfstream_server::config::SurfstreamConfig;
use surfstream_server::service::SurfstreamService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "surfstream-server", about = "Touch-surface frame server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "surfstream-server.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Interface to listen on (overrides the config file).
    #[arg(long)]
    listen: Option<IpAddr>,

    /// TCP port to listen on (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&SurfstreamConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config.
    let mut config = SurfstreamConfig::load(&cli.config);
    if let Some(addr) = cli.listen {
        config.network.listen_addr = addr;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }

    info!("surfstream-server v{}", env!("CARGO_PKG_VERSION"));
    info!("listen: {}:{}", config.network.listen_addr, config.network.port);
    info!("frame: {} ({})", config.dimensions(), config.frame.mode);
    info!("source: {:?} at {} fps", config.source.kind, config.source.fps);

    let service = SurfstreamService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    let report = service.run().await?;
    if !report.clean {
        warn!(
            connections = report.connections,
            threads = report.threads,
            "shutdown did not drain cleanly"
        );
    }

    Ok(())
}
