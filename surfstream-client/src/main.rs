//! Surfstream frame client.
//!
//! ```text
//! surfstream-client ping                       Check the server is reachable
//! surfstream-client fetch --count 10 --out f   Fetch frames, save them raw
//! surfstream-client watch --interval 200       Poll frames until Ctrl-C
//! surfstream-client --gen-config               Write default config to stdout
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use surfstream_client::commands;
use surfstream_client::config::ViewerConfig;
use surfstream_core::client::FrameClient;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "surfstream-client", about = "Touch-surface frame client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "surfstream-client.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Server address (overrides the config file).
    #[arg(short, long)]
    server: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect, ping and disconnect.
    Ping,
    /// Fetch frames back to back.
    Fetch {
        /// Number of frames to fetch.
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
        /// Write decoded frames to this file, concatenated raw.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Poll frames periodically until interrupted.
    Watch {
        /// Delay between requests in milliseconds (overrides the config file).
        #[arg(short, long)]
        interval: Option<u64>,
        /// Stop after this many frames.
        #[arg(long)]
        limit: Option<u64>,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(addr) = cli.server {
        config.network.server_address = addr;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr = config.network.server_address;
    let client_config = config.to_client_config();
    let codec = config.codec();

    match cli.command.unwrap_or(Command::Ping) {
        Command::Ping => {
            let took = commands::ping(addr, client_config).await?;
            println!("{addr}: ok in {took:?}");
        }
        Command::Fetch { count, out } => {
            let mut client = FrameClient::connect(addr, client_config).await?;
            let totals = commands::fetch(&mut client, &codec, count, out.as_deref()).await?;
            client.close().await?;
            println!(
                "{} frames, {} bytes compressed ({:.3} of raw) in {:?}",
                totals.frames,
                totals.compressed_bytes,
                totals.ratio(),
                totals.elapsed
            );
        }
        Command::Watch { interval, limit } => {
            let interval = interval
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.watch_interval());
            let running = Arc::new(AtomicBool::new(true));
            {
                let running = Arc::clone(&running);
                tokio::spawn(async move {
                    tokio::signal::ctrl_c().await.ok();
                    info!("Ctrl-C received, stopping");
                    running.store(false, Ordering::SeqCst);
                });
            }

            info!(server = %addr, frame = %codec.dimensions(), ?interval, "watching");
            let mut client = FrameClient::connect(addr, client_config).await?;
            let totals = commands::watch(&mut client, &codec, interval, running, limit).await?;
            client.close().await?;
            println!(
                "{} frames, average ratio {:.3}",
                totals.frames,
                totals.ratio()
            );
        }
    }

    Ok(())
}
