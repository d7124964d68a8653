//! Client commands: ping, fetch and watch.
//!
//! Each command works on an already connected [`FrameClient`] (except
//! [`ping`], which owns its short-lived connection) so the binary and the
//! tests drive exactly the same code.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use surfstream_core::client::{ClientConfig, FrameClient};
use surfstream_core::codec::FrameCodec;
use surfstream_core::error::StreamError;
use surfstream_core::frame::Frame;

// ── Statistics ───────────────────────────────────────────────────

/// What one decoded frame looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSummary {
    /// Compressed payload size.
    pub compressed_bytes: usize,
    /// Cells with a non-zero reading.
    pub active_cells: usize,
    /// Highest reading in the frame.
    pub peak: u8,
}

impl FrameSummary {
    fn new(compressed_bytes: usize, frame: &Frame) -> Self {
        let bytes = frame.as_bytes();
        Self {
            compressed_bytes,
            active_cells: bytes.iter().filter(|&&b| b != 0).count(),
            peak: bytes.iter().copied().max().unwrap_or(0),
        }
    }
}

/// Totals over a `fetch` or `watch` run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FetchSummary {
    pub frames: u64,
    pub compressed_bytes: u64,
    pub raw_bytes: u64,
    pub elapsed: Duration,
}

impl FetchSummary {
    fn record(&mut self, frame: &FrameSummary, raw_len: usize) {
        self.frames += 1;
        self.compressed_bytes += frame.compressed_bytes as u64;
        self.raw_bytes += raw_len as u64;
    }

    /// Compressed bytes per raw byte over the whole run.
    pub fn ratio(&self) -> f64 {
        if self.raw_bytes == 0 {
            return 0.0;
        }
        self.compressed_bytes as f64 / self.raw_bytes as f64
    }
}

// ── Commands ─────────────────────────────────────────────────────

/// Connect, send a ping and close again. Returns the time taken.
///
/// Pings get no reply; success means the server accepted the connection
/// and did not drop it on the ping.
pub async fn ping(addr: SocketAddr, config: ClientConfig) -> Result<Duration, StreamError> {
    let start = Instant::now();
    let mut client = FrameClient::connect(addr, config).await?;
    client.ping().await?;
    client.close().await?;
    Ok(start.elapsed())
}

/// Fetch one frame and decode it.
pub async fn fetch_one(
    client: &mut FrameClient,
    codec: &FrameCodec,
) -> Result<(Frame, FrameSummary), StreamError> {
    let payload = client.request_frame().await?;
    let frame = codec.decompress(&payload)?;
    let summary = FrameSummary::new(payload.len(), &frame);
    Ok((frame, summary))
}

/// Fetch `count` frames back to back.
///
/// Every frame is decoded, which verifies it against the expected
/// geometry. With `out`, the decoded frames are written to that file as
/// concatenated raw frames, the format the server's file source replays.
pub async fn fetch(
    client: &mut FrameClient,
    codec: &FrameCodec,
    count: u32,
    out: Option<&Path>,
) -> Result<FetchSummary, StreamError> {
    let mut sink = match out {
        Some(path) => Some(File::create(path).await?),
        None => None,
    };

    let start = Instant::now();
    let mut totals = FetchSummary::default();
    for n in 0..count {
        let (frame, summary) = fetch_one(client, codec).await?;
        debug!(
            n,
            bytes = summary.compressed_bytes,
            active = summary.active_cells,
            peak = summary.peak,
            "frame fetched"
        );
        if let Some(file) = sink.as_mut() {
            file.write_all(frame.as_bytes()).await?;
        }
        totals.record(&summary, frame.as_bytes().len());
    }
    if let Some(mut file) = sink {
        file.flush().await?;
    }
    totals.elapsed = start.elapsed();
    Ok(totals)
}

/// Poll the server every `interval` until `running` is cleared or
/// `limit` frames have been received.
pub async fn watch(
    client: &mut FrameClient,
    codec: &FrameCodec,
    interval: Duration,
    running: Arc<AtomicBool>,
    limit: Option<u64>,
) -> Result<FetchSummary, StreamError> {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let start = Instant::now();
    let mut totals = FetchSummary::default();
    while running.load(Ordering::SeqCst) {
        if limit.is_some_and(|max| totals.frames >= max) {
            break;
        }
        ticker.tick().await;

        let requested = Instant::now();
        let (frame, summary) = fetch_one(client, codec).await?;
        info!(
            bytes = summary.compressed_bytes,
            active = summary.active_cells,
            peak = summary.peak,
            latency_ms = requested.elapsed().as_millis() as u64,
            "frame"
        );
        totals.record(&summary, frame.as_bytes().len());
    }
    totals.elapsed = start.elapsed();
    Ok(totals)
}

// ── Tests ────────────────────────────────────────────────────────
