//! Frame producers and the pump that feeds them into a [`FrameStore`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::forwarder::FrameForwarder;
use crate::frame::{Frame, FrameDimensions};
use crate::server::context::{Activity, ServerContext};
use crate::store::{FrameStore, PublishOutcome};

// ── FrameSource ──────────────────────────────────────────────────

/// Anything that yields raw sensor frames.
#[async_trait]
pub trait FrameSource: Send {
    /// The next frame, or `None` when the source is exhausted.
    async fn next_frame(&mut self) -> Result<Option<Frame>, StreamError>;
}

// ── SyntheticSource ──────────────────────────────────────────────

/// Deterministic test pattern: a few soft "touch blobs" drifting over a
/// zero background.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    dimensions: FrameDimensions,
    blobs: u32,
    tick: u64,
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(dimensions: FrameDimensions, blobs: u32) -> Self {
        Self {
            dimensions,
            blobs,
            tick: 0,
            limit: None,
        }
    }

    /// Stop after `frames` frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Render the pattern at time step `tick`.
    pub fn render(dimensions: FrameDimensions, blobs: u32, tick: u64) -> Frame {
        let (w, h) = (dimensions.width as i64, dimensions.height as i64);
        let mut frame = Frame::blank(dimensions);
        if w == 0 || h == 0 {
            return frame;
        }
        let row_len = dimensions.row_len();
        let pixels = frame.as_bytes_mut();
        let t = tick as i64;

        for i in 0..blobs as i64 {
            let cx = (i * 197 + t * (3 + i)).rem_euclid(w);
            let cy = (i * 131 + t * (2 + i)).rem_euclid(h);
            let r = 12 + (i * 5) % 10;

            for y in (cy - r).max(0)..(cy + r + 1).min(h) {
                for x in (cx - r).max(0)..(cx + r + 1).min(w) {
                    let (dx, dy) = (x - cx, y - cy);
                    let d2 = dx * dx + dy * dy;
                    if d2 > r * r {
                        continue;
                    }
                    let level = (255 - d2 * 160 / (r * r)) as u8;
                    let px = &mut pixels[y as usize * row_len + x as usize];
                    *px = (*px).max(level);
                }
            }
        }
        frame
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        if self.limit.is_some_and(|limit| self.tick >= limit) {
            return Ok(None);
        }
        let frame = Self::render(self.dimensions, self.blobs, self.tick);
        self.tick += 1;
        Ok(Some(frame))
    }
}

// ── FramePump ────────────────────────────────────────────────────

/// Configuration for [`FramePump`].
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Target frames per second (at least 1).
    pub target_fps: u32,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self { target_fps: 30 }
    }
}

/// Counters reported when a pump finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Frames handed to the store.
    pub published: u64,
    /// Frames whose compression was skipped because a pass was busy.
    pub skipped: u64,
}

/// Drives a [`FrameSource`] into a [`FrameStore`] at a fixed rate.
///
/// The pump counts as one active worker for its whole lifetime and
/// stops when the source runs dry or the context stops.
pub struct FramePump<S> {
    source: S,
    store: Arc<FrameStore>,
    ctx: Arc<ServerContext>,
    config: PumpConfig,
    forwarder: Option<FrameForwarder>,
}

impl<S: FrameSource> FramePump<S> {
    pub fn new(
        source: S,
        store: Arc<FrameStore>,
        ctx: Arc<ServerContext>,
        config: PumpConfig,
    ) -> Self {
        Self {
            source,
            store,
            ctx,
            config,
            forwarder: None,
        }
    }

    /// Also offer every frame to `forwarder`, which runs on its own task
    /// for as long as the pump does.
    pub fn with_forwarder(mut self, forwarder: FrameForwarder) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// Run until the source is exhausted or the server stops.
    pub async fn run(mut self) -> Result<PumpReport, StreamError> {
        let _worker = self.ctx.enter(Activity::Thread);
        let interval = Duration::from_secs_f64(1.0 / self.config.target_fps.max(1) as f64);
        let mut report = PumpReport::default();
        let forward = self.forwarder.take().map(|f| f.spawn(Arc::clone(&self.ctx)));
        info!(fps = self.config.target_fps, "frame pump started");

        while self.ctx.is_running() {
            let started = Instant::now();

            let next = tokio::select! {
                next = self.source.next_frame() => next,
                _ = self.ctx.wait_for_stop() => break,
            };
            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("frame source exhausted");
                    break;
                }
                Err(e) => {
                    warn!("frame source failed: {e}");
                    return Err(e);
                }
            };

            match self.store.publish(frame)? {
                PublishOutcome::Compressing(_) => {}
                PublishOutcome::Skipped => report.skipped += 1,
            }
            report.published += 1;
            if let Some(task) = &forward {
                task.offer(self.store.raw_snapshot());
            }

            let elapsed = started.elapsed();
            if elapsed < interval {
                tokio::select! {
                    _ = tokio::time::sleep(interval - elapsed) => {}
                    _ = self.ctx.wait_for_stop() => break,
                }
            }
        }

        if let Some(task) = forward {
            let fwd = task.finish().await?;
            info!(
                sent = fwd.frames_sent(),
                dropped = fwd.frames_dropped(),
                "raw forwarding stopped"
            );
        }
        info!(
            published = report.published,
            skipped = report.skipped,
            "frame pump stopped"
        );
        Ok(report)
    }
}
