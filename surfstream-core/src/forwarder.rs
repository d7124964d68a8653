//! Rate-capped raw frame forwarding to a downstream TCP sink.
//!
//! The sink receives bare frame bytes back to back, `width * height`
//! per frame, with no header. Frames offered before `min_interval` has
//! passed since the last attempt are dropped.
//!
//! [`FrameForwarder::spawn`] moves the forwarder onto its own task fed
//! through a `watch` channel, so a slow sink never holds up the
//! producer: frames that arrive while a write is pending replace each
//! other and only the newest is sent next.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::frame::Frame;
use crate::server::context::{Activity, ServerContext};

// ── ForwarderConfig ──────────────────────────────────────────────

/// Configuration for [`FrameForwarder`].
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Address of the downstream sink.
    pub target: SocketAddr,
    /// Minimum spacing between two forwarded frames.
    pub min_interval: Duration,
    /// Deadline for establishing the outbound connection.
    pub connect_timeout: Duration,
    /// Deadline for writing one frame.
    pub write_timeout: Duration,
}

impl ForwarderConfig {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            min_interval: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
        }
    }
}

/// Result of [`FrameForwarder::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Sent,
    /// Too soon after the previous attempt.
    Throttled,
    /// Connecting or writing failed; the connection was dropped.
    Failed,
}

// ── FrameForwarder ───────────────────────────────────────────────

/// Pushes raw frames to one downstream sink over its own connection.
pub struct FrameForwarder {
    config: ForwarderConfig,
    stream: Option<TcpStream>,
    last_attempt: Option<Instant>,
    sent: u64,
    dropped: u64,
}

impl FrameForwarder {
    pub fn new(config: ForwarderConfig) -> Self {
        Self {
            config,
            stream: None,
            last_attempt: None,
            sent: 0,
            dropped: 0,
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.sent
    }

    pub fn frames_dropped(&self) -> u64 {
        self.dropped
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Forward `frame` if it is due. Failures are logged, never returned.
    pub async fn offer(&mut self, frame: &Frame) -> ForwardOutcome {
        let now = Instant::now();
        if let Some(last) = self.last_attempt {
            if now.duration_since(last) < self.config.min_interval {
                self.dropped += 1;
                return ForwardOutcome::Throttled;
            }
        }
        self.last_attempt = Some(now);

        match self.send(frame).await {
            Ok(()) => {
                self.sent += 1;
                ForwardOutcome::Sent
            }
            Err(e) => {
                warn!(sink = %self.config.target, "frame forward failed: {e}");
                self.stream = None;
                self.dropped += 1;
                ForwardOutcome::Failed
            }
        }
    }

    async fn send(&mut self, frame: &Frame) -> Result<(), StreamError> {
        if self.stream.is_none() {
            let connect = TcpStream::connect(self.config.target);
            let stream = timeout(self.config.connect_timeout, connect)
                .await
                .map_err(|_| StreamError::Timeout(self.config.connect_timeout))??;
            stream.set_nodelay(true)?;
            info!(sink = %self.config.target, "forwarder connected");
            self.stream = Some(stream);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(StreamError::ChannelClosed);
        };

        let bytes = frame.as_bytes();
        timeout(self.config.write_timeout, stream.write_all(bytes))
            .await
            .map_err(|_| StreamError::Timeout(self.config.write_timeout))??;
        debug!(bytes = bytes.len(), "frame forwarded");
        Ok(())
    }

    /// Run this forwarder on its own task until the feed is closed or
    /// `ctx` stops. The task counts as an active worker.
    pub fn spawn(self, ctx: Arc<ServerContext>) -> ForwarderTask {
        let (frames, rx) = watch::channel(None);
        let handle = tokio::spawn(self.run(rx, ctx));
        ForwarderTask { frames, handle }
    }

    async fn run(
        mut self,
        mut frames: watch::Receiver<Option<Arc<Frame>>>,
        ctx: Arc<ServerContext>,
    ) -> Self {
        let _worker = ctx.enter(Activity::Thread);
        loop {
            tokio::select! {
                changed = frames.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ctx.wait_for_stop() => break,
            }
            let Some(frame) = frames.borrow_and_update().clone() else {
                continue;
            };
            tokio::select! {
                _ = self.offer(&frame) => {}
                _ = ctx.wait_for_stop() => break,
            }
        }
        debug!(sent = self.sent, dropped = self.dropped, "forwarder stopped");
        self
    }
}

// ── ForwarderTask ────────────────────────────────────────────────

/// Feed of a forwarder running on its own task.
pub struct ForwarderTask {
    frames: watch::Sender<Option<Arc<Frame>>>,
    handle: JoinHandle<FrameForwarder>,
}

impl ForwarderTask {
    /// Hand `frame` to the forwarder without waiting. A frame the task
    /// has not picked up yet is replaced.
    pub fn offer(&self, frame: Arc<Frame>) {
        self.frames.send_replace(Some(frame));
    }

    /// Close the feed and wait for the task to wind down.
    pub async fn finish(self) -> Result<FrameForwarder, StreamError> {
        let Self { frames, handle } = self;
        drop(frames);
        Ok(handle.await?)
    }
}
