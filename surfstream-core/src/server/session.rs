//! One client connection and its request loop.
//!
//! ```text
//!  AwaitRequest ──► Dispatch ──► AwaitRequest
//!        │              │
//!        ▼              ▼
//!      Closed ◄─────────┘   (-1, EOF, invalid code, timeout, shutdown)
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

use crate::error::StreamError;
use crate::server::context::ServerContext;
use crate::server::protocol::{Request, RequestCodec};
use crate::store::FrameStore;

// ── SessionConfig ────────────────────────────────────────────────

/// Per-session deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long to wait for the first byte of the next request.
    pub idle_timeout: Duration,
    /// How long a started read (rest of a request) or a response
    /// write may take.
    pub io_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(3),
        }
    }
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent `-1`.
    ClientClosed,
    /// The client closed the stream between requests.
    Disconnected,
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed => write!(f, "client closed"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

enum Incoming {
    Request(Request),
    Eof,
    Shutdown,
}

// ── Session ──────────────────────────────────────────────────────

/// A single accepted connection.
pub struct Session<S> {
    id: u64,
    peer: Option<SocketAddr>,
    framed: Framed<S, RequestCodec>,
    ctx: Arc<ServerContext>,
    store: Arc<FrameStore>,
    config: SessionConfig,
    frames_sent: u64,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        id: u64,
        stream: S,
        ctx: Arc<ServerContext>,
        store: Arc<FrameStore>,
        config: SessionConfig,
    ) -> Self {
        Self {
            id,
            peer: None,
            framed: Framed::new(stream, RequestCodec),
            ctx,
            store,
            config,
            frames_sent: 0,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run the request loop and log how it ended. Errors stop here.
    pub async fn serve(self) {
        let (id, peer) = (self.id, self.peer);
        match self.run().await {
            Ok(end) => info!(session = id, peer = ?peer, "session ended: {end}"),
            Err(StreamError::InvalidRequest(code)) => {
                warn!(session = id, peer = ?peer, code, "invalid request code, closing")
            }
            Err(e) => warn!(session = id, peer = ?peer, "session closed on error: {e}"),
        }
    }

    /// Run the request loop until the client leaves, the server stops,
    /// or a protocol/transport error occurs.
    pub async fn run(mut self) -> Result<SessionEnd, StreamError> {
        debug!(session = self.id, peer = ?self.peer, "session started");
        loop {
            let request = match self.next_request().await? {
                Incoming::Request(request) => request,
                Incoming::Eof => return Ok(SessionEnd::Disconnected),
                Incoming::Shutdown => return Ok(SessionEnd::Shutdown),
            };
            trace!(session = self.id, ?request, "request");

            match request {
                Request::Close => return Ok(SessionEnd::ClientClosed),
                Request::Ping | Request::Reserved(_) => {}
                Request::SendFrame => self.send_frame().await?,
            }
        }
    }

    /// Wait for the next complete request.
    ///
    /// Before the first byte arrives the idle deadline applies; once
    /// part of a request is buffered, the rest must follow within the
    /// I/O deadline. The running flag is re-checked every poll tick.
    async fn next_request(&mut self) -> Result<Incoming, StreamError> {
        let waiting_since = Instant::now();
        let mut partial_since: Option<Instant> = None;

        loop {
            if !self.ctx.is_running() {
                return Ok(Incoming::Shutdown);
            }

            tokio::select! {
                next = self.framed.next() => {
                    return match next {
                        Some(Ok(request)) => Ok(Incoming::Request(request)),
                        Some(Err(e)) => Err(e),
                        None => Ok(Incoming::Eof),
                    };
                }
                _ = tokio::time::sleep(self.ctx.poll_interval()) => {}
            }

            if self.framed.read_buffer().is_empty() {
                if waiting_since.elapsed() >= self.config.idle_timeout {
                    return Err(StreamError::Timeout(self.config.idle_timeout));
                }
            } else {
                let since = *partial_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= self.config.io_timeout {
                    return Err(StreamError::Timeout(self.config.io_timeout));
                }
            }
        }
    }

    async fn send_frame(&mut self) -> Result<(), StreamError> {
        let frame = self.store.compressed_or_compress_now().await?;
        let io_timeout = self.config.io_timeout;
        timeout(io_timeout, self.framed.send(frame.payload.clone()))
            .await
            .map_err(|_| StreamError::Timeout(io_timeout))??;

        self.frames_sent += 1;
        debug!(
            session = self.id,
            frame = frame.frame_number,
            bytes = frame.payload.len(),
            sent = self.frames_sent,
            "frame sent"
        );
        Ok(())
    }
}
