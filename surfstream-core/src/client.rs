//! Async client for the frame server.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::codec::FrameCodec;
use crate::error::StreamError;
use crate::frame::Frame;
use crate::server::protocol::{DEFAULT_MAX_RESPONSE, Request, ResponseCodec};

// ── ClientConfig ─────────────────────────────────────────────────

/// Deadlines and limits for a [`FrameClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    /// Deadline for sending a request or receiving a full response.
    pub io_timeout: Duration,
    /// Largest frame response accepted.
    pub max_response: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            io_timeout: Duration::from_secs(3),
            max_response: DEFAULT_MAX_RESPONSE,
        }
    }
}

// ── FrameClient ──────────────────────────────────────────────────

/// One connection to a frame server.
pub struct FrameClient {
    framed: Framed<TcpStream, ResponseCodec>,
    peer: SocketAddr,
    config: ClientConfig,
}

impl FrameClient {
    pub async fn connect(addr: SocketAddr, config: ClientConfig) -> Result<Self, StreamError> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| StreamError::Timeout(config.connect_timeout))??;
        stream.set_nodelay(true)?;
        debug!(peer = %addr, "connected to frame server");

        Ok(Self {
            framed: Framed::new(stream, ResponseCodec::new(config.max_response)),
            peer: addr,
            config,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Liveness ping. The server does not answer.
    pub async fn ping(&mut self) -> Result<(), StreamError> {
        self.send(Request::Ping).await
    }

    /// Fetch the server's current compressed frame.
    pub async fn request_frame(&mut self) -> Result<Bytes, StreamError> {
        self.send(Request::SendFrame).await?;
        let io_timeout = self.config.io_timeout;
        match timeout(io_timeout, self.framed.next()).await {
            Err(_) => Err(StreamError::Timeout(io_timeout)),
            Ok(Some(result)) => result,
            Ok(None) => Err(StreamError::Connection(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ))),
        }
    }

    /// Fetch and decode the current frame.
    pub async fn fetch_frame(&mut self, codec: &FrameCodec) -> Result<Frame, StreamError> {
        let payload = self.request_frame().await?;
        codec.decompress(&payload)
    }

    /// Send one of the reserved request codes.
    pub async fn request_reserved(&mut self, code: i32) -> Result<(), StreamError> {
        match Request::from_code(code)? {
            request @ Request::Reserved(_) => self.send(request).await,
            _ => Err(StreamError::ProtocolViolation("not a reserved request code")),
        }
    }

    /// Send an arbitrary raw code, valid or not.
    pub async fn send_raw_code(&mut self, code: i32) -> Result<(), StreamError> {
        let io_timeout = self.config.io_timeout;
        let stream = self.framed.get_mut();
        timeout(io_timeout, tokio::io::AsyncWriteExt::write_all(stream, &code.to_le_bytes()))
            .await
            .map_err(|_| StreamError::Timeout(io_timeout))??;
        Ok(())
    }

    /// Tell the server we are done and close the connection.
    pub async fn close(mut self) -> Result<(), StreamError> {
        self.send(Request::Close).await?;
        let io_timeout = self.config.io_timeout;
        timeout(io_timeout, SinkExt::<Request>::close(&mut self.framed))
            .await
            .map_err(|_| StreamError::Timeout(io_timeout))?
    }

    async fn send(&mut self, request: Request) -> Result<(), StreamError> {
        let io_timeout = self.config.io_timeout;
        timeout(io_timeout, self.framed.send(request))
            .await
            .map_err(|_| StreamError::Timeout(io_timeout))?
    }
}
