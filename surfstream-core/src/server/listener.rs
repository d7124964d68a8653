//! Accept loop and shutdown drain.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::server::context::{Activity, ServerContext, ServerPhase};
use crate::server::executor::{BoundedExecutor, SessionExecutor, TokioExecutor};
use crate::server::session::Session;
use crate::server::{ServerConfig, ShutdownConfig};
use crate::store::FrameStore;

// ── DrainReport ──────────────────────────────────────────────────

/// Outcome of the shutdown drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Every session and worker finished within the drain window.
    pub clean: bool,
    /// Sessions still counted when the drain ended.
    pub connections: usize,
    /// Workers still counted when the drain ended.
    pub threads: usize,
    /// Time spent draining.
    pub waited: Duration,
}

// ── FrameServer ──────────────────────────────────────────────────

/// TCP frame server bound to one address.
pub struct FrameServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: Arc<ServerContext>,
    store: Arc<FrameStore>,
    config: ServerConfig,
    executor: Arc<dyn SessionExecutor>,
}

impl FrameServer {
    /// Bind the listening socket. Failing to bind is returned to the
    /// caller; nothing is retried.
    pub async fn bind(
        config: ServerConfig,
        ctx: Arc<ServerContext>,
        store: Arc<FrameStore>,
    ) -> Result<Self, StreamError> {
        let addr = config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StreamError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let executor: Arc<dyn SessionExecutor> = match config.max_connections {
            Some(limit) => Arc::new(BoundedExecutor::new(limit)),
            None => Arc::new(TokioExecutor),
        };

        Ok(Self {
            listener,
            local_addr,
            ctx,
            store,
            config,
            executor,
        })
    }

    /// Replace the session executor.
    pub fn with_executor(mut self, executor: Arc<dyn SessionExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Accept connections until the context stops, then drain.
    pub async fn run(self) -> Result<DrainReport, StreamError> {
        self.ctx.transition(ServerPhase::begin_listening)?;
        info!(addr = %self.local_addr, "frame server listening");

        while self.ctx.is_running() {
            let accept = tokio::select! {
                result = self.listener.accept() => result,
                _ = self.ctx.wait_for_stop() => break,
            };

            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    accept_backoff(&self.ctx).await;
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!(peer = %peer, "set_nodelay failed: {e}");
            }

            let id = self.ctx.next_session_id();
            let guard = self.ctx.enter(Activity::Connection);
            info!(
                session = id,
                peer = %peer,
                active = self.ctx.active_connections(),
                "client connected"
            );

            let session = Session::new(
                id,
                stream,
                Arc::clone(&self.ctx),
                Arc::clone(&self.store),
                self.config.session,
            )
            .with_peer(peer);
            self.executor.execute(Box::pin(async move {
                let _guard = guard;
                session.serve().await;
            }));
        }

        self.ctx.transition(ServerPhase::begin_drain)?;
        info!(
            connections = self.ctx.active_connections(),
            threads = self.ctx.active_threads(),
            "frame server draining"
        );
        let report = drain(&self.ctx, &self.config.shutdown).await;
        drop(self.listener);
        self.ctx.transition(ServerPhase::finish_stop)?;

        if report.clean {
            info!(waited = ?report.waited, "frame server stopped cleanly");
        } else {
            warn!(
                connections = report.connections,
                threads = report.threads,
                "frame server stopped with activity outstanding"
            );
        }
        Ok(report)
    }
}

/// Pause for one poll interval after a failed accept, so a persistent
/// error such as running out of descriptors does not spin the loop.
async fn accept_backoff(ctx: &ServerContext) {
    tokio::select! {
        _ = tokio::time::sleep(ctx.poll_interval()) => {}
        _ = ctx.wait_for_stop() => {}
    }
}

/// Wait up to `drain_retries × drain_interval` for every counted
/// session and worker to finish.
pub async fn drain(ctx: &ServerContext, shutdown: &ShutdownConfig) -> DrainReport {
    let started = Instant::now();
    let deadline = shutdown.drain_interval * shutdown.drain_retries;

    while !ctx.is_idle() && started.elapsed() < deadline {
        tokio::time::sleep(ctx.poll_interval()).await;
    }

    DrainReport {
        clean: ctx.is_idle(),
        connections: ctx.active_connections(),
        threads: ctx.active_threads(),
        waited: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameCodec;
    use crate::frame::FrameDimensions;
    use crate::server::context::DEFAULT_POLL_INTERVAL;
    use crate::server::executor::{SessionFuture, TokioExecutor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts sessions, then runs them like [`TokioExecutor`].
    #[derive(Default)]
    struct CountingExecutor {
        sessions: AtomicUsize,
    }

    impl SessionExecutor for CountingExecutor {
        fn execute(&self, session: SessionFuture) {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            TokioExecutor.execute(session);
        }
    }

    fn fixture(addr: SocketAddr) -> (ServerConfig, Arc<ServerContext>, Arc<FrameStore>) {
        let ctx = ServerContext::new(DEFAULT_POLL_INTERVAL);
        let codec = FrameCodec::new(FrameDimensions::new(16, 16), Default::default());
        let store = FrameStore::new(codec, Arc::clone(&ctx));
        let config = ServerConfig {
            listen_addr: addr,
            ..ServerConfig::default()
        };
        (config, ctx, store)
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let (config, ctx, store) = fixture(addr);

        let err = FrameServer::bind(config, ctx, store).await.err().unwrap();
        assert!(matches!(err, StreamError::Bind { addr: a, .. } if a == addr));
    }

    #[tokio::test]
    async fn stop_moves_through_phases() {
        let (config, ctx, store) = fixture("127.0.0.1:0".parse().unwrap());
        let server = FrameServer::bind(config, Arc::clone(&ctx), store).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);

        let handle = tokio::spawn(server.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(ctx.phase().is_listening());

        ctx.stop();
        let report = handle.await.unwrap().unwrap();
        assert!(report.clean);
        assert_eq!(ctx.phase(), ServerPhase::Stopped);
    }

    #[tokio::test]
    async fn drain_gives_up_after_retries() {
        let ctx = ServerContext::new(Duration::from_millis(2));
        let _busy = ctx.enter(Activity::Thread);
        let shutdown = ShutdownConfig {
            drain_retries: 3,
            drain_interval: Duration::from_millis(10),
        };
        let report = drain(&ctx, &shutdown).await;
        assert!(!report.clean);
        assert_eq!(report.threads, 1);
        assert!(report.waited >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn drain_returns_early_when_idle() {
        let ctx = ServerContext::new(DEFAULT_POLL_INTERVAL);
        let report = drain(&ctx, &ShutdownConfig::default()).await;
        assert!(report.clean);
        assert!(report.waited < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn custom_executor_receives_sessions() {
        let (config, ctx, store) = fixture("127.0.0.1:0".parse().unwrap());
        let exec = Arc::new(CountingExecutor::default());
        let server = FrameServer::bind(config, Arc::clone(&ctx), store)
            .await
            .unwrap()
            .with_executor(Arc::clone(&exec) as Arc<dyn SessionExecutor>);
        let addr = server.local_addr();
        let handle = tokio::spawn(server.run());

        let _a = tokio::net::TcpStream::connect(addr).await.unwrap();
        let _b = tokio::net::TcpStream::connect(addr).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while exec.sessions.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        ctx.stop();
        assert!(handle.await.unwrap().unwrap().clean);
    }

    #[tokio::test]
    async fn accept_backoff_waits_one_poll_interval() {
        let ctx = ServerContext::new(Duration::from_millis(40));
        let started = Instant::now();
        accept_backoff(&ctx).await;
        assert!(started.elapsed() >= Duration::from_millis(40));

        ctx.stop();
        let started = Instant::now();
        accept_backoff(&ctx).await;
        assert!(started.elapsed() < Duration::from_millis(40));
    }
}
