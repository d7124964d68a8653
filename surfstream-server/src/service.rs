//! Frame server service core logic.
//!
//! Wires the configured frame source, the frame store, the optional
//! raw forwarder and the TCP frame server together, and runs them until
//! stopped.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use surfstream_core::error::StreamError;
use surfstream_core::forwarder::FrameForwarder;
use surfstream_core::server::{DrainReport, FrameServer, ServerContext};
use surfstream_core::source::{FramePump, FrameSource, PumpReport, SyntheticSource};
use surfstream_core::store::FrameStore;

use crate::config::{SourceKind, SurfstreamConfig};
use crate::source::RawFileSource;

// ── SurfstreamService ────────────────────────────────────────────

/// The top-level frame server service.
pub struct SurfstreamService {
    config: SurfstreamConfig,
    ctx: Arc<ServerContext>,
}

impl SurfstreamService {
    pub fn new(config: SurfstreamConfig) -> Self {
        let ctx = ServerContext::new(config.poll_interval());
        Self { config, ctx }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task or a signal handler.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.ctx.stop_handle()
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Run the service until stopped.
    ///
    /// 1. Binds the frame server (a bind failure is returned).
    /// 2. Starts the frame pump for the configured source.
    /// 3. Serves clients until the running flag is cleared.
    /// 4. Drains sessions and workers and reports how that went.
    pub async fn run(&self) -> Result<DrainReport, StreamError> {
        let codec = self.config.codec();
        let store = FrameStore::new(codec, Arc::clone(&self.ctx));

        let server = FrameServer::bind(
            self.config.to_server_config(),
            Arc::clone(&self.ctx),
            Arc::clone(&store),
        )
        .await?;
        info!(
            addr = %server.local_addr(),
            frame = %codec.dimensions(),
            mode = %codec.mode(),
            "frame server bound"
        );

        let pump = match self.start_pump(&store).await {
            Ok(pump) => pump,
            Err(e) => {
                self.ctx.stop();
                return Err(e);
            }
        };

        let report = server.run().await;

        if let Some(pump) = pump {
            match pump.await {
                Ok(Ok(r)) => info!(published = r.published, skipped = r.skipped, "pump finished"),
                Ok(Err(e)) => warn!("pump ended with error: {e}"),
                Err(e) => error!("pump task failed: {e}"),
            }
        }

        self.ctx.stop();
        report
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.ctx.stop();
    }

    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn start_pump(
        &self,
        store: &Arc<FrameStore>,
    ) -> Result<Option<JoinHandle<Result<PumpReport, StreamError>>>, StreamError> {
        let dims = self.config.dimensions();
        let source = &self.config.source;

        let handle = match source.kind {
            SourceKind::None => {
                info!("no frame source configured; serving the blank frame");
                return Ok(None);
            }
            SourceKind::Synthetic => {
                self.spawn_pump(SyntheticSource::new(dims, source.blobs), store)
            }
            SourceKind::File => {
                let file = RawFileSource::open(&source.path, dims, source.looping).await?;
                self.spawn_pump(file, store)
            }
        };
        Ok(Some(handle))
    }

    fn spawn_pump<S>(
        &self,
        source: S,
        store: &Arc<FrameStore>,
    ) -> JoinHandle<Result<PumpReport, StreamError>>
    where
        S: FrameSource + 'static,
    {
        let mut pump = FramePump::new(
            source,
            Arc::clone(store),
            Arc::clone(&self.ctx),
            self.config.to_pump_config(),
        );
        if let Some(cfg) = self.config.to_forwarder_config() {
            info!(sink = %cfg.target, "raw frame forwarding enabled");
            pump = pump.with_forwarder(FrameForwarder::new(cfg));
        }
        tokio::spawn(pump.run())
    }
}

impl Drop for SurfstreamService {
    fn drop(&mut self) {
        self.ctx.stop();
    }
}

// ── Tests ────────────────────────────────────────────────────────
