//! Latest-frame store shared by the producer and all sessions.
//!
//! The producer swaps raw frames into a mutex-guarded slot, from a
//! runtime task or from its own capture thread. Compression runs on the
//! blocking pool of the runtime the store was created on, at most one
//! pass at a time; a frame that
//! arrives while a pass is running is stored but not compressed. Each
//! finished pass replaces the published [`CompressedFrame`] through a
//! `watch` channel, so readers only ever see complete buffers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::codec::FrameCodec;
use crate::error::StreamError;
use crate::frame::{CompressedFrame, Frame};
use crate::server::context::{Activity, ActivityGuard, ServerContext};

/// The published compressed frame, if any pass has completed yet.
pub type SharedCompressed = Option<Arc<CompressedFrame>>;

// ── PublishOutcome ───────────────────────────────────────────────

/// What [`FrameStore::publish`] did with the frame.
#[derive(Debug)]
pub enum PublishOutcome {
    /// A background pass is compressing this frame.
    Compressing(JoinHandle<Result<Arc<CompressedFrame>, StreamError>>),
    /// Another pass was still running; only the raw slot was updated.
    Skipped,
}

impl PublishOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

// ── CompressionPermit ────────────────────────────────────────────

/// Exclusive right to run a compression pass. Releases the store's
/// in-flight flag on drop, including while unwinding.
pub struct CompressionPermit {
    store: Arc<FrameStore>,
    _worker: ActivityGuard,
}

impl Drop for CompressionPermit {
    fn drop(&mut self) {
        self.store.in_flight.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for CompressionPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionPermit").finish_non_exhaustive()
    }
}

// ── FrameStore ───────────────────────────────────────────────────

struct RawSlot {
    number: u64,
    frame: Arc<Frame>,
}

/// Raw and compressed frame state for one server.
pub struct FrameStore {
    codec: FrameCodec,
    ctx: Arc<ServerContext>,
    runtime: Option<Handle>,
    raw: Mutex<RawSlot>,
    compressed: watch::Sender<SharedCompressed>,
    in_flight: AtomicBool,
    frame_counter: AtomicU64,
}

impl FrameStore {
    /// Create a store whose raw slot holds a blank frame (number 0) and
    /// which has no compressed frame yet.
    ///
    /// Compression passes run on the runtime current at this call, if
    /// there is one. Use [`with_runtime`](Self::with_runtime) to build a
    /// store outside of a runtime.
    pub fn new(codec: FrameCodec, ctx: Arc<ServerContext>) -> Arc<Self> {
        Self::build(codec, ctx, Handle::try_current().ok())
    }

    /// Create a store whose compression passes run on `runtime`.
    pub fn with_runtime(codec: FrameCodec, ctx: Arc<ServerContext>, runtime: Handle) -> Arc<Self> {
        Self::build(codec, ctx, Some(runtime))
    }

    fn build(codec: FrameCodec, ctx: Arc<ServerContext>, runtime: Option<Handle>) -> Arc<Self> {
        let (compressed, _) = watch::channel(None);
        Arc::new(Self {
            runtime,
            raw: Mutex::new(RawSlot {
                number: 0,
                frame: Arc::new(Frame::blank(codec.dimensions())),
            }),
            codec,
            ctx,
            compressed,
            in_flight: AtomicBool::new(false),
            frame_counter: AtomicU64::new(0),
        })
    }

    pub fn codec(&self) -> FrameCodec {
        self.codec
    }

    /// Number of the frame currently in the raw slot.
    pub fn latest_frame_number(&self) -> u64 {
        self.raw.lock().number
    }

    /// Store `frame` as the latest raw frame and compress it in the
    /// background unless a pass is already running.
    ///
    /// May be called from any thread. Fails with [`StreamError::Task`]
    /// if the store has no runtime and the caller is not on one either;
    /// the raw slot is still updated in that case.
    pub fn publish(self: &Arc<Self>, frame: Frame) -> Result<PublishOutcome, StreamError> {
        let expected = self.codec.dimensions();
        if frame.dimensions() != expected {
            return Err(StreamError::FrameSize {
                expected: expected.byte_len(),
                actual: frame.as_bytes().len(),
            });
        }

        let number = self.frame_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = Arc::new(frame);
        {
            let mut slot = self.raw.lock();
            slot.number = number;
            slot.frame = Arc::clone(&frame);
        }

        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            return Err(StreamError::Task("no tokio runtime for compression".into()));
        };
        let Some(permit) = self.try_begin_compression() else {
            debug!(frame = number, "compression busy, skipping frame");
            return Ok(PublishOutcome::Skipped);
        };

        let store = Arc::clone(self);
        let handle = runtime.spawn_blocking(move || {
            let _permit = permit;
            store.compress_and_publish(&frame, number)
        });
        Ok(PublishOutcome::Compressing(handle))
    }

    /// Take the compression permit if no pass is running.
    ///
    /// While the permit is held, [`publish`](Self::publish) skips
    /// compression. The permit also counts as an active worker.
    pub fn try_begin_compression(self: &Arc<Self>) -> Option<CompressionPermit> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(CompressionPermit {
            store: Arc::clone(self),
            _worker: self.ctx.enter(Activity::Thread),
        })
    }

    pub fn compression_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The most recently completed compressed frame.
    pub fn latest_compressed(&self) -> SharedCompressed {
        self.compressed.borrow().clone()
    }

    /// The latest raw frame.
    pub fn raw_snapshot(&self) -> Arc<Frame> {
        Arc::clone(&self.raw.lock().frame)
    }

    /// Compress the current raw frame on the calling thread without
    /// publishing the result.
    pub fn compress_now(&self) -> Result<Arc<CompressedFrame>, StreamError> {
        let (number, frame) = {
            let slot = self.raw.lock();
            (slot.number, Arc::clone(&slot.frame))
        };
        self.codec.compress(&frame, number).map(Arc::new)
    }

    /// The published compressed frame, or, before the first pass has
    /// finished, a fresh compression of the raw slot done on the
    /// blocking pool.
    pub async fn compressed_or_compress_now(
        self: &Arc<Self>,
    ) -> Result<Arc<CompressedFrame>, StreamError> {
        if let Some(latest) = self.latest_compressed() {
            return Ok(latest);
        }
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || store.compress_now()).await?
    }

    /// Receiver that observes every published compressed frame.
    pub fn subscribe(&self) -> watch::Receiver<SharedCompressed> {
        self.compressed.subscribe()
    }

    fn compress_and_publish(
        &self,
        frame: &Frame,
        number: u64,
    ) -> Result<Arc<CompressedFrame>, StreamError> {
        let compressed = Arc::new(self.codec.compress(frame, number)?);
        trace!(
            frame = number,
            bytes = compressed.payload.len(),
            ratio = compressed.ratio(),
            "frame compressed"
        );
        self.compressed.send_replace(Some(Arc::clone(&compressed)));
        Ok(compressed)
    }
}

impl fmt::Debug for FrameStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameStore")
            .field("codec", &self.codec)
            .field("frame", &self.latest_frame_number())
            .field("in_flight", &self.compression_in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CompressionMode;
    use crate::frame::FrameDimensions;
    use crate::server::context::DEFAULT_POLL_INTERVAL;

    const DIMS: FrameDimensions = FrameDimensions::new(64, 32);

    fn store() -> (Arc<ServerContext>, Arc<FrameStore>) {
        let ctx = ServerContext::new(DEFAULT_POLL_INTERVAL);
        let codec = FrameCodec::new(DIMS, CompressionMode::Dense);
        let store = FrameStore::new(codec, Arc::clone(&ctx));
        (ctx, store)
    }

    fn filled(value: u8) -> Frame {
        Frame::new(DIMS, vec![value; DIMS.byte_len()]).unwrap()
    }

    #[tokio::test]
    async fn publish_compresses_and_publishes() {
        let (ctx, store) = store();
        assert!(store.latest_compressed().is_none());

        let outcome = store.publish(filled(9)).unwrap();
        let PublishOutcome::Compressing(handle) = outcome else {
            panic!("expected a compression pass");
        };
        let compressed = handle.await.unwrap().unwrap();
        assert_eq!(compressed.frame_number, 1);

        let latest = store.latest_compressed().unwrap();
        assert!(Arc::ptr_eq(&latest, &compressed));
        assert!(!store.compression_in_flight());
        assert_eq!(ctx.active_threads(), 0);

        let back = store.codec().decompress(&latest.payload).unwrap();
        assert_eq!(back, filled(9));
    }

    #[tokio::test]
    async fn busy_store_skips_compression() {
        let (ctx, store) = store();
        let first = store.publish(filled(1)).unwrap();
        let PublishOutcome::Compressing(handle) = first else {
            panic!("expected a compression pass");
        };
        handle.await.unwrap().unwrap();

        let permit = store.try_begin_compression().unwrap();
        assert_eq!(ctx.active_threads(), 1);
        assert!(store.try_begin_compression().is_none());

        let outcome = store.publish(filled(2)).unwrap();
        assert!(outcome.is_skipped());
        assert_eq!(store.latest_frame_number(), 2);
        assert_eq!(store.raw_snapshot().as_bytes()[0], 2);
        assert_eq!(store.latest_compressed().unwrap().frame_number, 1);

        drop(permit);
        assert!(!store.compression_in_flight());
        assert_eq!(ctx.active_threads(), 0);
    }

    #[tokio::test]
    async fn first_request_compresses_on_demand() {
        let (_ctx, store) = store();
        let c = store.compressed_or_compress_now().await.unwrap();
        assert_eq!(c.frame_number, 0);
        // On-demand results are not published.
        assert!(store.latest_compressed().is_none());
        let back = store.codec().decompress(&c.payload).unwrap();
        assert_eq!(back, Frame::blank(DIMS));
    }

    #[tokio::test]
    async fn subscribers_see_new_frames() {
        let (_ctx, store) = store();
        let mut rx = store.subscribe();
        if let PublishOutcome::Compressing(handle) = store.publish(filled(3)).unwrap() {
            handle.await.unwrap().unwrap();
        }
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().frame_number, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn publish_from_capture_thread() {
        let (ctx, store) = store();
        let producer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.publish(filled(7)))
        };
        let outcome = producer.join().unwrap().unwrap();
        let PublishOutcome::Compressing(handle) = outcome else {
            panic!("expected a compression pass");
        };
        let compressed = handle.await.unwrap().unwrap();
        assert_eq!(compressed.frame_number, 1);
        assert_eq!(store.latest_compressed().unwrap().frame_number, 1);
        assert_eq!(ctx.active_threads(), 0);
    }

    #[test]
    fn explicit_runtime_serves_foreign_threads() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let ctx = ServerContext::new(DEFAULT_POLL_INTERVAL);
        let codec = FrameCodec::new(DIMS, CompressionMode::Sparse);
        let store = FrameStore::with_runtime(codec, ctx, runtime.handle().clone());

        let producer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.publish(filled(5)))
        };
        let PublishOutcome::Compressing(handle) = producer.join().unwrap().unwrap() else {
            panic!("expected a compression pass");
        };
        let compressed = runtime.block_on(handle).unwrap().unwrap();
        let back = store.codec().decompress(&compressed.payload).unwrap();
        assert_eq!(back, filled(5));
    }

    #[test]
    fn publish_without_runtime_is_an_error() {
        let (ctx, store) = store();
        let err = store.publish(filled(4)).unwrap_err();
        assert!(matches!(err, StreamError::Task(_)));
        assert_eq!(store.latest_frame_number(), 1);
        assert!(!store.compression_in_flight());
        assert_eq!(ctx.active_threads(), 0);
    }

    #[test]
    fn wrong_size_frame_rejected() {
        let (_ctx, store) = store();
        let err = store.publish(Frame::blank(FrameDimensions::new(8, 8))).unwrap_err();
        assert!(matches!(err, StreamError::FrameSize { .. }));
        assert_eq!(store.latest_frame_number(), 0);
    }
}
