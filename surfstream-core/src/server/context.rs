//! Process-wide server state, passed explicitly to the listener,
//! sessions and background workers.
//!
//! Holds the running flag, the activity counters used by the drain
//! logic, the session-id counter and the listener phase.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::StreamError;

/// How often waiters re-check the running flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ── ServerPhase ──────────────────────────────────────────────────

/// Lifecycle of the listening socket.
///
/// ```text
///  Stopped ──► Listening ──► Draining ──► Stopped
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServerPhase {
    /// No socket is being served. Initial / terminal state.
    #[default]
    Stopped,

    /// Accepting connections.
    Listening {
        /// When the listener entered the `Listening` state.
        since: Instant,
    },

    /// No longer accepting; waiting for sessions and workers to finish.
    Draining,
}

impl fmt::Display for ServerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Listening { .. } => write!(f, "Listening"),
            Self::Draining => write!(f, "Draining"),
        }
    }
}

impl ServerPhase {
    pub fn is_listening(&self) -> bool {
        matches!(self, Self::Listening { .. })
    }

    /// Transition to `Listening`.
    ///
    /// Valid from: `Stopped`.
    pub fn begin_listening(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Stopped => {
                *self = Self::Listening {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(StreamError::ProtocolViolation(
                "cannot listen: not in Stopped state",
            )),
        }
    }

    /// Transition to `Draining`.
    ///
    /// Valid from: `Listening`.
    pub fn begin_drain(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Listening { .. } => {
                *self = Self::Draining;
                Ok(())
            }
            _ => Err(StreamError::ProtocolViolation(
                "cannot drain: not in Listening state",
            )),
        }
    }

    /// Transition to `Stopped`.
    ///
    /// Valid from: `Draining`.
    pub fn finish_stop(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Draining => {
                *self = Self::Stopped;
                Ok(())
            }
            _ => Err(StreamError::ProtocolViolation(
                "cannot stop: not in Draining state",
            )),
        }
    }
}

// ── Activity counters ────────────────────────────────────────────

/// What an [`ActivityGuard`] is counted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// An accepted client session.
    Connection,
    /// A background worker (frame pump, compression pass).
    Thread,
}

/// Keeps one unit of activity counted until dropped.
#[must_use = "the activity is uncounted as soon as the guard is dropped"]
pub struct ActivityGuard {
    ctx: Arc<ServerContext>,
    activity: Activity,
}

impl ActivityGuard {
    pub fn activity(&self) -> Activity {
        self.activity
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.ctx.counter(self.activity).fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for ActivityGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityGuard")
            .field("activity", &self.activity)
            .finish()
    }
}

// ── ServerContext ────────────────────────────────────────────────

/// Shared state of one server instance.
///
/// A context starts out running; [`stop`](Self::stop) (or storing
/// `false` through [`stop_handle`](Self::stop_handle)) asks every
/// participant to wind down.
pub struct ServerContext {
    running: Arc<AtomicBool>,
    connections: AtomicUsize,
    threads: AtomicUsize,
    next_session: AtomicU64,
    phase: Mutex<ServerPhase>,
    poll_interval: Duration,
}

impl ServerContext {
    pub fn new(poll_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            running: Arc::new(AtomicBool::new(true)),
            connections: AtomicUsize::new(0),
            threads: AtomicUsize::new(0),
            next_session: AtomicU64::new(1),
            phase: Mutex::new(ServerPhase::Stopped),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        })
    }

    /// A cloneable flag that stops the server when set to `false`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Resolves once the running flag is cleared.
    pub async fn wait_for_stop(&self) {
        while self.is_running() {
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Allocate the next session id. Ids start at 1 and never repeat.
    pub fn next_session_id(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Count one unit of `activity` until the returned guard drops.
    pub fn enter(self: &Arc<Self>, activity: Activity) -> ActivityGuard {
        self.counter(activity).fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            ctx: Arc::clone(self),
            activity,
        }
    }

    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn active_threads(&self) -> usize {
        self.threads.load(Ordering::SeqCst)
    }

    /// `true` when no sessions or workers are counted.
    pub fn is_idle(&self) -> bool {
        self.active_connections() == 0 && self.active_threads() == 0
    }

    pub fn phase(&self) -> ServerPhase {
        self.phase.lock().clone()
    }

    /// Apply a validated phase transition.
    pub fn transition(
        &self,
        step: impl FnOnce(&mut ServerPhase) -> Result<(), StreamError>,
    ) -> Result<(), StreamError> {
        step(&mut self.phase.lock())
    }

    fn counter(&self, activity: Activity) -> &AtomicUsize {
        match activity {
            Activity::Connection => &self.connections,
            Activity::Thread => &self.threads,
        }
    }
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("running", &self.is_running())
            .field("connections", &self.active_connections())
            .field("threads", &self.active_threads())
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_happy_path() {
        let mut phase = ServerPhase::default();
        phase.begin_listening().unwrap();
        assert!(phase.is_listening());
        phase.begin_drain().unwrap();
        assert_eq!(phase, ServerPhase::Draining);
        phase.finish_stop().unwrap();
        assert_eq!(phase, ServerPhase::Stopped);
    }

    #[test]
    fn phase_rejects_invalid_transitions() {
        let mut phase = ServerPhase::Stopped;
        assert!(matches!(
            phase.begin_drain(),
            Err(StreamError::ProtocolViolation(_))
        ));
        assert!(phase.finish_stop().is_err());
        phase.begin_listening().unwrap();
        assert!(phase.begin_listening().is_err());
    }

    #[test]
    fn guards_count_and_uncount() {
        let ctx = ServerContext::new(DEFAULT_POLL_INTERVAL);
        let a = ctx.enter(Activity::Connection);
        let b = ctx.enter(Activity::Connection);
        let t = ctx.enter(Activity::Thread);
        assert_eq!(a.activity(), Activity::Connection);
        assert_eq!(t.activity(), Activity::Thread);
        assert_eq!(ctx.active_connections(), 2);
        assert_eq!(ctx.active_threads(), 1);
        drop(a);
        drop(t);
        assert_eq!(ctx.active_connections(), 1);
        assert!(!ctx.is_idle());
        drop(b);
        assert!(ctx.is_idle());
    }

    #[test]
    fn session_ids_are_unique() {
        let ctx = ServerContext::new(DEFAULT_POLL_INTERVAL);
        let ids: Vec<u64> = (0..5).map(|_| ctx.next_session_id()).collect();
        assert_eq!(ids, [1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn wait_for_stop_resolves_after_stop() {
        let ctx = ServerContext::new(Duration::from_millis(5));
        let handle = ctx.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.store(false, Ordering::SeqCst);
        });
        tokio::time::timeout(Duration::from_secs(2), ctx.wait_for_stop())
            .await
            .unwrap();
        assert!(!ctx.is_running());
    }
}
