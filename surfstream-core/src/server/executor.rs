//! Where accepted sessions run.
//!
//! The listener hands each session to a [`SessionExecutor`] as a boxed
//! future. [`TokioExecutor`] spawns every session immediately;
//! [`BoundedExecutor`] caps how many run at the same time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

/// A session ready to be driven to completion.
pub type SessionFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs session futures.
pub trait SessionExecutor: Send + Sync {
    fn execute(&self, session: SessionFuture);
}

// ── TokioExecutor ────────────────────────────────────────────────

/// One Tokio task per session, no limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl SessionExecutor for TokioExecutor {
    fn execute(&self, session: SessionFuture) {
        tokio::spawn(session);
    }
}

// ── BoundedExecutor ──────────────────────────────────────────────

/// One Tokio task per session, at most `limit` running at once.
/// Sessions over the limit wait for a slot before their first read.
#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    slots: Arc<Semaphore>,
}

impl BoundedExecutor {
    pub fn new(limit: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

impl SessionExecutor for BoundedExecutor {
    fn execute(&self, session: SessionFuture) {
        let slots = Arc::clone(&self.slots);
        tokio::spawn(async move {
            let Ok(_slot) = slots.acquire_owned().await else {
                debug!("executor closed, dropping session");
                return;
            };
            session.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn tokio_executor_runs_sessions() {
        let done = Arc::new(AtomicUsize::new(0));
        let exec = TokioExecutor;
        for _ in 0..3 {
            let done = Arc::clone(&done);
            exec.execute(Box::pin(async move {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        tokio::time::timeout(Duration::from_secs(1), async {
            while done.load(Ordering::SeqCst) < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn bounded_executor_caps_concurrency() {
        let exec = BoundedExecutor::new(2);
        assert_eq!(exec.available(), 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let done = Arc::clone(&done);
            exec.execute(Box::pin(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while done.load(Ordering::SeqCst) < 6 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);

        // Slots come back once the finished sessions' tasks unwind.
        tokio::time::timeout(Duration::from_secs(1), async {
            while exec.available() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn zero_limit_still_admits_one() {
        assert_eq!(BoundedExecutor::new(0).available(), 1);
    }
}
