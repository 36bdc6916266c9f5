//! Periodic background flush.
//!
//! The loop holds only a weak reference to its owner: dropping the owner ends
//! the loop at the next tick, and the task itself never keeps the runtime
//! alive. A failed cycle is logged and counted; the next tick tries again.
//!
//! Data written after the last successful cycle is lost on an ungraceful
//! exit, so the loss window is bounded by the interval.

use crate::Result;
use crate::observability::{record_autosave, status_of};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a running autosave loop. Aborts the loop when dropped.
#[derive(Debug)]
pub struct Autosave {
    handle: JoinHandle<()>,
}

impl Autosave {
    /// Starts a loop calling `save` every `period`, beginning one period from
    /// now.
    pub fn spawn<T, F, Fut>(owner: Weak<T>, period: Duration, save: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                interval.tick().await;
                let Some(owner) = owner.upgrade() else {
                    tracing::debug!("Autosave owner dropped, stopping");
                    break;
                };
                let result = save(owner).await;
                record_autosave(status_of(&result));
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Autosave failed; retrying next interval");
                }
            }
        });

        Self { handle }
    }

    /// Stops the loop. A cycle in progress is cancelled at its next await.
    pub fn stop(&self) {
        self.handle.abort();
    }

    /// Returns true once the loop has exited or been aborted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Autosave {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        calls: AtomicUsize,
    }

    #[tokio::test]
    async fn test_ticks_and_retries_after_failure() {
        let owner = Arc::new(Counter::default());
        let autosave = Autosave::spawn(Arc::downgrade(&owner), Duration::from_millis(10), |c: Arc<Counter>| async move {
            c.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Durability {
                path: "x".into(),
                cause: "disk full".into(),
            })
        });

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(owner.calls.load(Ordering::SeqCst) >= 2);
        assert!(!autosave.is_finished());
    }

    #[tokio::test]
    async fn test_stops_when_owner_dropped() {
        let owner = Arc::new(Counter::default());
        let autosave = Autosave::spawn(Arc::downgrade(&owner), Duration::from_millis(5), |_c: Arc<Counter>| async { Ok(()) });
        drop(owner);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(autosave.is_finished());
    }

    #[tokio::test]
    async fn test_first_save_waits_one_period() {
        let owner = Arc::new(Counter::default());
        let _autosave = Autosave::spawn(Arc::downgrade(&owner), Duration::from_secs(60), |c: Arc<Counter>| async move {
            c.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(owner.calls.load(Ordering::SeqCst), 0);
    }
}
