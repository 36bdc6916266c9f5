//! Backend readiness signal.
//!
//! Each backend starts an initialization task and hands out a [`Readiness`]
//! handle. Operations wait on it before touching the engine, so a call made
//! during startup is held, not dropped. Once resolved the state never changes.

use crate::{Error, Result};
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle of a backend's startup probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    /// Initialization still running.
    Pending,
    /// Engine verified usable.
    Ready,
    /// Initialization failed with this cause.
    Failed(String),
}

/// Producer side, owned by the initialization task.
#[derive(Debug)]
pub struct ReadySignal {
    tx: watch::Sender<ReadyState>,
}

impl ReadySignal {
    /// Marks the backend ready.
    pub fn ready(&self) {
        self.tx.send_replace(ReadyState::Ready);
    }

    /// Marks the backend failed.
    pub fn fail(&self, cause: impl Into<String>) {
        self.tx.send_replace(ReadyState::Failed(cause.into()));
    }
}

impl Drop for ReadySignal {
    fn drop(&mut self) {
        // An init task that dies without resolving must not leave waiters hanging.
        self.tx.send_if_modified(|state| {
            if *state == ReadyState::Pending {
                *state = ReadyState::Failed("initialization task ended without a result".into());
                true
            } else {
                false
            }
        });
    }
}

/// Consumer side, cloned into every operation.
#[derive(Debug, Clone)]
pub struct Readiness {
    backend: &'static str,
    timeout: Duration,
    rx: watch::Receiver<ReadyState>,
}

impl Readiness {
    /// Creates a linked signal and handle.
    #[must_use]
    pub fn channel(backend: &'static str, timeout: Duration) -> (ReadySignal, Self) {
        let (tx, rx) = watch::channel(ReadyState::Pending);
        (ReadySignal { tx }, Self { backend, timeout, rx })
    }

    /// Returns the current state without waiting.
    #[must_use]
    pub fn state(&self) -> ReadyState {
        self.rx.borrow().clone()
    }

    /// Waits until the backend is resolved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if initialization failed and
    /// [`Error::Timeout`] if it has not resolved within the configured bound.
    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.rx.clone();
        let waited = tokio::time::timeout(
            self.timeout,
            rx.wait_for(|state| *state != ReadyState::Pending),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: format!("{}_ready", self.backend),
            waited: self.timeout,
        })?;

        let state = match waited {
            Ok(state) => state.clone(),
            Err(_) => ReadyState::Failed("readiness channel closed".to_string()),
        };

        match state {
            ReadyState::Ready => Ok(()),
            ReadyState::Failed(cause) => Err(Error::Unavailable {
                backend: self.backend,
                cause,
            }),
            ReadyState::Pending => Err(Error::Unavailable {
                backend: self.backend,
                cause: "initialization abandoned".to_string(),
            }),
        }
    }
}
