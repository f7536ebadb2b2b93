//! Deadline enforcement for a single exchange.
//!
//! # Design
//! Arming the guard spawns a timer task on the current loop. When the timer
//! expires it first sets the shared `fired` flag and only then signals the
//! abort. Every suspension point of the exchange runs through
//! [`TimeoutGuard::run`], which races the operation against that signal.
//! When the abort wins, `run` returns an error and the exchange drops its
//! socket, which is how the connection gets force-closed.
//!
//! `run` checks the flag *after* the operation returns, never before. A read
//! that completes in the same instant the deadline expires is therefore
//! still reported as `Timeout`: when both happen together, the deadline
//! takes priority over the data.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::FetchError;

struct Shared {
    fired: AtomicBool,
    abort: Notify,
}

pub(crate) struct TimeoutGuard {
    shared: Arc<Shared>,
    timer: Option<JoinHandle<()>>,
}

impl TimeoutGuard {
    /// Start the timer. Must be called from within a tokio runtime.
    ///
    /// A timeout too long to express as an instant (`Duration::MAX`, say)
    /// arms no timer at all.
    pub(crate) fn arm(timeout: Duration) -> Self {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            tracing::debug!(?timeout, "timeout out of range, running without a deadline");
            return Self::disarmed();
        };
        let shared = Arc::new(Shared {
            fired: AtomicBool::new(false),
            abort: Notify::new(),
        });
        let timer_shared = Arc::clone(&shared);
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            tracing::warn!(?timeout, "deadline reached, aborting connection");
            timer_shared.fired.store(true, Ordering::SeqCst);
            // notify_one stores a permit, so an abort that lands between two
            // guarded operations still interrupts the next one.
            timer_shared.abort.notify_one();
        });
        Self {
            shared,
            timer: Some(timer),
        }
    }

    /// A guard with no deadline.
    pub(crate) fn disarmed() -> Self {
        Self {
            shared: Arc::new(Shared {
                fired: AtomicBool::new(false),
                abort: Notify::new(),
            }),
            timer: None,
        }
    }

    pub(crate) fn fired(&self) -> bool {
        self.shared.fired.load(Ordering::SeqCst)
    }

    /// A view of the fired flag that outlives the guard.
    pub(crate) fn deadline(&self) -> Deadline {
        Deadline {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run one suspension point of the exchange under the deadline.
    pub(crate) async fn run<T, F>(&self, op: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        let outcome = tokio::select! {
            biased;
            _ = self.shared.abort.notified() => Err(FetchError::Network(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection aborted by deadline",
            ))),
            result = op => result,
        };
        if self.fired() {
            return Err(FetchError::Timeout);
        }
        outcome
    }

    /// Cancel the timer, then report whether it had already fired.
    pub(crate) fn disarm(&mut self) -> Result<(), FetchError> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if self.fired() {
            return Err(FetchError::Timeout);
        }
        Ok(())
    }
}

/// Observes whether a guard's deadline fired, after the guard has moved on.
pub(crate) struct Deadline {
    shared: Arc<Shared>,
}

impl Deadline {
    pub(crate) fn fired(&self) -> bool {
        self.shared.fired.load(Ordering::SeqCst)
    }

    /// Replace any outcome with `Timeout` once the deadline has fired.
    pub(crate) fn settle<T>(&self, outcome: Result<T, FetchError>) -> Result<T, FetchError> {
        if self.fired() {
            return Err(FetchError::Timeout);
        }
        outcome
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
