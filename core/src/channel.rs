//! The one-shot bridge between a spawned exchange and its caller.
//!
//! # Design
//! `Promise` is the write side and is consumed by [`Promise::fulfil`], so a
//! second write does not type-check. `ResponseFuture` is the read side and
//! can be awaited from async code or waited on from a plain thread. If the
//! loop drops the task before it writes, the read side yields
//! `FetchError::LoopClosed` instead of hanging.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::FetchError;
use crate::types::Response;

type Outcome = Result<Response, FetchError>;

/// Create a connected write/read pair.
pub(crate) fn promise() -> (Promise, ResponseFuture) {
    let (tx, rx) = oneshot::channel();
    (Promise { tx }, ResponseFuture { rx })
}

pub(crate) struct Promise {
    tx: oneshot::Sender<Outcome>,
}

impl Promise {
    pub(crate) fn fulfil(self, outcome: Outcome) {
        if self.tx.send(outcome).is_err() {
            tracing::trace!("response handle dropped before the exchange finished");
        }
    }
}

/// Handle to the eventual outcome of a [`fetch`](crate::fetch).
///
/// Await it from async code, or call [`wait`](ResponseFuture::wait) from a
/// thread that is not driving a runtime.
#[must_use = "the response is only observed through this handle"]
#[derive(Debug)]
pub struct ResponseFuture {
    rx: oneshot::Receiver<Outcome>,
}

impl ResponseFuture {
    /// Block the current thread until the exchange finishes.
    ///
    /// # Panics
    /// Panics if called from within an asynchronous execution context; use
    /// `.await` there instead.
    pub fn wait(self) -> Outcome {
        self.rx.blocking_recv().unwrap_or(Err(FetchError::LoopClosed))
    }
}

impl Future for ResponseFuture {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(FetchError::LoopClosed)))
    }
}
