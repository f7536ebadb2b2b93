//! Entry points for issuing GET requests.
//!
//! # Design
//! A `Request` is plain data: host, resource and timeout. Sending it spawns
//! one task on an event loop and immediately returns the read side of a
//! one-shot channel. The task owns its socket for its whole life and writes
//! exactly one outcome before it ends.

use std::time::Duration;

use crate::channel::{self, ResponseFuture};
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::event_loop::{default_loop, EventLoop};
use crate::exchange;
use crate::types::Response;

/// A GET request waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    host: String,
    resource: String,
    timeout: Duration,
}

impl Request {
    /// A request for `/` on `host` with a 30 second timeout.
    ///
    /// `host` has no scheme and may carry an explicit `:port`.
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_config(host, &FetchConfig::default())
    }

    pub fn with_config(host: impl Into<String>, config: &FetchConfig) -> Self {
        Self {
            host: host.into(),
            resource: config.default_resource.clone(),
            timeout: config.timeout(),
        }
    }

    /// The resource path, sent verbatim on the request line.
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn resource_path(&self) -> &str {
        &self.resource
    }

    /// Send on the process-wide default loop.
    pub fn send(self) -> ResponseFuture {
        self.send_on(default_loop())
    }

    /// Spawn the exchange on `event_loop` and return its handle right away.
    pub fn send_on(self, event_loop: &EventLoop) -> ResponseFuture {
        let (promise, future) = channel::promise();
        let Request {
            host,
            resource,
            timeout,
        } = self;
        event_loop.spawn_task(async move {
            let outcome = exchange::run(&host, &resource, timeout).await;
            match &outcome {
                Ok(response) => tracing::debug!(
                    %host,
                    %resource,
                    bytes = response.body().len(),
                    "fetch complete"
                ),
                Err(error) => tracing::debug!(%host, %resource, %error, "fetch failed"),
            }
            promise.fulfil(outcome);
        });
        future
    }
}

/// GET `/` from `host` on the default loop with the default timeout.
pub fn fetch(host: impl Into<String>) -> ResponseFuture {
    Request::new(host).send()
}

/// GET `/` from every host concurrently on `event_loop`, then wait for all.
///
/// Results come back in the order the hosts were given.
///
/// # Panics
/// Blocks the calling thread, so it panics if called from async code.
pub fn fetch_many<I, S>(hosts: I, event_loop: &EventLoop) -> Vec<Result<Response, FetchError>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let pending: Vec<ResponseFuture> = hosts
        .into_iter()
        .map(|host| Request::new(host).send_on(event_loop))
        .collect();
    pending.into_iter().map(ResponseFuture::wait).collect()
}
