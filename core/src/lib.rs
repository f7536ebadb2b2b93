//! Asynchronous HTTP/1.1 GET client.
//!
//! # Overview
//! [`fetch`] (or [`Request::send_on`]) spawns one exchange on an
//! [`EventLoop`]: resolve and connect, write a minimal GET request, parse
//! the status line and headers, decode a fixed-length or chunked body. The
//! outcome comes back through a [`ResponseFuture`] that can be awaited or
//! waited on from a plain thread.
//!
//! # Design
//! - Only status 200 is a success. Every other status is
//!   `FetchError::BadRequest(code)` and no body is read.
//! - A timeout covers the whole exchange. When it fires, the connection is
//!   dropped and the result is `FetchError::Timeout`, even if data arrived
//!   at the same instant.
//! - No TLS, redirects, keep-alive or verbs other than GET.
//! - The default loop is created once, on first use, and runs for the rest
//!   of the process on its own thread.

pub mod body;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod http;
pub mod types;

mod exchange;
mod guard;

pub use channel::ResponseFuture;
pub use client::{fetch, fetch_many, Request};
pub use config::FetchConfig;
pub use error::FetchError;
pub use event_loop::{default_loop, EventLoop};
pub use types::{HeaderMap, Response};
