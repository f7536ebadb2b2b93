//! Error types for the GET client.
//!
//! # Design
//! Every way an exchange can end badly maps to exactly one variant, and the
//! variant is what travels through the result channel back to the caller.
//! `Timeout` is special: once the deadline has fired it replaces whatever the
//! interrupted operation produced, so callers never see a half-read body
//! dressed up as a network error.

use std::io;

/// Errors delivered by a [`ResponseFuture`](crate::ResponseFuture).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Name resolution or the TCP connect failed.
    #[error("connection failed: {0}")]
    Connection(#[source] io::Error),

    /// Reading or writing the socket failed, or the peer closed early.
    #[error("network error: {0}")]
    Network(#[source] io::Error),

    /// The response could not be parsed as HTTP/1.x.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The server answered with a status other than 200.
    #[error("bad request: server returned status {0}")]
    BadRequest(u16),

    /// The deadline fired before the exchange completed.
    #[error("timeout")]
    Timeout,

    /// The event loop shut down before the exchange produced a result.
    #[error("event loop closed before the request completed")]
    LoopClosed,
}

impl FetchError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        FetchError::MalformedResponse(msg.into())
    }

    /// Returns the status code for `BadRequest`, `None` otherwise.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::BadRequest(code) => Some(*code),
            _ => None,
        }
    }

    /// `true` if the exchange was cut short by its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout)
    }
}

/// Error returned when the peer closes the stream before we have what we need.
pub(crate) fn unexpected_eof(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("connection closed while reading {what}"),
    )
}
