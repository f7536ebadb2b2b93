//! Fixture HTTP servers for exercising the GET client.
//!
//! `app()` is an axum router serving well-formed responses in both body
//! framings. The [`raw`] module serves scripted byte sequences straight off a
//! TCP socket, for responses no real framework would produce.

pub mod raw;

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::Bytes;
use tokio::net::TcpListener;

/// The Boost Software License text, served at `/LICENSE_1_0.txt`.
pub const LICENSE: &str = include_str!("../fixtures/LICENSE_1_0.txt");

/// Body served at `/`.
pub const INDEX: &str = "hello from mock-server\n";

/// Pieces streamed by `/chunked`; hyper frames them with chunked encoding.
pub const CHUNKS: [&str; 4] = ["The quick ", "brown fox ", "jumps over ", "the lazy dog"];

/// How long `/slow` waits before answering.
pub const SLOW_DELAY: Duration = Duration::from_secs(5);

pub fn app() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/LICENSE_1_0.txt", get(license))
        .route("/chunked", get(chunked))
        .route("/empty", get(empty))
        .route("/moved", get(moved))
        .route("/slow", get(slow))
        .fallback(not_found)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn index() -> &'static str {
    INDEX
}

async fn license() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], LICENSE)
}

async fn chunked() -> Body {
    let pieces = CHUNKS.map(|piece| Ok::<_, Infallible>(Bytes::from_static(piece.as_bytes())));
    Body::from_stream(futures::stream::iter(pieces))
}

async fn empty() -> StatusCode {
    StatusCode::OK
}

async fn moved() -> impl IntoResponse {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/")], "moved")
}

async fn slow() -> &'static str {
    tokio::time::sleep(SLOW_DELAY).await;
    "finally"
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "no such resource")
}
