use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, CHUNKS, INDEX, LICENSE};
use tower::ServiceExt;

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

#[tokio::test]
async fn index_is_plain_text() {
    let resp = app().oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, INDEX.as_bytes());
}

#[tokio::test]
async fn license_has_known_length() {
    let resp = app().oneshot(get("/LICENSE_1_0.txt")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain");
    let body = body_bytes(resp).await;
    assert_eq!(body.len(), 1338);
    assert_eq!(body, LICENSE.as_bytes());
}

#[tokio::test]
async fn chunked_streams_every_piece() {
    let resp = app().oneshot(get("/chunked")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    // Streamed bodies carry no length, so hyper frames them as chunked.
    assert!(resp.headers().get(header::CONTENT_LENGTH).is_none());
    assert_eq!(body_bytes(resp).await, CHUNKS.concat().as_bytes());
}

#[tokio::test]
async fn empty_is_ok_without_body() {
    let resp = app().oneshot(get("/empty")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn moved_redirects_to_index() {
    let resp = app().oneshot(get("/moved")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(resp.headers()[header::LOCATION], "/");
}

#[tokio::test]
async fn unknown_paths_are_404() {
    let resp = app().oneshot(get("/nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_bytes(resp).await, "no such resource");
}

#[tokio::test(start_paused = true)]
async fn slow_answers_after_its_delay() {
    let started = tokio::time::Instant::now();
    let resp = app().oneshot(get("/slow")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(started.elapsed() >= mock_server::SLOW_DELAY);
}
