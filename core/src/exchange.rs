//! One request/response exchange over a socket owned by a single task.
//!
//! # Design
//! `PendingExchange` bundles the stream, the read buffer and the timeout
//! guard. Every await inside it goes through the guard, so a fired deadline
//! interrupts whichever step is in flight. Dropping the exchange closes the
//! socket, and that happens on every exit path because the task owns it by
//! value.
//!
//! Bytes that arrive past the end of the head stay in `buf` and are consumed
//! by the body decoders before anything new is read from the socket.

use std::io;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::body::{parse_chunk_size, select_body, BodyKind, MAX_CHUNK_LINE_LEN};
use crate::error::{unexpected_eof, FetchError};
use crate::guard::TimeoutGuard;
use crate::http::{
    build_request, find_crlf, find_header_end, parse_head, status_class, MAX_HEAD_LEN,
};
use crate::types::{HeaderMap, Response};

/// Port used when the host carries none, i.e. service "http".
pub(crate) const HTTP_PORT: u16 = 80;

const READ_CHUNK: usize = 8 * 1024;

/// Run a complete GET exchange against `host`.
pub(crate) async fn run(host: &str, resource: &str, timeout: Duration) -> Result<Response, FetchError> {
    let guard = TimeoutGuard::arm(timeout);
    let deadline = guard.deadline();
    // Errors raised without touching the socket (a non-200 status, say) skip
    // the guard, so the flag is checked once more on the way out.
    deadline.settle(drive(host, resource, guard).await)
}

async fn drive(host: &str, resource: &str, guard: TimeoutGuard) -> Result<Response, FetchError> {
    let stream = guard.run(connect(host)).await?;
    tracing::debug!(host, "connected");

    let mut exchange = PendingExchange::new(stream, guard);
    exchange.write_request(&build_request(host, resource)).await?;
    let (status, headers) = exchange.read_head().await?;
    let body = exchange.read_body(status, &headers).await?;
    exchange.finish()?;
    Ok(Response::new(status, headers, body))
}

/// Resolve `host` and connect to the first address that accepts.
pub(crate) async fn connect(host: &str) -> Result<TcpStream, FetchError> {
    let (name, port) = split_host_port(host)?;
    let addrs = tokio::net::lookup_host((name, port))
        .await
        .map_err(FetchError::Connection)?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(FetchError::Connection(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{name} resolved to no addresses"),
        )
    })))
}

/// Split `name[:port]` (or `[v6]:port`), defaulting to port 80.
pub(crate) fn split_host_port(host: &str) -> Result<(&str, u16), FetchError> {
    let invalid = |why: &str| {
        FetchError::Connection(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid host {host:?}: {why}"),
        ))
    };
    let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid("bad port"));

    let (name, port) = if let Some(rest) = host.strip_prefix('[') {
        let (name, after) = rest.split_once(']').ok_or_else(|| invalid("unclosed '['"))?;
        match after.strip_prefix(':') {
            Some(port) => (name, parse_port(port)?),
            None if after.is_empty() => (name, HTTP_PORT),
            None => return Err(invalid("unexpected text after ']'")),
        }
    } else {
        match host.rsplit_once(':') {
            // A second colon means a bare IPv6 literal, not a port.
            Some((name, port)) if !name.contains(':') => (name, parse_port(port)?),
            _ => (host, HTTP_PORT),
        }
    };
    if name.is_empty() {
        return Err(invalid("empty host name"));
    }
    Ok((name, port))
}

pub(crate) struct PendingExchange<S> {
    stream: S,
    buf: BytesMut,
    guard: TimeoutGuard,
}

impl<S> PendingExchange<S> {
    pub(crate) fn new(stream: S, guard: TimeoutGuard) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
            guard,
        }
    }

    /// Cancel the deadline. Reports `Timeout` if it fired first.
    pub(crate) fn finish(&mut self) -> Result<(), FetchError> {
        self.guard.disarm()
    }
}

impl<S: AsyncWrite + Unpin> PendingExchange<S> {
    pub(crate) async fn write_request(&mut self, request: &[u8]) -> Result<(), FetchError> {
        let Self { stream, guard, .. } = self;
        guard
            .run(async move {
                stream.write_all(request).await.map_err(FetchError::Network)?;
                stream.flush().await.map_err(FetchError::Network)
            })
            .await
    }
}

impl<S: AsyncRead + Unpin> PendingExchange<S> {
    /// Read one batch from the socket into the buffer. `Ok(0)` means EOF.
    async fn fill(&mut self) -> Result<usize, FetchError> {
        let Self { stream, buf, guard } = self;
        if buf.capacity() - buf.len() < READ_CHUNK {
            buf.reserve(READ_CHUNK);
        }
        guard
            .run(async move { stream.read_buf(buf).await.map_err(FetchError::Network) })
            .await
    }

    /// Read and parse the status line and header block.
    pub(crate) async fn read_head(&mut self) -> Result<(u16, HeaderMap), FetchError> {
        let mut scanned: usize = 0;
        loop {
            let from = scanned.saturating_sub(3);
            if let Some(end) = find_header_end(&self.buf[from..]) {
                let head = self.buf.split_to(from + end);
                self.buf.advance(4);
                let (status, headers) = parse_head(&head)?;
                tracing::debug!(
                    status,
                    class = status_class(status),
                    fields = headers.len(),
                    "response head parsed"
                );
                return Ok((status, headers));
            }
            scanned = self.buf.len();
            if scanned > MAX_HEAD_LEN {
                return Err(FetchError::malformed(format!(
                    "response head exceeds {MAX_HEAD_LEN} bytes"
                )));
            }
            if self.fill().await? == 0 {
                return Err(FetchError::Network(unexpected_eof("response head")));
            }
        }
    }

    /// Pick a body strategy from the head and decode the body with it.
    pub(crate) async fn read_body(
        &mut self,
        status: u16,
        headers: &HeaderMap,
    ) -> Result<Bytes, FetchError> {
        let kind = select_body(status, headers)?;
        tracing::debug!(?kind, "reading body");
        match kind {
            BodyKind::Chunked => self.read_chunked().await,
            BodyKind::Fixed(len) => self.read_fixed(len).await,
        }
    }

    /// Read exactly `len` body bytes. A zero length reads nothing.
    pub(crate) async fn read_fixed(&mut self, len: usize) -> Result<Bytes, FetchError> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        self.read_exact(len, "body").await
    }

    /// Decode a chunked body until the zero-size chunk.
    pub(crate) async fn read_chunked(&mut self) -> Result<Bytes, FetchError> {
        let mut body = BytesMut::new();
        let mut state = ChunkState::ReadSize;
        loop {
            state = match state {
                ChunkState::ReadSize => {
                    let line = self.read_line(MAX_CHUNK_LINE_LEN).await?;
                    match parse_chunk_size(&line)? {
                        0 => {
                            self.skip_final_crlf().await?;
                            ChunkState::Done
                        }
                        size => ChunkState::ReadData(size),
                    }
                }
                ChunkState::ReadData(size) => {
                    let data = self.read_exact(size, "chunk data").await?;
                    body.extend_from_slice(&data);
                    ChunkState::ReadTrailingCrlf
                }
                ChunkState::ReadTrailingCrlf => {
                    // Discarded without checking that it really is CRLF.
                    self.read_exact(2, "chunk terminator").await?;
                    ChunkState::ReadSize
                }
                ChunkState::Done => return Ok(body.freeze()),
            };
        }
    }

    async fn read_exact(&mut self, len: usize, what: &str) -> Result<Bytes, FetchError> {
        while self.buf.len() < len {
            if self.fill().await? == 0 {
                return Err(FetchError::Network(unexpected_eof(what)));
            }
        }
        Ok(self.buf.split_to(len).freeze())
    }

    async fn read_line(&mut self, max: usize) -> Result<Bytes, FetchError> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line = self.buf.split_to(pos).freeze();
                self.buf.advance(2);
                return Ok(line);
            }
            if self.buf.len() > max {
                return Err(FetchError::malformed(format!(
                    "chunk size line exceeds {max} bytes"
                )));
            }
            if self.fill().await? == 0 {
                return Err(FetchError::Network(unexpected_eof("chunk size")));
            }
        }
    }

    /// Consume the CRLF after the last chunk if the peer sends one.
    async fn skip_final_crlf(&mut self) -> Result<(), FetchError> {
        while self.buf.len() < 2 {
            if self.fill().await? == 0 {
                break;
            }
        }
        let n = self.buf.len().min(2);
        self.buf.advance(n);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum ChunkState {
    ReadSize,
    ReadData(usize),
    ReadTrailingCrlf,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn exchange_over(bytes: &'static [u8]) -> PendingExchange<&'static [u8]> {
        PendingExchange::new(bytes, TimeoutGuard::disarmed())
    }

    fn encode_chunked(chunks: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in chunks.iter().filter(|c| !c.is_empty()) {
            out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
            out.extend_from_slice(chunk);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"0\r\n\r\n");
        out
    }

    #[test]
    fn split_host_port_defaults_to_http() {
        assert_eq!(split_host_port("www.boost.org").unwrap(), ("www.boost.org", 80));
        assert_eq!(split_host_port("127.0.0.1:8080").unwrap(), ("127.0.0.1", 8080));
        assert_eq!(split_host_port("[::1]:3000").unwrap(), ("::1", 3000));
        assert_eq!(split_host_port("[::1]").unwrap(), ("::1", 80));
        assert_eq!(split_host_port("::1").unwrap(), ("::1", 80));
    }

    #[test]
    fn split_host_port_rejects_garbage() {
        for host in ["", ":80", "host:http", "[::1", "[::1]x"] {
            assert!(
                matches!(split_host_port(host), Err(FetchError::Connection(_))),
                "{host}"
            );
        }
    }

    #[tokio::test]
    async fn head_then_fixed_body_from_one_buffer() {
        let mut ex = exchange_over(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
        let (status, headers) = ex.read_head().await.unwrap();
        assert_eq!(status, 200);
        let body = ex.read_body(status, &headers).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn fixed_body_ignores_trailing_bytes() {
        let mut ex = exchange_over(b"abcdefgh");
        assert_eq!(&ex.read_fixed(3).await.unwrap()[..], b"abc");
    }

    #[tokio::test]
    async fn short_fixed_body_is_network_error() {
        let mut ex = exchange_over(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhello");
        let (status, headers) = ex.read_head().await.unwrap();
        let err = ex.read_body(status, &headers).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn eof_inside_head_is_network_error() {
        let mut ex = exchange_over(b"HTTP/1.1 200 OK\r\nContent-Le");
        assert!(matches!(ex.read_head().await, Err(FetchError::Network(_))));
    }

    #[tokio::test]
    async fn oversized_head_is_malformed() {
        let head: &'static [u8] = Vec::leak(vec![b'a'; MAX_HEAD_LEN + 10]);
        let mut ex = exchange_over(head);
        assert!(matches!(
            ex.read_head().await,
            Err(FetchError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn zero_content_length_reads_nothing_more() {
        let (client, mut server) = duplex(1024);
        server
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        // `server` stays open: any further read would wait forever.
        let mut ex = PendingExchange::new(client, TimeoutGuard::disarmed());
        let (status, headers) = ex.read_head().await.unwrap();
        let body = tokio::time::timeout(Duration::from_secs(1), ex.read_body(status, &headers))
            .await
            .expect("body read must not touch the socket")
            .unwrap();
        assert!(body.is_empty());
        drop(server);
    }

    #[tokio::test]
    async fn chunked_hello() {
        let mut ex = exchange_over(b"5\r\nhello\r\n0\r\n\r\n");
        assert_eq!(&ex.read_chunked().await.unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn chunked_without_final_crlf() {
        let mut ex = exchange_over(b"3\r\nabc\r\n0\r\n");
        assert_eq!(&ex.read_chunked().await.unwrap()[..], b"abc");
    }

    #[tokio::test]
    async fn chunked_tolerates_whitespace_and_extensions() {
        let mut ex = exchange_over(b" 4 \r\nwiki\r\n5;x=y\r\npedia\r\n0\r\n\r\n");
        assert_eq!(&ex.read_chunked().await.unwrap()[..], b"wikipedia");
    }

    #[tokio::test]
    async fn chunked_trailing_bytes_are_not_validated() {
        let mut ex = exchange_over(b"2\r\nhiXX0\r\n\r\n");
        assert_eq!(&ex.read_chunked().await.unwrap()[..], b"hi");
    }

    #[tokio::test]
    async fn chunked_bad_size_is_malformed() {
        let mut ex = exchange_over(b"nope\r\nhello\r\n0\r\n\r\n");
        assert!(matches!(
            ex.read_chunked().await,
            Err(FetchError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn chunked_short_data_is_network_error() {
        let mut ex = exchange_over(b"a\r\nshort");
        assert!(matches!(ex.read_chunked().await, Err(FetchError::Network(_))));
    }

    #[tokio::test]
    async fn chunked_round_trip() {
        let big = vec![b'x'; 5000];
        let samples: Vec<Vec<&[u8]>> = vec![
            vec![],
            vec![&b"a"[..]],
            vec![&b"hello"[..], &b" "[..], &b"world"[..]],
            vec![&b"\r\n\r\n"[..], &b"0\r\n"[..], &b"\x00\xff"[..]],
            vec![&big[..], &b"tail"[..]],
        ];
        for chunks in samples {
            let encoded: &'static [u8] = Vec::leak(encode_chunked(&chunks));
            let mut ex = exchange_over(encoded);
            let decoded = ex.read_chunked().await.unwrap();
            assert_eq!(decoded.to_vec(), chunks.concat());
        }
    }

    #[tokio::test]
    async fn chunked_across_small_reads() {
        let (client, mut server) = duplex(3);
        let writer = tokio::spawn(async move {
            server
                .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n6\r\nchunky\r\n3\r\nbit\r\n0\r\n\r\n")
                .await
                .unwrap();
        });
        let mut ex = PendingExchange::new(client, TimeoutGuard::disarmed());
        let (status, headers) = ex.read_head().await.unwrap();
        let body = ex.read_body(status, &headers).await.unwrap();
        assert_eq!(&body[..], b"chunkybit");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn error_status_skips_body() {
        let mut ex = exchange_over(b"HTTP/1.1 404 Not Found\r\nContent-Length: 3\r\n\r\nnah");
        let (status, headers) = ex.read_head().await.unwrap();
        assert!(matches!(
            ex.read_body(status, &headers).await,
            Err(FetchError::BadRequest(404))
        ));
    }

    #[tokio::test]
    async fn request_is_written_in_full() {
        let (client, mut server) = duplex(8);
        let mut ex = PendingExchange::new(client, TimeoutGuard::disarmed());
        let request = build_request("www.vandal.net", "/");
        let reader = tokio::spawn(async move {
            let mut received = Vec::new();
            server.read_to_end(&mut received).await.unwrap();
            received
        });
        ex.write_request(&request).await.unwrap();
        drop(ex);
        assert_eq!(reader.await.unwrap(), request);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_a_stalled_read() {
        let (client, _server) = duplex(64);
        let mut ex = PendingExchange::new(client, TimeoutGuard::arm(Duration::from_millis(5)));
        assert!(matches!(ex.read_head().await, Err(FetchError::Timeout)));
        assert!(matches!(ex.finish(), Err(FetchError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn status_error_after_expiry_settles_as_timeout() {
        let guard = TimeoutGuard::arm(Duration::from_millis(10));
        let deadline = guard.deadline();
        let mut ex = PendingExchange::new(
            &b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n"[..],
            guard,
        );
        let (status, headers) = ex.read_head().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Status selection never touches the socket, so the guard alone misses it.
        let outcome = ex.read_body(status, &headers).await;
        assert!(matches!(outcome, Err(FetchError::BadRequest(404))));
        assert!(matches!(deadline.settle(outcome), Err(FetchError::Timeout)));
    }
}
