//! HTTP/1.1 wire format: the GET request bytes and the response head.
//!
//! # Design
//! Everything here works on byte slices and strings, with no I/O. The
//! exchange reads bytes off the socket and hands complete pieces to these
//! functions, which keeps the format rules testable without a network.

use crate::error::FetchError;
use crate::types::HeaderMap;

/// Upper bound on the status line plus header block.
pub const MAX_HEAD_LEN: usize = 64 * 1024;

/// Serialise the GET request for `resource` on `host`.
///
/// `resource` is sent verbatim; an empty resource becomes `/`.
pub fn build_request(host: &str, resource: &str) -> Vec<u8> {
    let resource = if resource.is_empty() { "/" } else { resource };
    format!("GET {resource} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n").into_bytes()
}

/// Find the `\r\n\r\n` that ends the head. Returns the index of its first byte.
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Find the first `\r\n`. Returns the index of the `\r`.
pub fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

/// Parse a response head (status line plus header block, terminator excluded).
pub fn parse_head(head: &[u8]) -> Result<(u16, HeaderMap), FetchError> {
    let text = String::from_utf8_lossy(head);
    let (status_line, rest) = match text.split_once('\n') {
        Some((line, rest)) => (line, rest),
        None => (text.as_ref(), ""),
    };
    let status = parse_status_line(status_line)?;
    Ok((status, parse_headers(rest)))
}

/// Extract the status code from a line such as `HTTP/1.1 200 OK`.
pub fn parse_status_line(line: &str) -> Result<u16, FetchError> {
    let mut tokens = line.split_whitespace();
    let _version = tokens
        .next()
        .ok_or_else(|| FetchError::malformed("empty status line"))?;
    let code = tokens
        .next()
        .ok_or_else(|| FetchError::malformed(format!("no status code in {line:?}")))?;
    code.parse()
        .map_err(|_| FetchError::malformed(format!("status code {code:?} is not a number")))
}

/// Parse header lines up to the first blank (or all-whitespace) line.
///
/// Lines may end in `\r\n` or a bare `\n`. Lines without a `:` are skipped.
pub fn parse_headers(block: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for line in block.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.insert(name, value.trim_start());
    }
    headers
}

/// The first digit of a status code: 2 for success, 4 for client errors...
pub fn status_class(status: u16) -> u16 {
    status / 100
}
