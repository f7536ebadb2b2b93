//! Choosing how to read a response body, and the chunk-size line format.
//!
//! The decoders themselves live on the exchange, since they pull bytes off
//! the socket; this module only holds the decisions that need no I/O.

use crate::error::FetchError;
use crate::types::HeaderMap;

/// Upper bound on a single chunk-size line, extensions included.
pub const MAX_CHUNK_LINE_LEN: usize = 4 * 1024;

/// How the body following a head is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// `Transfer-Encoding` was present; the value is not inspected.
    Chunked,
    /// `Content-Length` bytes follow.
    Fixed(usize),
}

/// Decide how to read the body, or fail before reading anything.
///
/// Any status other than 200 ends the exchange with `BadRequest`.
pub fn select_body(status: u16, headers: &HeaderMap) -> Result<BodyKind, FetchError> {
    if status != 200 {
        return Err(FetchError::BadRequest(status));
    }
    if headers.contains("transfer-encoding") {
        return Ok(BodyKind::Chunked);
    }
    match headers.get("content-length") {
        Some(value) => value
            .trim()
            .parse()
            .map(BodyKind::Fixed)
            .map_err(|_| FetchError::malformed(format!("invalid content-length {value:?}"))),
        None => Err(FetchError::malformed(
            "neither content-length nor transfer-encoding present",
        )),
    }
}

/// Parse a chunk-size line (CRLF already stripped) as hexadecimal.
///
/// Whitespace around the digits and `;extension` suffixes are tolerated.
pub fn parse_chunk_size(line: &[u8]) -> Result<usize, FetchError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| FetchError::malformed("chunk size line is not ASCII"))?;
    let digits = text.split(';').next().unwrap_or_default().trim();
    if digits.is_empty() {
        return Err(FetchError::malformed("empty chunk size line"));
    }
    usize::from_str_radix(digits, 16)
        .map_err(|_| FetchError::malformed(format!("invalid chunk size {digits:?}")))
}
