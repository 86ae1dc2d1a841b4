//! Lookup wire protocol.
//!
//! A request is a single frame of at most 1024 bytes holding the query text,
//! with unused trailing bytes padded with NUL. The reply is one of three
//! newline-terminated literals:
//!
//! ```text
//! STRING EXISTS\n
//! STRING NOT FOUND\n
//! ERROR\n
//! ```

use bytes::{BufMut, BytesMut};
use std::fmt;
use std::str;

/// Maximum size of a request frame
pub const MAX_FRAME_SIZE: usize = 1024;

/// Reply to a single query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Exists,
    NotFound,
    Error,
}

impl Response {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Response::Exists => b"STRING EXISTS\n",
            Response::NotFound => b"STRING NOT FOUND\n",
            Response::Error => b"ERROR\n",
        }
    }

    /// Parse a reply line as written by the server
    pub fn parse(line: &[u8]) -> Option<Response> {
        [Response::Exists, Response::NotFound, Response::Error]
            .into_iter()
            .find(|response| response.as_bytes() == line)
    }
}

impl From<bool> for Response {
    fn from(found: bool) -> Self {
        if found {
            Response::Exists
        } else {
            Response::NotFound
        }
    }
}

/// Frame decoding errors
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    /// Frame larger than `MAX_FRAME_SIZE`
    TooLarge(usize),
    /// Query bytes are not valid UTF-8
    InvalidUtf8(str::Utf8Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooLarge(len) => {
                write!(f, "frame of {len} bytes exceeds {MAX_FRAME_SIZE} bytes")
            }
            FrameError::InvalidUtf8(e) => write!(f, "query is not valid UTF-8: {e}"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Extract the query from a request frame.
///
/// Trailing NUL padding is stripped, then surrounding whitespace.
pub fn decode_query(frame: &[u8]) -> Result<&str, FrameError> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(frame.len()));
    }

    let end = frame
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |pos| pos + 1);

    let query = str::from_utf8(&frame[..end]).map_err(FrameError::InvalidUtf8)?;
    Ok(query.trim())
}

/// Build a NUL-padded request frame for `query`.
pub fn encode_query(query: &str) -> Result<BytesMut, FrameError> {
    let bytes = query.as_bytes();
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(bytes.len()));
    }

    let mut frame = BytesMut::with_capacity(MAX_FRAME_SIZE);
    frame.put_slice(bytes);
    frame.put_bytes(0, MAX_FRAME_SIZE - bytes.len());
    Ok(frame)
}
