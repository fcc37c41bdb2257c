//! HTTP/1.1 response builder and writer.
//!
//! A [`Response`] owns the write half of exactly one connection. It is filled in
//! with the builder methods and then terminated in one of two ways:
//!
//! - [`Response::end`] writes the whole response with a `Content-Length` and
//!   closes the connection.
//! - [`Response::chunked`] writes the status line and headers and returns a
//!   [`ChunkedResponse`]; bytes passed to [`ChunkedResponse::write_chunk`] go
//!   straight to the connection and [`ChunkedResponse::flush_chunks`] writes a
//!   trailing `Content-Length` line and closes it.
//!
//! Chunked mode does not produce RFC 9112 chunk framing. Each chunk is written
//! raw, without a size line, there is no blank line between the headers and the
//! first chunk, and the stream ends with `Content-Length: <n>` instead of a
//! zero-size chunk. Clients that honour `Transfer-Encoding: chunked` will reject
//! it; it is kept because existing peers rely on this exact byte layout.

use std::fmt;
use std::io::{self, Write};

use bytes::{BufMut, BytesMut};
use thiserror::Error;

use super::{CRLF, HTTP_VERSION, Headers, StatusCode, date};

/// Default value of the `Server` header.
pub const DEFAULT_SERVER_NAME: &str = "pollhttp";

/// Errors raised while terminating a response.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("failed to write response: {0}")]
    Io(#[from] io::Error),

    #[error("response ended before a body was set")]
    MissingBody,
}

/// An HTTP/1.1 response bound to one connection.
///
/// # Examples
///
/// ```
/// use pollhttp::http::{Response, StatusCode};
///
/// # fn main() -> Result<(), pollhttp::http::ResponseError> {
/// # let stream = std::io::sink();
/// Response::new(stream)
///     .status(StatusCode::NotFound)
///     .header("Content-Type", "text/plain")
///     .content("no such page")
///     .end()?;
/// # Ok(())
/// # }
/// ```
pub struct Response {
    sink: Box<dyn Write + Send>,
    code: u16,
    reason: String,
    headers: Headers,
    body: Option<Vec<u8>>,
    server_name: String,
}

impl Response {
    /// Creates a `200 OK` response with no headers and no body, writing to `sink`.
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            code: 200,
            reason: StatusCode::Ok.canonical_reason().to_owned(),
            headers: Headers::new(),
            body: None,
            server_name: DEFAULT_SERVER_NAME.to_owned(),
        }
    }

    pub(crate) fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Sets the numeric status code.
    #[must_use]
    pub fn code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    /// Sets the reason phrase of the status line.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Sets the status code and its canonical reason phrase together.
    #[must_use]
    pub fn status(self, status: StatusCode) -> Self {
        self.code(status.as_u16()).reason(status.canonical_reason())
    }

    /// Sets a header. Setting an existing name replaces the value in place.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn content(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Appends to the body. An unset body is treated as empty.
    #[must_use]
    pub fn append(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.body
            .get_or_insert_with(Vec::new)
            .extend_from_slice(bytes.as_ref());
        self
    }

    /// Returns the status code.
    pub fn status_code(&self) -> u16 {
        self.code
    }

    /// Returns the reason phrase.
    pub fn reason_phrase(&self) -> &str {
        &self.reason
    }

    /// Returns the headers set so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body, if one has been set.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Writes the complete response and closes the connection.
    ///
    /// Sets `Date`, `Server`, `Connection: close` and `Content-Length` before
    /// writing the status line, the headers in insertion order, a blank line and
    /// the body.
    ///
    /// # Errors
    ///
    /// [`ResponseError::MissingBody`] if no body was set; nothing is written in
    /// that case. [`ResponseError::Io`] if the connection fails mid-write.
    pub fn end(mut self) -> Result<(), ResponseError> {
        let body = self.body.take().ok_or(ResponseError::MissingBody)?;

        self.headers.insert("Date", date::now());
        self.headers.insert("Server", self.server_name.clone());
        self.headers.insert("Connection", "close");
        self.headers.insert("Content-Length", body.len().to_string());

        let mut buf = self.head();
        buf.put(CRLF.as_bytes());
        buf.put(body.as_slice());

        self.sink.write_all(&buf)?;
        self.sink.flush()?;
        Ok(())
    }

    /// Switches to streamed mode and writes the status line and headers.
    ///
    /// Sets `Date`, `Server` and `Transfer-Encoding: chunked`. No blank line
    /// follows the headers; see the module docs for the exact byte layout.
    ///
    /// # Errors
    ///
    /// [`ResponseError::Io`] if the connection fails mid-write.
    pub fn chunked(mut self) -> Result<ChunkedResponse, ResponseError> {
        self.headers.insert("Date", date::now());
        self.headers.insert("Server", self.server_name.clone());
        self.headers.insert("Transfer-Encoding", "chunked");

        let head = self.head();
        self.sink.write_all(&head)?;

        Ok(ChunkedResponse {
            sink: self.sink,
            body: self.body.unwrap_or_default(),
        })
    }

    /// Serializes the status line and every header, without the blank line.
    fn head(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64);
        buf.put(format!("{HTTP_VERSION} {} {}{CRLF}", self.code, self.reason).as_bytes());
        buf.put(self.headers.to_string().as_bytes());
        buf
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("code", &self.code)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

/// A response in streamed mode, returned by [`Response::chunked`].
pub struct ChunkedResponse {
    sink: Box<dyn Write + Send>,
    body: Vec<u8>,
}

impl ChunkedResponse {
    /// Writes `bytes` to the connection as-is and records them in the body.
    ///
    /// # Errors
    ///
    /// [`ResponseError::Io`] if the connection fails mid-write.
    pub fn write_chunk(&mut self, bytes: impl AsRef<[u8]>) -> Result<&mut Self, ResponseError> {
        let bytes = bytes.as_ref();
        self.sink.write_all(bytes)?;
        self.body.extend_from_slice(bytes);
        Ok(self)
    }

    /// Every byte streamed so far, plus any body set before [`Response::chunked`].
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Writes the trailing `Content-Length` line and closes the connection.
    ///
    /// # Errors
    ///
    /// [`ResponseError::Io`] if the connection fails mid-write.
    pub fn flush_chunks(mut self) -> Result<(), ResponseError> {
        let line = format!("Content-Length: {}{CRLF}", self.body.len());
        self.sink.write_all(line.as_bytes())?;
        self.sink.flush()?;
        Ok(())
    }
}

impl fmt::Debug for ChunkedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedResponse")
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}
