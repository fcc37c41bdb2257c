//! Raw HTTP/1.1 request head parsing.
//!
//! The parser works on the bytes of a single socket read. Each byte is taken
//! as one character (Latin-1), so no input is rejected for its encoding. Only
//! complete lines are considered: if the read stopped in the middle of a line,
//! that trailing fragment is dropped and the rest is parsed as usual.

use thiserror::Error;

use super::{CRLF, Headers, Method};

/// Errors that can occur while parsing a request head.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("malformed request: {reason}")]
    Malformed { reason: String },
}

impl RequestError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// A parsed HTTP request head.
///
/// Header names keep the case they were received in, and a later header with
/// the same literal name overwrites an earlier one. Values are everything after
/// the first colon, untrimmed.
///
/// # Examples
///
/// ```
/// use pollhttp::http::{Method, Request};
///
/// let raw = b"get /hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let request = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method(), &Method::Get);
/// assert_eq!(request.location(), "/hello?name=world");
/// assert_eq!(request.version(), "HTTP/1.1");
/// assert_eq!(request.header("Host"), Some(" localhost"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    location: String,
    version: String,
    headers: Headers,
}

impl Request {
    /// Parses a request head out of the bytes of one read.
    ///
    /// # Errors
    ///
    /// [`RequestError::Malformed`] if the request line has fewer than three
    /// whitespace-separated tokens, or if a header line has no colon.
    pub fn parse(buf: &[u8]) -> Result<Self, RequestError> {
        let text = complete_lines(buf);
        let mut lines = text.split(CRLF);

        let request_line = lines.next().unwrap_or_default();
        let mut tokens = request_line.split_whitespace();
        let (Some(method), Some(location), Some(version)) =
            (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(RequestError::malformed(
                "request line needs a method, a target and a version",
            ));
        };

        let mut headers = Headers::new();
        for line in lines.take_while(|line| !line.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| RequestError::malformed(format!("header line without colon: {line:?}")))?;
            headers.insert(name, value);
        }

        let method = match method.to_uppercase().parse::<Method>() {
            Ok(method) => method,
            Err(never) => match never {},
        };

        Ok(Self {
            method,
            location: location.to_owned(),
            version: version.to_owned(),
            headers,
        })
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request target exactly as it appeared on the request line.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Returns the protocol token of the request line, e.g. `HTTP/1.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the value of the header with exactly this name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// Decodes every `\n`-terminated line of `buf`, one character per byte.
fn complete_lines(buf: &[u8]) -> String {
    let end = buf
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    buf[..end].iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.location(), "/");
        assert_eq!(req.version(), "HTTP/1.1");
        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.header("Host"), Some(" localhost"));
    }

    #[test]
    fn method_is_upper_cased() {
        let req = Request::parse(b"delete /item/7 HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(req.method(), &Method::Delete);
        assert_eq!(req.version(), "HTTP/1.0");

        let req = Request::parse(b"purge /cache HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.method().as_str(), "PURGE");
    }

    #[test]
    fn target_is_not_decoded() {
        let req = Request::parse(b"GET /a%20b?x=1&y HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.location(), "/a%20b?x=1&y");
    }

    #[test]
    fn value_splits_on_first_colon_only() {
        let req = Request::parse(b"GET / HTTP/1.1\r\nHost: example.com:8080\r\n\r\n").unwrap();
        assert_eq!(req.header("Host"), Some(" example.com:8080"));
    }

    #[test]
    fn duplicate_header_last_write_wins() {
        let raw = b"GET / HTTP/1.1\r\nX-A: 1\r\nX-B: 2\r\nX-A: 3\r\n\r\n";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.headers().len(), 2);
        assert_eq!(req.header("X-A"), Some(" 3"));
    }

    #[test]
    fn header_names_keep_their_case() {
        let raw = b"GET / HTTP/1.1\r\nHost: a\r\nhost: b\r\n\r\n";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.headers().len(), 2);
        assert_eq!(req.header("Host"), Some(" a"));
        assert_eq!(req.header("host"), Some(" b"));
    }

    #[test]
    fn too_few_tokens_is_malformed() {
        for raw in [&b"GET /\r\n\r\n"[..], b"GET\r\n\r\n", b"\r\n\r\n", b""] {
            assert!(matches!(
                Request::parse(raw),
                Err(RequestError::Malformed { .. })
            ));
        }
    }

    #[test]
    fn header_without_colon_is_malformed() {
        let raw = b"GET / HTTP/1.1\r\nHost localhost\r\n\r\n";
        assert!(matches!(
            Request::parse(raw),
            Err(RequestError::Malformed { .. })
        ));
    }

    #[test]
    fn trailing_partial_line_is_dropped() {
        // A read that stopped mid-header, as happens when the head is larger than the buffer.
        let raw = b"GET /big HTTP/1.1\r\nHost: x\r\nX-Trunc";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.location(), "/big");
        assert_eq!(req.headers().len(), 1);
    }

    #[test]
    fn request_line_without_newline_is_malformed() {
        assert!(Request::parse(b"GET / HTTP/1.1").is_err());
    }

    #[test]
    fn bytes_after_head_are_ignored() {
        let raw = b"POST /form HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc\r\n";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Post);
        assert_eq!(req.headers().len(), 1);
    }

    #[test]
    fn non_utf8_bytes_are_accepted() {
        let raw = b"GET /caf\xe9 HTTP/1.1\r\nX-Name: \xff\r\n\r\n";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.location(), "/caf\u{e9}");
        assert_eq!(req.header("X-Name"), Some(" \u{ff}"));
    }
}
