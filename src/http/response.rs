//! Outgoing responses.
//!
//! A [`Response`] is built fluently by handlers, can be written to like any
//! other [`ResponseWriter`], and is serialized once by the server.

use std::io;

use bytes::BytesMut;

use super::{Headers, ResponseWriter, StatusCode};

/// An HTTP/1.1 response.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    /// Appends a header to a response already in hand, e.g. one returned by
    /// the next middleware.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    #[must_use]
    pub fn body(self, body: impl Into<String>) -> Self {
        self.body_bytes(body.into())
    }

    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Chooses between `Connection: keep-alive` (the default) and `close`.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Replaces any existing values of `name` with `value`.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// `false` once the response asks for the connection to be closed.
    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The body written so far.
    pub fn content(&self) -> &[u8] {
        &self.body
    }

    /// Replays this response into `writer`: status, then each header in
    /// order, then the body in one write followed by a flush. Headers already
    /// on `writer` are kept.
    ///
    /// # Errors
    ///
    /// Whatever `writer` reports while taking the body.
    pub fn write_into<W: ResponseWriter + ?Sized>(self, writer: &mut W) -> io::Result<()> {
        writer.set_status(self.status);
        for (name, value) in self.headers.iter() {
            writer.headers_mut().insert(name, value);
        }
        writer.write_all(&self.body)?;
        writer.flush()
    }

    /// Serializes to HTTP/1.1 wire format.
    ///
    /// A non-empty body without a `Content-Type` is labelled as UTF-8 text.
    /// `Connection` and `Content-Length` are always written, in that order, last.
    pub fn into_bytes(mut self) -> BytesMut {
        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers.insert("Content-Type", "text/plain; charset=utf-8");
        }
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        self.headers.insert("Connection", connection);

        let head = format!(
            "HTTP/1.1 {} {}\r\n{}Content-Length: {}\r\n\r\n",
            self.status.as_u16(),
            self.status.canonical_reason(),
            self.headers,
            self.body.len(),
        );
        let mut buf = BytesMut::with_capacity(head.len() + self.body.len());
        buf.extend_from_slice(head.as_bytes());
        buf.extend_from_slice(&self.body);
        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

impl io::Write for Response {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseWriter for Response {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }
}
