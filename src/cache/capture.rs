use std::io;

use bytes::{Bytes, BytesMut};

use crate::http::{Headers, ResponseWriter, StatusCode};

/// A tee around a [`ResponseWriter`].
///
/// Every body write is forwarded unchanged to the wrapped writer, and the
/// bytes it accepted are also appended to an internal buffer. Status and
/// header calls pass straight through, so the wrapped writer ends up in
/// exactly the state it would have without the capture.
pub struct Capture<W> {
    inner: W,
    body: BytesMut,
}

impl<W: ResponseWriter> Capture<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            body: BytesMut::new(),
        }
    }

    /// The bytes captured so far.
    pub fn captured(&self) -> &[u8] {
        &self.body
    }

    /// Returns the wrapped writer and the complete captured body.
    pub fn into_parts(self) -> (W, Bytes) {
        (self.inner, self.body.freeze())
    }
}

impl<W: ResponseWriter> io::Write for Capture<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.body.extend_from_slice(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: ResponseWriter> ResponseWriter for Capture<W> {
    fn status(&self) -> StatusCode {
        self.inner.status()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.inner.set_status(status);
    }

    fn headers(&self) -> &Headers {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut Headers {
        self.inner.headers_mut()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::Response;

    // Accepts at most `limit` bytes per write, like a socket with a small buffer.
    struct Trickle {
        response: Response,
        limit: usize,
    }

    impl io::Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.response.write(&buf[..n])
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ResponseWriter for Trickle {
        fn status(&self) -> StatusCode {
            self.response.status()
        }

        fn set_status(&mut self, status: StatusCode) {
            ResponseWriter::set_status(&mut self.response, status);
        }

        fn headers(&self) -> &Headers {
            self.response.headers()
        }

        fn headers_mut(&mut self) -> &mut Headers {
            self.response.headers_mut()
        }
    }

    #[test]
    fn forwards_and_records_every_write() {
        let mut sink = Response::new(StatusCode::Ok);
        let mut capture = Capture::new(&mut sink);
        capture.write_all(b"first ").unwrap();
        capture.write_all(b"second").unwrap();
        assert_eq!(capture.captured(), b"first second");

        let (_, body) = capture.into_parts();
        assert_eq!(&body[..], b"first second");
        assert_eq!(sink.content(), b"first second");
    }

    #[test]
    fn status_and_headers_reach_the_real_writer() {
        let mut sink = Response::new(StatusCode::Ok);
        let mut capture = Capture::new(&mut sink);
        capture.set_status(StatusCode::ImATeapot);
        capture.headers_mut().insert("Content-Type", "text/plain");
        assert_eq!(capture.status(), StatusCode::ImATeapot);
        drop(capture);

        assert_eq!(sink.status(), StatusCode::ImATeapot);
        assert_eq!(sink.headers().get("content-type"), Some("text/plain"));
        assert!(sink.content().is_empty());
    }

    #[test]
    fn records_only_what_the_writer_accepted() {
        let trickle = Trickle {
            response: Response::new(StatusCode::Ok),
            limit: 3,
        };
        let mut capture = Capture::new(trickle);
        assert_eq!(capture.write(b"abcdef").unwrap(), 3);
        capture.write_all(b"ghijk").unwrap();

        let (trickle, body) = capture.into_parts();
        assert_eq!(&body[..], b"abcghijk");
        assert_eq!(trickle.response.content(), b"abcghijk");
    }

    #[test]
    fn replayed_response_is_captured_verbatim() {
        let handler_output = Response::new(StatusCode::Created)
            .header("Content-Type", "application/json")
            .body(r#"{"id":1}"#);

        let mut sink = Response::new(StatusCode::Ok);
        let mut capture = Capture::new(&mut sink);
        handler_output.write_into(&mut capture).unwrap();
        let (_, body) = capture.into_parts();

        assert_eq!(&body[..], br#"{"id":1}"#);
        assert_eq!(sink.status(), StatusCode::Created);
        assert_eq!(sink.headers().get("content-type"), Some("application/json"));
        assert_eq!(sink.content(), br#"{"id":1}"#);
    }
}
