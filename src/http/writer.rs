//! The outgoing-response sink contract.
//!
//! A [`ResponseWriter`] is anything that accepts a status, a header map, and a
//! stream of body bytes through [`std::io::Write`]. [`Response`](super::Response)
//! is the canonical implementation; decorators such as the cache capture tee
//! wrap another writer and forward to it.

use std::io;

use super::{Headers, StatusCode};

/// A sink for an outgoing HTTP response.
///
/// Body bytes are written through the [`io::Write`] supertrait. Status and
/// headers may be read back at any time, which lets observers inspect the
/// final state after a handler has finished writing.
pub trait ResponseWriter: io::Write {
    /// The status code currently recorded on the response.
    fn status(&self) -> StatusCode;

    /// Replaces the recorded status code.
    fn set_status(&mut self, status: StatusCode);

    /// The headers recorded so far.
    fn headers(&self) -> &Headers;

    /// Mutable access to the recorded headers.
    fn headers_mut(&mut self) -> &mut Headers;
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn status(&self) -> StatusCode {
        (**self).status()
    }

    fn set_status(&mut self, status: StatusCode) {
        (**self).set_status(status);
    }

    fn headers(&self) -> &Headers {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut Headers {
        (**self).headers_mut()
    }
}
