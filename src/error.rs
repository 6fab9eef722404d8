//! Error and Result module.
//!
//! One boxed [`Error`] type for the whole crate, in the shape hyper uses:
//! a `Kind` tag plus an optional boxed cause, rather than one enum variant
//! per failure site.

use std::error::Error as StdError;
use std::fmt;

/// Result type returned from fallible operations across the crate.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// The crate's single error type.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

/// Coarse category of an [`Error`], matching the taxonomy in the design's
/// error-handling section: transport, parse, resource, handler, recursion.
#[derive(Debug)]
pub(crate) enum Kind {
    /// Socket reset or TLS handshake failure. The affected connection is
    /// torn down silently; other connections are unaffected.
    Transport,
    /// HTTP/1 request-line, header, or body parse failure.
    Http1Parse,
    /// HTTP/2 frame or HPACK decode failure, carrying the GOAWAY/RST_STREAM
    /// reason that should be sent to the peer.
    Http2(crate::h2::frame::Reason),
    /// SMTP or IMAP command parse/state failure.
    LineProtocol,
    /// The inbound buffer would exceed `MAX_REQUEST_LEN`.
    RequestTooLarge,
    /// Internal-request recursion depth exceeded, or the same `(method,
    /// route)` pair was re-entered within one dispatch.
    Recursion,
    /// An uncaught error surfaced from application handler code.
    Handler,
    /// I/O error while reading or writing a connection.
    Io,
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(crate) fn kind(&self) -> &Kind {
        &self.inner.kind
    }

    /// Returns true if this was a parse error (HTTP/1, HTTP/2, or the line
    /// protocols) as opposed to a transport or handler error.
    pub fn is_parse(&self) -> bool {
        matches!(
            self.inner.kind,
            Kind::Http1Parse | Kind::Http2(_) | Kind::LineProtocol
        )
    }

    /// Returns true if the request was rejected for exceeding `MAX_REQUEST_LEN`.
    pub fn is_too_large(&self) -> bool {
        matches!(self.inner.kind, Kind::RequestTooLarge)
    }

    /// Returns true if this came from application handler code rather than
    /// the protocol layer.
    pub fn is_handler(&self) -> bool {
        matches!(self.inner.kind, Kind::Handler)
    }

    /// The HTTP/2 GOAWAY/RST_STREAM reason to report for this error, if any.
    pub fn h2_reason(&self) -> Option<crate::h2::frame::Reason> {
        match self.inner.kind {
            Kind::Http2(reason) => Some(reason),
            _ => None,
        }
    }

    pub(crate) fn new_io(cause: std::io::Error) -> Error {
        Error::new(Kind::Io).with(cause)
    }

    pub(crate) fn new_transport<C: Into<Cause>>(cause: C) -> Error {
        Error::new(Kind::Transport).with(cause)
    }

    pub(crate) fn new_http1_parse() -> Error {
        Error::new(Kind::Http1Parse)
    }

    pub(crate) fn new_http2(reason: crate::h2::frame::Reason) -> Error {
        Error::new(Kind::Http2(reason))
    }

    pub(crate) fn new_line_protocol() -> Error {
        Error::new(Kind::LineProtocol)
    }

    pub(crate) fn new_too_large() -> Error {
        Error::new(Kind::RequestTooLarge)
    }

    pub(crate) fn new_recursion() -> Error {
        Error::new(Kind::Recursion)
    }

    pub(crate) fn new_handler<C: Into<Cause>>(cause: C) -> Error {
        Error::new(Kind::Handler).with(cause)
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::Transport => "transport error",
            Kind::Http1Parse => "invalid HTTP/1.1 message",
            Kind::Http2(_) => "HTTP/2 protocol error",
            Kind::LineProtocol => "invalid SMTP/IMAP command",
            Kind::RequestTooLarge => "request exceeded MAX_REQUEST_LEN",
            Kind::Recursion => "recursion limit exceeded",
            Kind::Handler => "error from application handler",
            Kind::Io => "I/O error",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref cause) = self.inner.cause {
            write!(f, "{}: {}", self.description(), cause)
        } else {
            f.write_str(self.description())
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::new_io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h2_reason_roundtrip() {
        let err = Error::new_http2(crate::h2::frame::Reason::PROTOCOL_ERROR);
        assert_eq!(err.h2_reason(), Some(crate::h2::frame::Reason::PROTOCOL_ERROR));
        assert!(err.is_parse());
    }

    #[test]
    fn description_has_no_cause() {
        let err = Error::new_too_large();
        assert!(err.is_too_large());
        assert_eq!(err.to_string(), "request exceeded MAX_REQUEST_LEN");
    }
}
