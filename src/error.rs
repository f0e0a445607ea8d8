//! Error and Result types surfaced to applications.

use std::error::Error as StdError;
use std::fmt;

use crate::status::StatusCode;

/// Result type returned from Reader/Writer operations.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// An error produced while reading or writing a stream exchange.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    /// End of the stream was reached cleanly; no more data is coming.
    ReadFinished,
    /// The transport or the user aborted the exchange.
    ReadAborted,
    /// A parse failure occurred after the initial (bad chunk length, bad
    /// trailer, unterminated chunk-length line, etc).
    ReceivedDataMalformed,
    /// The initial, a chunk length line, or the streamed body exceeded a
    /// configured cap.
    EntityTooLarge,
    /// An `exactly = true` read could not be satisfied before end-of-stream.
    ReadUnsatisfiable,
    /// The buffered body exceeded `max_buf_len` before an unsized read
    /// could complete.
    MaxBufferReached,
    /// `read_until` exhausted the stream without finding its separator.
    SeparatorNotFound,
    /// A write was attempted after the writer reached FINISHED.
    WriteAfterFinished,
    /// The writer was aborted, or the transport reported a write failure.
    WriteAborted,
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

    pub(crate) fn kind(&self) -> Kind {
        self.inner.kind
    }

    pub(crate) fn read_finished() -> Error {
        Error::new(Kind::ReadFinished)
    }

    pub(crate) fn read_aborted() -> Error {
        Error::new(Kind::ReadAborted)
    }

    pub(crate) fn received_data_malformed() -> Error {
        Error::new(Kind::ReceivedDataMalformed)
    }

    pub(crate) fn entity_too_large() -> Error {
        Error::new(Kind::EntityTooLarge)
    }

    pub(crate) fn read_unsatisfiable() -> Error {
        Error::new(Kind::ReadUnsatisfiable)
    }

    pub(crate) fn max_buffer_reached() -> Error {
        Error::new(Kind::MaxBufferReached)
    }

    pub(crate) fn separator_not_found() -> Error {
        Error::new(Kind::SeparatorNotFound)
    }

    pub(crate) fn write_after_finished() -> Error {
        Error::new(Kind::WriteAfterFinished)
    }

    pub(crate) fn write_aborted() -> Error {
        Error::new(Kind::WriteAborted)
    }

    /// True if end-of-stream was reached cleanly (not an abort or a parse
    /// failure).
    pub fn is_read_finished(&self) -> bool {
        self.kind() == Kind::ReadFinished
    }

    pub fn is_read_aborted(&self) -> bool {
        self.kind() == Kind::ReadAborted
    }

    pub fn is_entity_too_large(&self) -> bool {
        self.kind() == Kind::EntityTooLarge
    }

    pub fn is_write_aborted(&self) -> bool {
        self.kind() == Kind::WriteAborted
    }

    fn description(&self) -> &'static str {
        match self.inner.kind {
            Kind::ReadFinished => "read finished",
            Kind::ReadAborted => "read aborted",
            Kind::ReceivedDataMalformed => "received data malformed",
            Kind::EntityTooLarge => "entity too large",
            Kind::ReadUnsatisfiable => "not enough bytes to satisfy an exact read",
            Kind::MaxBufferReached => "max buffer reached",
            Kind::SeparatorNotFound => "separator not found before end of stream",
            Kind::WriteAfterFinished => "write after finished",
            Kind::WriteAborted => "write aborted",
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
        match self.inner.cause {
            Some(ref cause) => write!(f, "{}: {}", self.description(), cause),
            None => f.write_str(self.description()),
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

/// The initial of a request could not be read. Only produced server-side,
/// from `next_request`, since there is no Reader yet to carry the error.
///
/// The only way to respond to a client that sent this is through
/// [`RequestInitialError::default_status`] and the handle the Connection
/// Driver derives from it — a normal `write_response` is impossible because
/// the exchange's Reader was never constructed.
#[derive(Debug)]
pub enum RequestInitialError {
    /// The initial (or an unterminated chunk-length line) exceeded
    /// `max_initial_size`. Defaults to responding 431.
    TooLarge,
    /// The initial failed to parse: bad method, bad version, a header
    /// without `:`, a malformed `Content-Length`, or a malformed
    /// `Transfer-Encoding`. Defaults to responding 400.
    Malformed,
}

impl RequestInitialError {
    /// The status code the spec mandates as the default response for this
    /// failure.
    pub fn default_status(&self) -> StatusCode {
        match self {
            RequestInitialError::TooLarge => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            RequestInitialError::Malformed => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for RequestInitialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestInitialError::TooLarge => f.write_str("request initial too large"),
            RequestInitialError::Malformed => f.write_str("request initial malformed"),
        }
    }
}

impl StdError for RequestInitialError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_statuses_match_spec() {
        assert_eq!(
            RequestInitialError::TooLarge.default_status(),
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
        );
        assert_eq!(
            RequestInitialError::Malformed.default_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn display_includes_cause() {
        let err = Error::received_data_malformed()
            .with(std::io::Error::new(std::io::ErrorKind::Other, "bad hex"));
        assert!(format!("{}", err).contains("bad hex"));
    }
}
