use std::borrow::Cow;
use std::error::Error;
use std::fmt::{self, Display};

type BoxedError = Box<dyn Error + Send + Sync + 'static>;

/// A specialized result type used throughout this crate.
pub type Result<T> = std::result::Result<T, ReadError>;

/// The error type emitted while decoding a capture stream.
///
/// The format is self-describing only through its typed record headers, so
/// once a record fails to decode the stream is desynchronised and the reader
/// should be torn down. [`kind`] distinguishes the failure classes a caller
/// can react to; anything forwarded from the underlying transport is wrapped
/// with kind [`ErrorKind::External`].
///
/// [`kind`]: ReadError::kind
#[derive(Debug)]
pub struct ReadError {
    code: ErrorKind,
    source: Option<BoxedError>,
}

impl ReadError {
    /// Create a new `ReadError` from an arbitrary error payload.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<BoxedError>,
    {
        Self {
            code: ErrorKind::External,
            source: Some(error.into()),
        }
    }

    /// Create a new `ReadError` with a custom message.
    pub(crate) fn custom(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(DetailError(msg.into())).with_kind(kind)
    }

    /// Get the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.code
    }

    pub(crate) const fn from_kind(code: ErrorKind) -> Self {
        Self { code, source: None }
    }

    pub(crate) fn with_kind(self, code: ErrorKind) -> Self {
        Self { code, ..self }
    }

    /// The source ended partway through a record body.
    pub fn truncated() -> Self {
        Self::from_kind(ErrorKind::TruncatedBody)
    }
}

/// A list specifying general categories of stream decoding error.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The stream does not carry the expected magic bytes, or a decoded
    /// value is structurally impossible (e.g. an overlong varint).
    InvalidFormat,

    /// The header's format version is not the one this crate understands.
    VersionMismatch,

    /// The source ended while the fixed header was being decoded.
    TruncatedHeader,

    /// The source ended partway through a record body.
    ///
    /// A short read *between* records is a clean end of stream and is not
    /// reported through this type at all.
    TruncatedBody,

    /// Two frame dictionary records carried the same frame id.
    DuplicateFrameId,

    /// A record carried a tag that is not valid at its position, e.g. a
    /// segment group interrupted by an unrelated record.
    UnexpectedTag,

    /// The record header byte named a type this crate does not know.
    UnknownRecordType,

    /// A reconstructed table no longer agrees with itself, e.g. a stack
    /// index pointing outside the frame tree.
    CorruptState,

    /// The operation needs the stack-tracking tables, but the reader was
    /// constructed with stack tracking disabled.
    StackTrackingDisabled,

    /// An error forwarded from the underlying transport.
    External,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidFormat => "invalid stream format",
            ErrorKind::VersionMismatch => "unsupported format version",
            ErrorKind::TruncatedHeader => "truncated header",
            ErrorKind::TruncatedBody => "truncated record body",
            ErrorKind::DuplicateFrameId => "duplicate frame id",
            ErrorKind::UnexpectedTag => "unexpected record tag",
            ErrorKind::UnknownRecordType => "unknown record type",
            ErrorKind::CorruptState => "corrupt reader state",
            ErrorKind::StackTrackingDisabled => "stack tracking is disabled",
            ErrorKind::External => "external error",
        }
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code.as_str())?;

        if let Some(source) = &self.source {
            f.write_str(": ")?;
            source.fmt(f)?;
        }

        Ok(())
    }
}

impl Error for ReadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(source) => Some(&**source),
            None => None,
        }
    }
}

impl From<std::io::Error> for ReadError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::new(error).with_kind(ErrorKind::TruncatedBody),
            _ => Self::new(error),
        }
    }
}

#[derive(Debug)]
struct DetailError(Cow<'static, str>);

impl fmt::Display for DetailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for DetailError {}
