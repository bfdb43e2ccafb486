use std::fmt::{self, Debug, Display, Formatter};

use derive_more::Display;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A set of errors that can occur while loading a request body, decoding it
/// and tracking uploads.
#[derive(Display)]
#[non_exhaustive]
pub enum Error {
    /// The transport ended before the declared `Content-Length` was reached.
    #[display(fmt = "request body truncated: read {} out of {} bytes", received, expected)]
    TruncatedBody { expected: u64, received: u64 },

    /// Reading from the transport failed.
    #[display(fmt = "stream read failed: {}", _0)]
    StreamReadFailed(BoxError),

    /// The body was driven in a scheduling mode its input doesn't support,
    /// e.g. a blocking `load` on an async input.
    #[display(fmt = "request body input must be driven with the {} API", expected)]
    WrongMode { expected: &'static str },

    /// `decode` was called before the whole body was loaded.
    #[display(fmt = "request body is not fully loaded: read {} out of {} bytes", read, declared)]
    BodyNotLoaded { declared: u64, read: u64 },

    /// The body's declared size exceeded the configured limit.
    #[display(fmt = "stream size exceeded the maximum limit: {} bytes", limit)]
    StreamSizeExceeded { limit: u64 },

    /// A multipart part exceeded its size limit.
    #[display(
        fmt = "field {:?} exceeded the size limit: {} bytes",
        "field_name.as_deref().unwrap_or(\"<unknown>\")",
        limit
    )]
    FieldSizeExceeded { limit: u64, field_name: Option<String> },

    /// The `Content-Type` is not `multipart/*`.
    #[display(fmt = "Content-Type is not multipart")]
    NoMultipart,

    /// Failed to convert the `Content-Type` to [`mime::Mime`] type.
    #[display(fmt = "failed to convert Content-Type to `mime::Mime` type: {}", _0)]
    DecodeContentType(mime::FromStrError),

    /// No boundary found in `Content-Type` header.
    #[display(fmt = "multipart boundary not found in Content-Type")]
    NoBoundary,

    /// The declared boundary can't delimit parts reliably.
    #[display(fmt = "multipart boundary {:?} is malformed", boundary)]
    MalformedBoundary { boundary: String },

    /// The `charset` of a form body is not a known encoding label.
    #[display(fmt = "unknown form charset: {}", charset)]
    UnknownCharset { charset: String },

    /// An `application/x-www-form-urlencoded` body couldn't be decoded.
    #[display(fmt = "failed to decode form body: {}", reason)]
    DecodeForm { reason: String },

    /// Failed to decode an `application/json` body.
    #[display(fmt = "failed to decode body as JSON: {}", _0)]
    DecodeJson(serde_json::Error),

    /// Spooling the body to its backing store failed.
    #[display(fmt = "body spool I/O failed: {}", _0)]
    Io(std::io::Error),
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::StreamReadFailed(err) => Some(err.as_ref()),
            Error::DecodeContentType(err) => Some(err),
            Error::DecodeJson(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl Error {
    /// Whether the error came from the transport rather than from the body's
    /// contents.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::TruncatedBody { .. } | Error::StreamReadFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_is_transport() {
        let err = Error::TruncatedBody {
            expected: 10,
            received: 4,
        };
        assert!(err.is_transport());
        assert_eq!(err.to_string(), "request body truncated: read 4 out of 10 bytes");
        assert!(!Error::NoBoundary.is_transport());
    }
}
