//! Incremental loading and decoding of HTTP request bodies.
//!
//! A body is read chunk by chunk into a [`SpooledBuffer`], which keeps small
//! bodies in memory and moves large ones to a temporary file. Once complete it
//! is decoded by content type: `multipart/*` bodies through a streaming
//! [`Tokenizer`] and [`MultipartDecoder`], `application/x-www-form-urlencoded`
//! and `application/json` bodies into [`Params`]. An [`UploadTracker`] follows
//! many uploads at once and reports their progress.
//!
//! Bodies can be read with blocking I/O or with tokio's [`AsyncRead`], picked
//! per request through [`Input`].
//!
//! # Examples
//!
//! ```
//! use bodyspool::Request;
//!
//! # fn run() -> bodyspool::Result<()> {
//! let data = "--X\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nfoo\r\n--X\r\nContent-Disposition: form-data; name=\"data\"; filename=\"t.txt\"\r\n\r\nhello\r\n--X--\r\n";
//!
//! let req = http::Request::post("/upload")
//!     .header("content-type", "multipart/form-data; boundary=X")
//!     .header("content-length", data.len())
//!     .body(data.as_bytes())
//!     .unwrap();
//!
//! let mut req = Request::from_blocking(req);
//! req.load(None, true)?;
//!
//! assert_eq!(req.text("name"), Some("foo"));
//!
//! let file = req.file("data").unwrap();
//! assert_eq!(file.file_name(), Some("t.txt"));
//! assert_eq!(file.text()?, "hello");
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! [`AsyncRead`]: tokio::io::AsyncRead

pub use body::RequestBody;
pub use config::{Config, SizeLimit};
pub use error::Error;
pub use file::File;
pub use input::{Input, Mode};
pub use loader::{BodyLoader, DecodeOutcome, FormData};
pub use multipart::{MultipartDecoder, Part};
pub use params::{Param, Params, Value};
pub use request::Request;
pub use spool::SpooledBuffer;
pub use state::LoadState;
pub use tokenizer::{Event, Tokenizer};
pub use tracker::{UploadIter, UploadSession, UploadTracker};
pub use upload::{Upload, UploadInfo, UploadStatus};

mod body;
mod buffer;
mod config;
mod constants;
mod content_disposition;
mod error;
mod file;
mod helpers;
mod input;
mod loader;
mod multipart;
mod params;
mod request;
mod spool;
mod state;
mod tokenizer;
mod tracker;
mod upload;
pub mod urlencoded;

/// A Result type often returned from methods that can have `bodyspool` errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the boundary value.
///
/// Any `multipart/*` type is accepted. The boundary is unquoted and must be
/// 1 to 70 bytes, with no line breaks and no nested `boundary=`.
///
/// # Examples
///
/// ```
/// let boundary = bodyspool::parse_boundary("multipart/form-data; boundary=ABCDEFG").unwrap();
/// assert_eq!(boundary, "ABCDEFG");
/// ```
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(Error::DecodeContentType)?;

    boundary_from_mime(&m)
}

pub(crate) fn boundary_from_mime(m: &mime::Mime) -> Result<String> {
    if m.type_() != mime::MULTIPART {
        return Err(Error::NoMultipart);
    }

    let raw = m.get_param(mime::BOUNDARY).ok_or(Error::NoBoundary)?;
    let boundary = helpers::unquote(raw.as_str());

    let malformed = boundary.is_empty()
        || boundary.len() > constants::MAX_BOUNDARY_LEN
        || boundary.contains(['\r', '\n'])
        || boundary.to_ascii_lowercase().contains("boundary=");

    if malformed {
        return Err(Error::MalformedBoundary {
            boundary: raw.as_str().to_owned(),
        });
    }

    Ok(boundary.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boundary() {
        let content_type = "multipart/form-data; boundary=ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("ABCDEFG".to_owned()));

        let content_type = "multipart/form-data; boundary=------ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("------ABCDEFG".to_owned()));

        let content_type = "multipart/mixed; boundary=\"quoted boundary\"";
        assert_eq!(parse_boundary(content_type), Ok("quoted boundary".to_owned()));

        let content_type = "boundary=------ABCDEFG";
        assert!(parse_boundary(content_type).is_err());

        let content_type = "text/plain";
        assert_eq!(parse_boundary(content_type), Err(Error::NoMultipart));

        let content_type = "text/plain; boundary=------ABCDEFG";
        assert_eq!(parse_boundary(content_type), Err(Error::NoMultipart));

        let content_type = "multipart/form-data";
        assert_eq!(parse_boundary(content_type), Err(Error::NoBoundary));
    }

    #[test]
    fn test_malformed_boundary() {
        let too_long = format!("multipart/form-data; boundary={}", "a".repeat(71));
        assert!(matches!(parse_boundary(too_long), Err(Error::MalformedBoundary { .. })));

        let longest = format!("multipart/form-data; boundary={}", "a".repeat(70));
        assert!(parse_boundary(longest).is_ok());

        for content_type in [
            "multipart/form-data; boundary=\"boundary=abc\"",
            "multipart/form-data; boundary=\"xBOUNDARY=abc\"",
        ] {
            assert!(
                matches!(parse_boundary(content_type), Err(Error::MalformedBoundary { .. })),
                "{}",
                content_type
            );
        }
    }
}
