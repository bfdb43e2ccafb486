use encoding_rs::{Encoding, UTF_8};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use httparse::Header;
use std::borrow::Cow;
use std::convert::TryFrom;

/// Converts parsed part headers, skipping any whose name or value isn't a
/// valid HTTP header.
pub(crate) fn convert_raw_headers_to_header_map(raw_headers: &[Header]) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(raw_headers.len());

    for raw_header in raw_headers {
        let name = match HeaderName::try_from(raw_header.name) {
            Ok(name) => name,
            Err(err) => {
                log::warn!("skipping part header {:?}: {}", raw_header.name, err);
                continue;
            }
        };

        let value = match HeaderValue::from_bytes(raw_header.value) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("skipping value of part header {:?}: {}", raw_header.name, err);
                continue;
            }
        };

        headers.append(name, value);
    }

    headers
}

/// Strips surrounding whitespace and one matching pair of `"` or `'`.
pub(crate) fn unquote(text: &str) -> &str {
    let text = text.trim();
    let bytes = text.as_bytes();

    if bytes.len() >= 2 && bytes[0] == bytes[bytes.len() - 1] && (bytes[0] == b'"' || bytes[0] == b'\'') {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// Looks up an `encoding_rs` encoding, falling back to UTF-8 when no label is
/// given.
pub(crate) fn encoding_for(charset: Option<&str>) -> Option<&'static Encoding> {
    match charset {
        Some(label) => Encoding::for_label(label.trim().as_bytes()),
        None => Some(UTF_8),
    }
}

/// Decodes text leniently, replacing malformed sequences.
pub(crate) fn decode_text(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _, _) = encoding.decode(bytes);

    match text {
        Cow::Owned(s) => s,
        Cow::Borrowed(s) => String::from(s),
    }
}
