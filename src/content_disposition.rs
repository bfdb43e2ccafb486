use crate::helpers;
use http::header::{self, HeaderMap};

const CONTENT_DESCRIPTION: &str = "content-description";

/// A header value split into its leading token and `key=value` parameters,
/// e.g. `form-data; name="a"` gives `("form-data", [("name", "a")])`.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct HeaderValueParams {
    pub(crate) value: String,
    pub(crate) params: Vec<(String, String)>,
}

impl HeaderValueParams {
    pub(crate) fn parse(text: &str) -> HeaderValueParams {
        let mut parsed = HeaderValueParams::default();

        for (idx, segment) in split_unquoted(text, ';').into_iter().enumerate() {
            match segment.split_once('=') {
                Some((key, value)) => parsed.params.push((
                    helpers::unquote(key).to_ascii_lowercase(),
                    helpers::unquote(value).to_owned(),
                )),
                None if idx == 0 => parsed.value = helpers::unquote(segment).to_owned(),
                None => {}
            }
        }

        parsed
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Splits on `sep` outside of double-quoted runs, so `filename="a;b"` stays
/// in one piece.
fn split_unquoted(text: &str, sep: char) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (idx, ch) in text.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                segments.push(&text[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    segments.push(&text[start..]);

    segments
}

/// What a part's `Content-Disposition` (and `Content-Description`) say
/// about it.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ContentDisposition {
    pub(crate) field_name: Option<String>,
    pub(crate) file_name: Option<String>,
    pub(crate) is_file: bool,
}

impl ContentDisposition {
    pub(crate) fn parse(headers: &HeaderMap) -> ContentDisposition {
        let disposition = headers
            .get(header::CONTENT_DISPOSITION)
            .and_then(|val| val.to_str().ok())
            .map(HeaderValueParams::parse)
            .unwrap_or_default();

        let description = headers
            .get(CONTENT_DESCRIPTION)
            .and_then(|val| val.to_str().ok())
            .map(|val| helpers::unquote(val).to_owned())
            .filter(|val| !val.is_empty());

        let non_empty = |key: &str| disposition.get(key).filter(|v| !v.is_empty()).map(str::to_owned);

        let is_file = disposition.get("filename").is_some();
        let file_name = if is_file {
            non_empty("filename").or_else(|| description.clone())
        } else {
            None
        };
        let field_name = non_empty("name")
            .or_else(|| non_empty("filename"))
            .or(description);

        ContentDisposition {
            field_name,
            file_name,
            is_file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_parse_header_value() {
        let parsed = HeaderValueParams::parse("multipart/mixed; boundary=inner");
        assert_eq!(parsed.value, "multipart/mixed");
        assert_eq!(parsed.get("boundary"), Some("inner"));

        let parsed = HeaderValueParams::parse(r#"form-data; name="my field"; filename="a;b.txt""#);
        assert_eq!(parsed.value, "form-data");
        assert_eq!(parsed.get("name"), Some("my field"));
        assert_eq!(parsed.get("filename"), Some("a;b.txt"));
    }

    #[test]
    fn test_plain_field() {
        let cd = ContentDisposition::parse(&headers(&[("content-disposition", r#"form-data; name="my_field""#)]));
        assert_eq!(cd.field_name.as_deref(), Some("my_field"));
        assert_eq!(cd.file_name, None);
        assert!(!cd.is_file);
    }

    #[test]
    fn test_file_field() {
        let cd = ContentDisposition::parse(&headers(&[(
            "content-disposition",
            r#"form-data; name="data"; filename="file abc.txt""#,
        )]));
        assert_eq!(cd.field_name.as_deref(), Some("data"));
        assert_eq!(cd.file_name.as_deref(), Some("file abc.txt"));
        assert!(cd.is_file);
    }

    #[test]
    fn test_description_fallback() {
        let cd = ContentDisposition::parse(&headers(&[
            ("content-disposition", r#"attachment; filename="""#),
            ("content-description", "\"report.pdf\""),
        ]));
        assert!(cd.is_file);
        assert_eq!(cd.field_name.as_deref(), Some("report.pdf"));
        assert_eq!(cd.file_name.as_deref(), Some("report.pdf"));
    }

    #[test]
    fn test_missing_disposition() {
        assert_eq!(ContentDisposition::parse(&HeaderMap::new()), ContentDisposition::default());
    }
}
