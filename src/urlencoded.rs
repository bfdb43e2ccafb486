//! `application/x-www-form-urlencoded` decoding.

use crate::{helpers, Params};
use encoding_rs::Encoding;
use percent_encoding::percent_decode;
use std::borrow::Cow;

/// Decodes a form body. Every name and value must be valid in `charset`
/// (UTF-8 when `None`) once percent-decoded.
///
/// Pairs are separated by `&`; a pair without `=` has an empty value and
/// blank values are kept. A repeated name becomes an ordered list.
///
/// # Examples
///
/// ```
/// use bodyspool::{urlencoded, Param};
///
/// let params = urlencoded::decode(b"a=1&b=2&b=3", None).unwrap();
/// assert_eq!(params.text("a"), Some("1"));
/// assert_eq!(params.get("b"), Some(&Param::Many(vec!["2".into(), "3".into()])));
/// ```
pub fn decode(body: &[u8], charset: Option<&str>) -> crate::Result<Params> {
    let encoding = helpers::encoding_for(charset).ok_or_else(|| crate::Error::UnknownCharset {
        charset: charset.unwrap_or_default().to_owned(),
    })?;

    let mut params = Params::new();

    for (name, value) in pairs(body) {
        let name = decode_component(name, encoding)?;
        let value = decode_component(value, encoding)?;
        params.add(name, value);
    }

    Ok(params)
}

/// Parses a URI query string, replacing anything that isn't valid UTF-8.
pub fn parse_query(query: &str) -> Params {
    let mut params = Params::new();

    for (name, value) in pairs(query.as_bytes()) {
        let name = String::from_utf8_lossy(&unescape(name)).into_owned();
        let value = String::from_utf8_lossy(&unescape(value)).into_owned();
        params.add(name, value);
    }

    params
}

fn pairs(body: &[u8]) -> impl Iterator<Item = (&[u8], &[u8])> {
    body.split(|&b| b == b'&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.iter().position(|&b| b == b'=') {
            Some(idx) => (&pair[..idx], &pair[idx + 1..]),
            None => (pair, &pair[pair.len()..]),
        })
}

fn unescape(component: &[u8]) -> Cow<'_, [u8]> {
    let component: Cow<'_, [u8]> = if component.contains(&b'+') {
        Cow::Owned(
            component
                .iter()
                .map(|&b| if b == b'+' { b' ' } else { b })
                .collect(),
        )
    } else {
        Cow::Borrowed(component)
    };

    match component {
        Cow::Borrowed(bytes) => percent_decode(bytes).into(),
        Cow::Owned(bytes) => Cow::Owned(percent_decode(&bytes).collect()),
    }
}

fn decode_component(component: &[u8], encoding: &'static Encoding) -> crate::Result<String> {
    let bytes = unescape(component);

    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes)
        .map(Cow::into_owned)
        .ok_or_else(|| crate::Error::DecodeForm {
            reason: format!(
                "{:?} is not valid {}",
                String::from_utf8_lossy(component),
                encoding.name()
            ),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Param, Value};
    use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

    fn encode(pairs: &[(&str, &str)]) -> String {
        pairs
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(k, NON_ALPHANUMERIC),
                    utf8_percent_encode(v, NON_ALPHANUMERIC)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    #[test]
    fn test_scenario_repeated_names() {
        let params = decode(b"a=1&b=2&b=3", None).unwrap();
        assert_eq!(params.get("a"), Some(&Param::One(Value::from("1"))));
        assert_eq!(
            params.get("b"),
            Some(&Param::Many(vec![Value::from("2"), Value::from("3")]))
        );
    }

    #[test]
    fn test_round_trip() {
        let pairs = [
            ("name", "Jane Doe"),
            ("q", "a&b=c"),
            ("emoji", "你好 ✓"),
            ("tags", "x"),
            ("tags", "y"),
            ("blank", ""),
        ];
        let params = decode(encode(&pairs).as_bytes(), None).unwrap();

        assert_eq!(params.text("name"), Some("Jane Doe"));
        assert_eq!(params.text("q"), Some("a&b=c"));
        assert_eq!(params.text("emoji"), Some("你好 ✓"));
        assert_eq!(
            params.get("tags"),
            Some(&Param::Many(vec![Value::from("x"), Value::from("y")]))
        );
        assert_eq!(params.text("blank"), Some(""));
        assert_eq!(params.len(), 5);
    }

    #[test]
    fn test_plus_and_bare_names() {
        let params = decode(b"greeting=hello+world&flag&&x=%2B", None).unwrap();
        assert_eq!(params.text("greeting"), Some("hello world"));
        assert_eq!(params.text("flag"), Some(""));
        assert_eq!(params.text("x"), Some("+"));
    }

    #[test]
    fn test_charset() {
        let params = decode(b"city=Z%FCrich", Some("iso-8859-1")).unwrap();
        assert_eq!(params.text("city"), Some("Zürich"));

        assert!(matches!(
            decode(b"city=Z%FCrich", None),
            Err(crate::Error::DecodeForm { .. })
        ));
        assert_eq!(
            decode(b"a=1", Some("klingon")).unwrap_err(),
            crate::Error::UnknownCharset {
                charset: "klingon".to_owned()
            }
        );
    }

    #[test]
    fn test_parse_query_is_lenient() {
        let params = parse_query("uid=u%201&bad=%FF");
        assert_eq!(params.text("uid"), Some("u 1"));
        assert_eq!(params.text("bad"), Some("\u{FFFD}"));
    }
}
