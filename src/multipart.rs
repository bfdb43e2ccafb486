use crate::content_disposition::ContentDisposition;
use crate::tokenizer::{Event, Tokenizer};
use crate::{helpers, Config, File, FormData, SpooledBuffer};
use http::header::{self, HeaderMap};
use std::io::{Read, Write};

/// One part of a multipart body: its headers and exactly its payload bytes.
#[derive(Debug)]
pub struct Part {
    headers: HeaderMap,
    disposition: ContentDisposition,
    body: SpooledBuffer,
    idx: usize,
}

impl Part {
    /// The field name from `Content-Disposition`, falling back to the file
    /// name and then to `Content-Description`.
    pub fn name(&self) -> Option<&str> {
        self.disposition.field_name.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.disposition.file_name.as_deref()
    }

    /// Whether the part carries a `filename` and so decodes to a [`File`].
    pub fn is_file(&self) -> bool {
        self.disposition.is_file
    }

    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<mime::Mime>().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &SpooledBuffer {
        &self.body
    }

    pub fn into_body(self) -> SpooledBuffer {
        self.body
    }

    /// Position of the part among the parts that were kept.
    pub fn index(&self) -> usize {
        self.idx
    }

    /// Decodes the payload with the charset of the part's `Content-Type`, or
    /// UTF-8.
    pub fn text(&self) -> crate::Result<String> {
        let charset = self.content_type().and_then(|mime| mime.get_param(mime::CHARSET).map(|c| c.to_string()));
        let encoding = helpers::encoding_for(charset.as_deref()).unwrap_or(encoding_rs::UTF_8);

        Ok(helpers::decode_text(&self.body.to_bytes()?, encoding))
    }

    fn declared_length(&self) -> Option<u64> {
        self.headers
            .get(header::CONTENT_LENGTH)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.trim().parse().ok())
    }
}

struct PartBuilder {
    headers: Option<HeaderMap>,
    disposition: ContentDisposition,
    body: SpooledBuffer,
    size_limit: u64,
}

/// Reassembles tokenizer events into [`Part`]s.
///
/// Parts without headers or without a usable name are dropped, as is a part
/// whose `Content-Length` header disagrees with the bytes found between its
/// delimiters. Decoding carries on with the parts that follow.
///
/// # Examples
///
/// ```
/// use bodyspool::MultipartDecoder;
///
/// let data = "--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nabcd\r\n--X--\r\n";
/// let parts: Vec<_> = MultipartDecoder::new(data.as_bytes(), "X")
///     .collect::<bodyspool::Result<_>>()
///     .unwrap();
///
/// assert_eq!(parts[0].name(), Some("a"));
/// assert_eq!(parts[0].text().unwrap(), "abcd");
/// ```
pub struct MultipartDecoder<R> {
    events: Tokenizer<R>,
    config: Config,
    current: Option<PartBuilder>,
    next_part_idx: usize,
    done: bool,
}

impl<R: Read> MultipartDecoder<R> {
    pub fn new<B: AsRef<str>>(source: R, boundary: B) -> MultipartDecoder<R> {
        MultipartDecoder::with_config(source, boundary, Config::default())
    }

    pub fn with_config<B: AsRef<str>>(source: R, boundary: B, config: Config) -> MultipartDecoder<R> {
        MultipartDecoder {
            events: Tokenizer::with_config(source, boundary, &config),
            config,
            current: None,
            next_part_idx: 0,
            done: false,
        }
    }

    fn new_builder(&self) -> PartBuilder {
        PartBuilder {
            headers: None,
            disposition: ContentDisposition::default(),
            body: SpooledBuffer::with_threshold(self.config.spool_threshold),
            size_limit: self.config.size_limit.per_part,
        }
    }

    fn finish(&mut self, builder: PartBuilder) -> Option<Part> {
        let headers = match builder.headers {
            Some(headers) if !headers.is_empty() => headers,
            _ => {
                if !builder.body.is_empty() {
                    log::warn!("dropping {} bytes of a multipart part without headers", builder.body.len());
                }
                return None;
            }
        };

        if builder.disposition.field_name.is_none() {
            log::warn!("dropping multipart part without a name");
            return None;
        }

        let mut body = builder.body;
        body.rewind();

        let part = Part {
            headers,
            disposition: builder.disposition,
            body,
            idx: self.next_part_idx,
        };

        if let Some(declared) = part.declared_length() {
            if declared != part.body.len() {
                log::warn!(
                    "dropping part {:?}: Content-Length is {} but {} bytes were found",
                    part.name(),
                    declared,
                    part.body.len()
                );
                return None;
            }
        }

        self.next_part_idx += 1;
        Some(part)
    }

    fn next_part(&mut self) -> crate::Result<Option<Part>> {
        loop {
            let event = match self.events.next() {
                Some(event) => event?,
                None => {
                    self.done = true;
                    return Ok(self.current.take().and_then(|builder| self.finish(builder)));
                }
            };

            match event {
                Event::Boundary => {
                    let next = self.new_builder();
                    if let Some(part) = self.current.replace(next).and_then(|builder| self.finish(builder)) {
                        return Ok(Some(part));
                    }
                }
                Event::Headers(headers) => {
                    if let Some(builder) = self.current.as_mut() {
                        builder.disposition = ContentDisposition::parse(&headers);
                        builder.size_limit = self
                            .config
                            .size_limit
                            .extract_size_limit_for(builder.disposition.field_name.as_deref());
                        builder.headers = Some(headers);
                    }
                }
                Event::Data(data) => match self.current.as_mut() {
                    Some(builder) => {
                        if builder.body.len() + data.len() as u64 > builder.size_limit {
                            return Err(crate::Error::FieldSizeExceeded {
                                limit: builder.size_limit,
                                field_name: builder.disposition.field_name.clone(),
                            });
                        }
                        builder.body.write_all(&data)?;
                    }
                    None => log::trace!("discarding {} bytes of multipart preamble", data.len()),
                },
            }
        }
    }
}

impl<R: Read> Iterator for MultipartDecoder<R> {
    type Item = crate::Result<Part>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.next_part() {
            Ok(part) => part.map(Ok),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Decodes every part of a multipart body into `form`. Parts decoded before
/// an error stay in `form`.
pub(crate) fn decode_into<R: Read>(source: R, boundary: &str, config: &Config, form: &mut FormData) -> crate::Result<()> {
    for part in MultipartDecoder::with_config(source, boundary, config.clone()) {
        let part = part?;
        let name = part.name().unwrap_or_default().to_owned();

        if part.is_file() {
            log::debug!("decoded file part {:?} ({} bytes)", name, part.body().len());
            form.files.push((name, File::from_part(part)));
        } else {
            let text = part.text()?;
            form.params.add(name, text);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SizeLimit;

    const BODY: &str = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"My Field\"\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"File Field\"; filename=\"a-text-file.txt\"\r\nContent-Type: text/plain\r\n\r\nHello world\nHello\r\nWorld\rAgain\r\n--X-BOUNDARY--\r\n";

    #[test]
    fn test_parts() {
        let parts: Vec<Part> = MultipartDecoder::new(BODY.as_bytes(), "X-BOUNDARY")
            .collect::<crate::Result<_>>()
            .unwrap();

        assert_eq!(parts.len(), 2);

        assert_eq!(parts[0].name(), Some("My Field"));
        assert_eq!(parts[0].file_name(), None);
        assert!(!parts[0].is_file());
        assert_eq!(parts[0].content_type(), None);
        assert_eq!(parts[0].index(), 0);
        assert_eq!(parts[0].text().unwrap(), "abcd");

        assert_eq!(parts[1].name(), Some("File Field"));
        assert_eq!(parts[1].file_name(), Some("a-text-file.txt"));
        assert!(parts[1].is_file());
        assert_eq!(parts[1].content_type(), Some(mime::TEXT_PLAIN));
        assert_eq!(parts[1].index(), 1);
        assert_eq!(parts[1].text().unwrap(), "Hello world\nHello\r\nWorld\rAgain");
    }

    #[test]
    fn test_empty() {
        let mut decoder = MultipartDecoder::new(&b"--X-BOUNDARY--\r\n"[..], "X-BOUNDARY");
        assert!(decoder.next().is_none());
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_part_without_headers_is_dropped() {
        let data = "--X\r\n\r\norphan\r\n--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--X--";
        let parts: Vec<Part> = MultipartDecoder::new(data.as_bytes(), "X")
            .collect::<crate::Result<_>>()
            .unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name(), Some("a"));
        assert_eq!(parts[0].index(), 0);
    }

    #[test]
    fn test_oversized_header_block_is_dropped() {
        let data = "--X\r\nContent-Disposition: form-data; name=\"a-rather-long-field-name\"\r\n\r\nlost\r\n--X\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\nkept\r\n--X--";
        let config = Config::new().max_header_bytes(64);
        let parts: Vec<Part> = MultipartDecoder::with_config(data.as_bytes(), "X", config)
            .collect::<crate::Result<_>>()
            .unwrap();

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name(), Some("b"));
        assert_eq!(parts[0].text().unwrap(), "kept");
    }

    #[test]
    fn test_declared_length_mismatch_is_dropped() {
        let data = "--X\r\nContent-Disposition: form-data; name=\"f\"; filename=\"f.bin\"\r\nContent-Length: 3\r\n\r\nabcd\r\n--X\r\nContent-Disposition: form-data; name=\"g\"; filename=\"g.bin\"\r\nContent-Length: 2\r\n\r\nok\r\n--X--";
        let parts: Vec<Part> = MultipartDecoder::new(data.as_bytes(), "X")
            .collect::<crate::Result<_>>()
            .unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name(), Some("g"));
        assert_eq!(parts[0].body().len(), 2);
    }

    #[test]
    fn test_large_part_spills_to_disk() {
        let payload = "z".repeat(100);
        let data = format!(
            "--X\r\nContent-Disposition: form-data; name=\"big\"; filename=\"big.txt\"\r\n\r\n{}\r\n--X--",
            payload
        );
        let config = Config::new().spool_threshold(16).tokenizer_chunk_size(7);
        let part = MultipartDecoder::with_config(data.as_bytes(), "X", config)
            .next()
            .unwrap()
            .unwrap();

        assert!(part.body().is_spilled());
        assert_eq!(part.text().unwrap(), payload);
    }

    #[test]
    fn test_field_size_limit() {
        let config = Config::new().size_limit(SizeLimit::new().per_part(30).for_part("My Field", 3));
        let mut decoder = MultipartDecoder::with_config(BODY.as_bytes(), "X-BOUNDARY", config);

        assert_eq!(
            decoder.next().unwrap().unwrap_err(),
            crate::Error::FieldSizeExceeded {
                limit: 3,
                field_name: Some("My Field".to_owned()),
            }
        );
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_decode_into_keeps_earlier_parts_on_error() {
        let config = Config::new().size_limit(SizeLimit::new().for_part("File Field", 4));
        let mut form = FormData::default();

        assert!(decode_into(BODY.as_bytes(), "X-BOUNDARY", &config, &mut form).is_err());
        assert_eq!(form.params.text("My Field"), Some("abcd"));
        assert!(form.files.is_empty());
    }
}
