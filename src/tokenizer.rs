use crate::buffer::{DataChunk, StreamBuffer};
use crate::state::ScanStage;
use crate::{constants, helpers, Config};
use bytes::{Buf, Bytes};
use http::header::HeaderMap;
use std::io::Read;

/// A low-level multipart token.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A delimiter line was found.
    Boundary,
    /// The header block that follows a delimiter. Empty when the block is
    /// missing, oversized or unparsable.
    Headers(HeaderMap),
    /// Part payload. A single part's payload may arrive as several events.
    Data(Bytes),
}

/// Splits a multipart byte stream into [`Event`]s.
///
/// The tokenizer never reports delimiter bytes as [`Event::Data`]: when a
/// read ends in the middle of a delimiter, the tail is carried over to the
/// next read. It stops at the closing delimiter (`--boundary--`) or when the
/// source is exhausted.
///
/// # Examples
///
/// ```
/// use bodyspool::{Event, Tokenizer};
///
/// let data = "--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nabcd\r\n--X--\r\n";
/// let events: Vec<Event> = Tokenizer::new(data.as_bytes(), "X")
///     .collect::<bodyspool::Result<_>>()
///     .unwrap();
///
/// assert_eq!(events.len(), 4);
/// assert_eq!(events[2], Event::Data("abcd".into()));
/// assert_eq!(events[3], Event::Boundary);
/// ```
pub struct Tokenizer<R> {
    buffer: StreamBuffer<R>,
    delimiter: Vec<u8>,
    stage: ScanStage,
    pending_boundary: bool,
    chunk_size: usize,
    max_header_bytes: usize,
}

impl<R: Read> Tokenizer<R> {
    pub fn new<B: AsRef<str>>(source: R, boundary: B) -> Tokenizer<R> {
        Tokenizer::with_config(source, boundary, &Config::default())
    }

    pub fn with_config<B: AsRef<str>>(source: R, boundary: B, config: &Config) -> Tokenizer<R> {
        let delimiter = format!("{}{}", constants::BOUNDARY_EXT, boundary.as_ref()).into_bytes();
        let read_size = config.tokenizer_chunk_size + delimiter.len();

        Tokenizer {
            buffer: StreamBuffer::new(source, read_size),
            delimiter,
            stage: ScanStage::FindingBoundary,
            pending_boundary: false,
            chunk_size: config.tokenizer_chunk_size,
            max_header_bytes: config.max_header_bytes,
        }
    }

    fn next_event(&mut self) -> crate::Result<Option<Event>> {
        if self.pending_boundary {
            self.pending_boundary = false;
            return Ok(Some(Event::Boundary));
        }

        loop {
            match self.stage {
                ScanStage::Eof => return Ok(None),
                ScanStage::FindingBoundary => match self.buffer.read_data(&self.delimiter, self.chunk_size) {
                    DataChunk::Delimited(data) => {
                        self.stage = ScanStage::ReadingPartHeaders;

                        if data.is_empty() {
                            return Ok(Some(Event::Boundary));
                        }

                        self.pending_boundary = true;
                        return Ok(Some(Event::Data(data)));
                    }
                    DataChunk::Partial(data) => return Ok(Some(Event::Data(data))),
                    DataChunk::NeedMore if self.buffer.eof => {
                        self.stage = ScanStage::Eof;
                        return Ok(None);
                    }
                    DataChunk::NeedMore => self.buffer.fill()?,
                },
                ScanStage::ReadingPartHeaders => {
                    let buf = &self.buffer.buf;

                    if buf.len() < constants::BOUNDARY_EXT.len() && !self.buffer.eof {
                        self.buffer.fill()?;
                        continue;
                    }

                    if buf.starts_with(constants::BOUNDARY_EXT.as_bytes()) {
                        log::debug!("closing multipart delimiter reached");
                        self.stage = ScanStage::Eof;
                        return Ok(None);
                    }

                    if let Some(idx) = self.buffer.find(constants::CRLF_CRLF.as_bytes()) {
                        self.stage = ScanStage::FindingBoundary;

                        // A header block can't span a delimiter; leave the
                        // bytes for the data scan so the part gets dropped.
                        if memchr::memmem::find(&buf[..idx], &self.delimiter).is_some() {
                            log::warn!("multipart part has no header block");
                            return Ok(Some(Event::Headers(HeaderMap::new())));
                        }

                        let block = self.buffer.buf.split_to(idx + constants::CRLF_CRLF.len());
                        if block.len() > self.max_header_bytes {
                            log::warn!("skipping multipart header block of {} bytes", block.len());
                            return Ok(Some(Event::Headers(HeaderMap::new())));
                        }

                        return Ok(Some(Event::Headers(parse_headers(&block))));
                    }

                    if self.buffer.eof || buf.len() > self.max_header_bytes {
                        log::warn!("incomplete multipart header block of {} bytes", buf.len());
                        self.stage = ScanStage::FindingBoundary;
                        return Ok(Some(Event::Headers(HeaderMap::new())));
                    }

                    self.buffer.fill()?;
                }
            }
        }
    }
}

impl<R: Read> Iterator for Tokenizer<R> {
    type Item = crate::Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(event) => event.map(Ok),
            Err(err) => {
                self.stage = ScanStage::Eof;
                self.pending_boundary = false;
                Some(Err(err))
            }
        }
    }
}

/// Parses the bytes between a delimiter and the blank line after it.
fn parse_headers(block: &[u8]) -> HeaderMap {
    let mut block = block;

    // Transport padding: whitespace up to the end of the delimiter line.
    while let Some(&b) = block.first() {
        if b == b' ' || b == b'\t' {
            block.advance(1);
        } else {
            break;
        }
    }
    if block.starts_with(constants::CRLF.as_bytes()) {
        block.advance(constants::CRLF.len());
    }

    let mut headers = [httparse::EMPTY_HEADER; constants::MAX_HEADERS];

    match httparse::parse_headers(block, &mut headers) {
        Ok(httparse::Status::Complete((_, raw_headers))) => helpers::convert_raw_headers_to_header_map(raw_headers),
        Ok(httparse::Status::Partial) => {
            log::warn!("multipart header block is incomplete");
            HeaderMap::new()
        }
        Err(err) => {
            log::warn!("failed to read multipart headers: {}", err);
            HeaderMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// Hands out at most `step` bytes per read.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    /// Merges consecutive `Data` events so differently chunked runs compare
    /// equal.
    fn coalesce<I: Iterator<Item = crate::Result<Event>>>(events: I) -> Vec<Event> {
        let mut out: Vec<Event> = Vec::new();
        for event in events {
            let event = event.unwrap();
            if let (Some(Event::Data(prev)), Event::Data(next)) = (out.last_mut(), &event) {
                let mut joined = prev.to_vec();
                joined.extend_from_slice(next);
                *prev = Bytes::from(joined);
                continue;
            }
            out.push(event);
        }
        out
    }

    const BODY: &str = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"My Field\"\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"File Field\"; filename=\"a-text-file.txt\"\r\nContent-Type: text/plain\r\n\r\nHello world\nHello\r\nWorld\rAgain\r\n--X-BOUNDARY--\r\n";

    #[test]
    fn test_events() {
        let events = coalesce(Tokenizer::new(BODY.as_bytes(), "X-BOUNDARY"));

        assert_eq!(events.len(), 7);
        assert_eq!(events[0], Event::Boundary);
        match &events[1] {
            Event::Headers(headers) => assert_eq!(
                headers.get("content-disposition").unwrap(),
                "form-data; name=\"My Field\""
            ),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(events[2], Event::Data(Bytes::from_static(b"abcd")));
        assert_eq!(events[3], Event::Boundary);
        match &events[4] {
            Event::Headers(headers) => assert_eq!(headers.get("content-type").unwrap(), "text/plain"),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            events[5],
            Event::Data(Bytes::from_static(b"Hello world\nHello\r\nWorld\rAgain"))
        );
        assert_eq!(events[6], Event::Boundary);
    }

    #[test]
    fn test_boundary_split_across_reads() {
        let whole = coalesce(Tokenizer::new(BODY.as_bytes(), "X-BOUNDARY"));

        for step in 1..16 {
            let source = Trickle {
                data: BODY.as_bytes(),
                step,
            };
            assert_eq!(coalesce(Tokenizer::new(source, "X-BOUNDARY")), whole, "step {}", step);
        }
    }

    #[test]
    fn test_small_chunks_never_leak_delimiter() {
        let config = Config::new().tokenizer_chunk_size(3);
        for event in Tokenizer::with_config(BODY.as_bytes(), "X-BOUNDARY", &config) {
            if let Event::Data(data) = event.unwrap() {
                assert!(data.len() <= 3);
                assert!(memchr::memmem::find(&data, b"X-BOUNDARY").is_none());
            }
        }
    }

    #[test]
    fn test_empty_part_has_no_data_event() {
        let data = "--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n\r\n--X--";
        let events = coalesce(Tokenizer::new(data.as_bytes(), "X"));
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], Event::Boundary);
        assert!(matches!(events[1], Event::Headers(_)));
        assert_eq!(events[2], Event::Boundary);
    }

    #[test]
    fn test_headers_on_exhausted_stream_are_empty() {
        let events = coalesce(Tokenizer::new(&b"--X\r\nContent-Disp"[..], "X"));
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], Event::Headers(HeaderMap::new()));
        assert_eq!(events[2], Event::Data(Bytes::from_static(b"\r\nContent-Disp")));
    }

    #[test]
    fn test_oversized_header_block_is_empty() {
        let data = "--X\r\nContent-Disposition: form-data; name=\"a-rather-long-field-name\"\r\n\r\nabc\r\n--X--";
        let config = Config::new().max_header_bytes(16);
        let events = coalesce(Tokenizer::with_config(data.as_bytes(), "X", &config));

        assert_eq!(
            events,
            vec![
                Event::Boundary,
                Event::Headers(HeaderMap::new()),
                Event::Data(Bytes::from_static(b"abc")),
                Event::Boundary,
            ]
        );
    }

    #[test]
    fn test_preamble_is_data() {
        let events = coalesce(Tokenizer::new(&b"preamble\r\n--X--"[..], "X"));
        assert_eq!(
            events,
            vec![Event::Data(Bytes::from_static(b"preamble")), Event::Boundary]
        );
    }

    #[test]
    fn test_read_error_ends_stream() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }

        let mut tokenizer = Tokenizer::new(Broken, "X");
        assert!(matches!(tokenizer.next(), Some(Err(crate::Error::Io(_)))));
        assert!(tokenizer.next().is_none());
    }
}
