use crate::constants;
use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem;
use std::io::{self, Read};

/// Carry-over buffer between physical reads of a multipart source.
pub(crate) struct StreamBuffer<R> {
    pub(crate) eof: bool,
    pub(crate) buf: BytesMut,
    source: R,
    read_size: usize,
}

pub(crate) enum DataChunk {
    /// Everything before the delimiter, minus the CRLF that precedes it. The
    /// delimiter itself has been consumed.
    Delimited(Bytes),
    /// Bytes that can't be part of a delimiter.
    Partial(Bytes),
    NeedMore,
}

impl<R: Read> StreamBuffer<R> {
    pub(crate) fn new(source: R, read_size: usize) -> Self {
        StreamBuffer {
            eof: false,
            buf: BytesMut::new(),
            source,
            read_size,
        }
    }

    /// Issues one read against the source and appends whatever it returned.
    pub(crate) fn fill(&mut self) -> io::Result<()> {
        if self.eof {
            return Ok(());
        }

        let start = self.buf.len();
        self.buf.resize(start + self.read_size, 0);

        loop {
            match self.source.read(&mut self.buf[start..]) {
                Ok(0) => {
                    self.buf.truncate(start);
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.buf.truncate(start + n);
                    return Ok(());
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.buf.truncate(start);
                    return Err(err);
                }
            }
        }
    }

    pub(crate) fn find(&self, pattern: &[u8]) -> Option<usize> {
        memmem::find(&self.buf, pattern)
    }

    pub(crate) fn read_data(&mut self, delimiter: &[u8], max_chunk: usize) -> DataChunk {
        if let Some(idx) = self.find(delimiter) {
            if idx > max_chunk + constants::CRLF.len() {
                return DataChunk::Partial(self.buf.split_to(max_chunk).freeze());
            }

            let mut data = self.buf.split_to(idx);
            self.buf.advance(delimiter.len());

            if data.ends_with(constants::CRLF.as_bytes()) {
                data.truncate(data.len() - constants::CRLF.len());
            }

            return DataChunk::Delimited(data.freeze());
        }

        // The tail could be a CRLF followed by the start of a delimiter that
        // the next read completes.
        let keep = if self.eof {
            0
        } else {
            delimiter.len() + constants::CRLF.len()
        };

        if self.buf.len() > keep {
            let size = std::cmp::min(max_chunk, self.buf.len() - keep);
            DataChunk::Partial(self.buf.split_to(size).freeze())
        } else {
            DataChunk::NeedMore
        }
    }
}
