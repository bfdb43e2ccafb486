use crate::SpooledBuffer;
use bytes::Bytes;
use std::io::Write;

/// The bytes of a request body received so far, with its declared size.
#[derive(Debug)]
pub struct RequestBody {
    content_type: Option<String>,
    declared: u64,
    read: u64,
    data: SpooledBuffer,
    decoded: bool,
}

impl RequestBody {
    pub(crate) fn new(content_type: Option<String>, declared: u64, spool_threshold: usize) -> RequestBody {
        RequestBody {
            content_type,
            declared,
            read: 0,
            data: SpooledBuffer::with_threshold(spool_threshold),
            decoded: false,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The `Content-Length` the client announced.
    pub fn declared_length(&self) -> u64 {
        self.declared
    }

    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn remaining(&self) -> u64 {
        self.declared - self.read
    }

    pub fn is_complete(&self) -> bool {
        self.read == self.declared
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded
    }

    /// Load progress as a percentage, or in bytes when `in_bytes` is set.
    ///
    /// The percentage rounds down, so it only reaches 100 once the body is
    /// complete. An empty body is complete from the start.
    pub fn progress(&self, in_bytes: bool) -> u64 {
        if in_bytes {
            self.read
        } else if self.declared == 0 {
            100
        } else {
            (u128::from(self.read) * 100 / u128::from(self.declared)) as u64
        }
    }

    /// The raw bytes received so far.
    pub fn bytes(&self) -> crate::Result<Bytes> {
        Ok(self.data.to_bytes()?)
    }

    pub fn data(&self) -> &SpooledBuffer {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut SpooledBuffer {
        &mut self.data
    }

    pub(crate) fn append(&mut self, chunk: &[u8]) -> crate::Result<()> {
        debug_assert!(chunk.len() as u64 <= self.remaining());
        self.data.write_all(chunk)?;
        self.read += chunk.len() as u64;
        Ok(())
    }

    pub(crate) fn mark_decoded(&mut self) {
        self.decoded = true;
        self.data.rewind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress() {
        let mut body = RequestBody::new(None, 1000, 64);
        assert_eq!(body.progress(false), 0);

        body.append(&[0; 999]).unwrap();
        assert_eq!(body.progress(false), 99);
        assert_eq!(body.progress(true), 999);
        assert!(!body.is_complete());
        assert!(body.data().is_spilled());

        body.append(&[0; 1]).unwrap();
        assert_eq!(body.progress(false), 100);
        assert!(body.is_complete());
    }

    #[test]
    fn test_empty_body_is_complete() {
        let body = RequestBody::new(None, 0, 64);
        assert!(body.is_complete());
        assert_eq!(body.progress(false), 100);
    }
}
