use crate::constants;
use bytes::Bytes;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

enum Backing {
    Memory(Vec<u8>),
    Disk(File),
}

/// A byte sink and source that buffers in memory up to a threshold, then
/// moves its contents to an anonymous temporary file.
///
/// Writes always append; reads consume from an independent read cursor, so
/// a producer can keep appending while a consumer drains what is already
/// there. Both backings behave identically. The temporary file is unlinked at
/// creation and closed when the buffer is dropped.
///
/// # Examples
///
/// ```
/// use bodyspool::SpooledBuffer;
/// use std::io::{Read, Write};
///
/// # fn run() -> std::io::Result<()> {
/// let mut spool = SpooledBuffer::with_threshold(4);
/// spool.write_all(b"hello")?;
/// assert!(spool.is_spilled());
///
/// let mut out = String::new();
/// spool.read_to_string(&mut out)?;
/// assert_eq!(out, "hello");
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
pub struct SpooledBuffer {
    backing: Backing,
    threshold: usize,
    len: u64,
    read_pos: u64,
}

impl SpooledBuffer {
    pub fn new() -> SpooledBuffer {
        SpooledBuffer::with_threshold(constants::DEFAULT_SPOOL_THRESHOLD)
    }

    /// Creates a buffer that spills to disk once it holds more than
    /// `threshold` bytes.
    pub fn with_threshold(threshold: usize) -> SpooledBuffer {
        SpooledBuffer {
            backing: Backing::Memory(Vec::new()),
            threshold,
            len: 0,
            read_pos: 0,
        }
    }

    /// Total number of bytes written so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the contents live in a temporary file.
    pub fn is_spilled(&self) -> bool {
        matches!(self.backing, Backing::Disk(_))
    }

    /// Current position of the read cursor.
    pub fn position(&self) -> u64 {
        self.read_pos
    }

    /// Bytes written but not yet read.
    pub fn remaining(&self) -> u64 {
        self.len - self.read_pos
    }

    /// Moves the read cursor back to the start.
    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }

    /// Copies the whole contents out, leaving both cursors untouched.
    pub fn to_bytes(&self) -> io::Result<Bytes> {
        match &self.backing {
            Backing::Memory(buf) => Ok(Bytes::copy_from_slice(buf)),
            Backing::Disk(file) => {
                let mut file = file;
                let mut buf = Vec::with_capacity(self.len as usize);
                file.seek(SeekFrom::Start(0))?;
                file.take(self.len).read_to_end(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }

    fn spill(&mut self) -> io::Result<()> {
        if let Backing::Memory(buf) = &self.backing {
            let mut file = tempfile::tempfile()?;
            file.write_all(buf)?;
            log::trace!("spooled {} bytes to a temporary file", buf.len());
            self.backing = Backing::Disk(file);
        }
        Ok(())
    }
}

impl Default for SpooledBuffer {
    fn default() -> Self {
        SpooledBuffer::new()
    }
}

impl std::fmt::Debug for SpooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpooledBuffer")
            .field("spilled", &self.is_spilled())
            .field("len", &self.len)
            .field("read_pos", &self.read_pos)
            .finish()
    }
}

impl Write for SpooledBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        if !self.is_spilled() && self.len as usize + data.len() > self.threshold {
            self.spill()?;
        }

        match &mut self.backing {
            Backing::Memory(buf) => buf.extend_from_slice(data),
            Backing::Disk(file) => {
                file.seek(SeekFrom::End(0))?;
                file.write_all(data)?;
            }
        }

        self.len += data.len() as u64;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.backing {
            Backing::Memory(_) => Ok(()),
            Backing::Disk(file) => file.flush(),
        }
    }
}

impl Read for SpooledBuffer {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = std::cmp::min(out.len() as u64, self.remaining()) as usize;
        if n == 0 {
            return Ok(0);
        }

        let read = match &mut self.backing {
            Backing::Memory(buf) => {
                let start = self.read_pos as usize;
                out[..n].copy_from_slice(&buf[start..start + n]);
                n
            }
            Backing::Disk(file) => {
                file.seek(SeekFrom::Start(self.read_pos))?;
                file.read(&mut out[..n])?
            }
        };

        self.read_pos += read as u64;
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stays_in_memory_under_threshold() {
        let mut spool = SpooledBuffer::with_threshold(8);
        spool.write_all(b"12345678").unwrap();
        assert!(!spool.is_spilled());
        assert_eq!(spool.len(), 8);
    }

    #[test]
    fn test_spills_past_threshold_with_same_contents() {
        let mut spool = SpooledBuffer::with_threshold(8);
        spool.write_all(b"12345").unwrap();
        spool.write_all(b"6789").unwrap();
        assert!(spool.is_spilled());
        assert_eq!(spool.len(), 9);
        assert_eq!(spool.to_bytes().unwrap(), Bytes::from_static(b"123456789"));
    }

    #[test]
    fn test_cursors_are_independent() {
        let mut spool = SpooledBuffer::with_threshold(4);
        spool.write_all(b"abc").unwrap();

        let mut out = [0u8; 2];
        assert_eq!(spool.read(&mut out).unwrap(), 2);
        assert_eq!(&out, b"ab");

        // Crosses the threshold between two reads.
        spool.write_all(b"defg").unwrap();
        assert!(spool.is_spilled());

        let mut rest = Vec::new();
        spool.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"cdefg");
        assert_eq!(spool.remaining(), 0);

        spool.write_all(b"h").unwrap();
        assert_eq!(spool.read(&mut out).unwrap(), 1);
        assert_eq!(out[0], b'h');
    }

    #[test]
    fn test_rewind_and_to_bytes_keep_cursor() {
        let mut spool = SpooledBuffer::with_threshold(2);
        spool.write_all(b"hello").unwrap();

        let mut out = [0u8; 3];
        spool.read_exact(&mut out).unwrap();
        assert_eq!(spool.position(), 3);
        assert_eq!(spool.to_bytes().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(spool.position(), 3);

        spool.rewind();
        let mut all = String::new();
        spool.read_to_string(&mut all).unwrap();
        assert_eq!(all, "hello");
    }
}
