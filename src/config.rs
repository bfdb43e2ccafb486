use crate::constants;
use std::collections::HashMap;

/// Represents size limits of a request body to keep a client from filling
/// memory or disk.
///
/// Please refer [`Config`] for more info.
#[derive(Debug, Clone)]
pub struct SizeLimit {
    pub(crate) whole_body: u64,
    pub(crate) per_part: u64,
    pub(crate) part_map: HashMap<String, u64>,
}

impl SizeLimit {
    /// Creates a default size limit which is [`u64::MAX`] for the whole body
    /// and for each part.
    pub fn new() -> SizeLimit {
        SizeLimit::default()
    }

    /// Sets size limit for the whole body. Checked against the declared
    /// `Content-Length` before anything is read.
    pub fn whole_body(mut self, limit: u64) -> SizeLimit {
        self.whole_body = limit;
        self
    }

    /// Sets size limit for each multipart part.
    pub fn per_part(mut self, limit: u64) -> SizeLimit {
        self.per_part = limit;
        self
    }

    /// Sets size limit for a specific part, it overrides the `per_part` value
    /// for this part.
    pub fn for_part<N: Into<String>>(mut self, part_name: N, limit: u64) -> SizeLimit {
        self.part_map.insert(part_name.into(), limit);
        self
    }

    pub(crate) fn extract_size_limit_for(&self, part: Option<&str>) -> u64 {
        part.and_then(|part| self.part_map.get(part))
            .copied()
            .unwrap_or(self.per_part)
    }
}

impl Default for SizeLimit {
    fn default() -> Self {
        SizeLimit {
            whole_body: constants::DEFAULT_WHOLE_BODY_SIZE_LIMIT,
            per_part: constants::DEFAULT_PER_PART_SIZE_LIMIT,
            part_map: HashMap::default(),
        }
    }
}

/// Tuning knobs for loading and decoding a request body.
///
/// # Examples
///
/// ```
/// use bodyspool::{Config, SizeLimit};
///
/// let config = Config::new()
///     .spool_threshold(16 * 1024)
///     .size_limit(SizeLimit::new().whole_body(10 * 1024 * 1024).for_part("avatar", 1024 * 1024));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) spool_threshold: usize,
    pub(crate) read_chunk_size: usize,
    pub(crate) tokenizer_chunk_size: usize,
    pub(crate) max_header_bytes: usize,
    pub(crate) size_limit: SizeLimit,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Bytes kept in memory before a body or part spills to a temporary file.
    pub fn spool_threshold(mut self, bytes: usize) -> Config {
        self.spool_threshold = bytes;
        self
    }

    /// Largest single read issued against the transport.
    pub fn read_chunk_size(mut self, bytes: usize) -> Config {
        self.read_chunk_size = bytes.max(1);
        self
    }

    /// Largest `Data` event the multipart tokenizer emits.
    pub fn tokenizer_chunk_size(mut self, bytes: usize) -> Config {
        self.tokenizer_chunk_size = bytes.max(1);
        self
    }

    /// Largest header block accepted for a single multipart part.
    pub fn max_header_bytes(mut self, bytes: usize) -> Config {
        self.max_header_bytes = bytes;
        self
    }

    pub fn size_limit(mut self, size_limit: SizeLimit) -> Config {
        self.size_limit = size_limit;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            spool_threshold: constants::DEFAULT_SPOOL_THRESHOLD,
            read_chunk_size: constants::DEFAULT_READ_CHUNK_SIZE,
            tokenizer_chunk_size: constants::DEFAULT_TOKENIZER_CHUNK_SIZE,
            max_header_bytes: constants::DEFAULT_MAX_HEADER_BYTES,
            size_limit: SizeLimit::default(),
        }
    }
}
