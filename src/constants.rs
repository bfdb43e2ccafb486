use std::time::Duration;

pub(crate) const DEFAULT_WHOLE_BODY_SIZE_LIMIT: u64 = u64::MAX;
pub(crate) const DEFAULT_PER_PART_SIZE_LIMIT: u64 = u64::MAX;

/// Bodies and parts stay in memory up to this many bytes.
pub(crate) const DEFAULT_SPOOL_THRESHOLD: usize = 64 * 1024;
pub(crate) const DEFAULT_TOKENIZER_CHUNK_SIZE: usize = 64000;
pub(crate) const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;
pub(crate) const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;

pub(crate) const DEFAULT_UPLOAD_CHUNK_SIZE: u64 = 64 * 1024;
pub(crate) const DEFAULT_CLEANUP_THRESHOLD: Duration = Duration::from_secs(60 * 8);

/// RFC 2046 caps boundaries at 70 characters.
pub(crate) const MAX_BOUNDARY_LEN: usize = 70;

pub(crate) const MAX_HEADERS: usize = 32;
pub(crate) const BOUNDARY_EXT: &str = "--";
pub(crate) const CRLF: &str = "\r\n";
pub(crate) const CRLF_CRLF: &str = "\r\n\r\n";

pub(crate) const UPLOAD_ID_PARAM: &str = "uid";
pub(crate) const ERROR_META_KEY: &str = "error";
