use crate::input::{Input, Mode};
use crate::state::LoadState;
use crate::{multipart, urlencoded, Config, File, Params, RequestBody};
use bytes::Bytes;
use http::header::{self, HeaderMap};
use std::io::{self, Read};
use tokio::io::AsyncReadExt;

/// What [`BodyLoader::decode`] made of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The body was a form, multipart or JSON document and produced
    /// parameters and files.
    Parsed,
    /// The content type has no decoder; only the raw bytes are available.
    Raw,
    /// Decoding stopped with an error. Multipart parts decoded before the
    /// error are kept.
    Failed { reason: String },
}

/// Parameters and files decoded from a body.
#[derive(Debug, Default)]
pub struct FormData {
    pub(crate) params: Params,
    pub(crate) files: Vec<(String, File)>,
}

impl FormData {
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Uploaded files in arrival order, with the field they were sent under.
    pub fn files(&self) -> &[(String, File)] {
        &self.files
    }

    pub fn file(&self, name: &str) -> Option<&File> {
        self.files.iter().find(|(n, _)| n == name).map(|(_, file)| file)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.files.is_empty()
    }

    pub fn into_parts(self) -> (Params, Vec<(String, File)>) {
        (self.params, self.files)
    }
}

/// Reads a request body incrementally into a [`SpooledBuffer`] and decodes it
/// once complete.
///
/// `load` and `load_async` never read past the declared `Content-Length`.
/// Each input only supports the scheduling mode it was built for; driving it
/// the other way fails with [`Error::WrongMode`] before anything is read.
///
/// # Examples
///
/// ```
/// use bodyspool::{BodyLoader, Input};
///
/// # fn run() -> bodyspool::Result<()> {
/// let body = "a=1&b=2&b=3";
/// let mut loader = BodyLoader::new(
///     Input::blocking(body.as_bytes()),
///     Some("application/x-www-form-urlencoded"),
///     body.len() as u64,
/// );
///
/// assert_eq!(loader.load(Some(4))?, 4);
/// assert_eq!(loader.progress(false), 36);
/// loader.load(None)?;
/// loader.decode()?;
///
/// assert_eq!(loader.form().params().text("a"), Some("1"));
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
///
/// [`SpooledBuffer`]: crate::SpooledBuffer
/// [`Error::WrongMode`]: crate::Error::WrongMode
#[derive(Debug)]
pub struct BodyLoader {
    input: Option<Input>,
    body: RequestBody,
    state: LoadState,
    outcome: Option<DecodeOutcome>,
    form: FormData,
    config: Config,
}

impl BodyLoader {
    pub fn new(input: Input, content_type: Option<&str>, content_length: u64) -> BodyLoader {
        BodyLoader::with_config(input, content_type, content_length, Config::default())
    }

    pub fn with_config(input: Input, content_type: Option<&str>, content_length: u64, config: Config) -> BodyLoader {
        let body = RequestBody::new(content_type.map(str::to_owned), content_length, config.spool_threshold);

        BodyLoader {
            input: Some(input),
            body,
            state: LoadState::New,
            outcome: None,
            form: FormData::default(),
            config,
        }
    }

    /// Takes the content type and length from request headers. A missing or
    /// unparsable `Content-Length` counts as zero.
    pub fn from_headers(input: Input, headers: &HeaderMap, config: Config) -> BodyLoader {
        let content_type = headers.get(header::CONTENT_TYPE).and_then(|val| val.to_str().ok());

        let content_length = match headers.get(header::CONTENT_LENGTH) {
            Some(val) => val.to_str().ok().and_then(|val| val.trim().parse().ok()).unwrap_or_else(|| {
                log::warn!("ignoring unparsable Content-Length {:?}", val);
                0
            }),
            None => 0,
        };

        BodyLoader::with_config(input, content_type, content_length, config)
    }

    /// A loader whose body is already fully received.
    pub fn complete<B: Into<Bytes>>(data: B, content_type: Option<&str>, config: Config) -> crate::Result<BodyLoader> {
        let data = data.into();
        let mut loader = BodyLoader::with_config(Input::empty(), content_type, data.len() as u64, config);

        loader.body.append(&data)?;
        loader.state = LoadState::Loaded;
        loader.input = None;

        Ok(loader)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// The scheduling mode of the input, or `None` once it's released.
    pub fn mode(&self) -> Option<Mode> {
        self.input.as_ref().map(Input::mode)
    }

    pub fn is_complete(&self) -> bool {
        self.body.is_complete()
    }

    pub fn is_decoded(&self) -> bool {
        self.state == LoadState::Decoded
    }

    /// See [`RequestBody::progress`].
    pub fn progress(&self, in_bytes: bool) -> u64 {
        self.body.progress(in_bytes)
    }

    /// The result of the last [`decode`](Self::decode), if it ran.
    pub fn outcome(&self) -> Option<&DecodeOutcome> {
        self.outcome.as_ref()
    }

    pub fn form(&self) -> &FormData {
        &self.form
    }

    /// Hands the decoded parameters and files over, leaving the loader
    /// empty.
    pub fn take_form(&mut self) -> FormData {
        std::mem::take(&mut self.form)
    }

    /// Number of bytes the next load may read, or `None` if there's nothing
    /// to read.
    fn prepare(&mut self, size: Option<u64>) -> crate::Result<Option<u64>> {
        if self.body.is_complete() {
            return Ok(None);
        }

        let limit = self.config.size_limit.whole_body;
        if self.body.declared_length() > limit {
            return Err(crate::Error::StreamSizeExceeded { limit });
        }

        let remaining = self.body.remaining();
        let to_read = size.map_or(remaining, |size| size.min(remaining));
        if to_read == 0 {
            return Ok(None);
        }

        self.state = LoadState::Loading;
        Ok(Some(to_read))
    }

    fn truncated(&self) -> crate::Error {
        crate::Error::TruncatedBody {
            expected: self.body.declared_length(),
            received: self.body.bytes_read(),
        }
    }

    fn finish_load(&mut self, read: u64) -> u64 {
        log::trace!(
            "loaded {} bytes, {}/{} of request body",
            read,
            self.body.bytes_read(),
            self.body.declared_length()
        );

        if self.body.is_complete() {
            log::debug!("request body of {} bytes loaded", self.body.declared_length());
            self.state = LoadState::Loaded;
        }

        read
    }

    /// Reads up to `size` more bytes (everything remaining when `None`) from
    /// a blocking input and returns how many were read.
    pub fn load(&mut self, size: Option<u64>) -> crate::Result<u64> {
        if let Some(Input::Async(_)) = self.input {
            return Err(crate::Error::WrongMode {
                expected: Mode::Async.api_name(),
            });
        }

        let to_read = match self.prepare(size)? {
            Some(to_read) => to_read,
            None => return Ok(0),
        };

        let reader = match self.input.as_mut() {
            Some(Input::Blocking(reader)) => reader,
            _ => return Err(self.truncated()),
        };

        let mut chunk = vec![0u8; to_read.min(self.config.read_chunk_size as u64) as usize];
        let mut read = 0;

        while read < to_read {
            let want = (to_read - read).min(chunk.len() as u64) as usize;

            let n = match reader.read(&mut chunk[..want]) {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(crate::Error::StreamReadFailed(err.into())),
            };

            if n == 0 {
                return Err(self.truncated());
            }

            self.body.append(&chunk[..n])?;
            read += n as u64;
        }

        Ok(self.finish_load(read))
    }

    /// Async counterpart of [`load`](Self::load). The only suspension point
    /// is the read from the input.
    pub async fn load_async(&mut self, size: Option<u64>) -> crate::Result<u64> {
        if let Some(Input::Blocking(_)) = self.input {
            return Err(crate::Error::WrongMode {
                expected: Mode::Blocking.api_name(),
            });
        }

        let to_read = match self.prepare(size)? {
            Some(to_read) => to_read,
            None => return Ok(0),
        };

        let reader = match self.input.as_mut() {
            Some(Input::Async(reader)) => reader,
            _ => return Err(self.truncated()),
        };

        let mut chunk = vec![0u8; to_read.min(self.config.read_chunk_size as u64) as usize];
        let mut read = 0;

        while read < to_read {
            let want = (to_read - read).min(chunk.len() as u64) as usize;

            let n = match reader.read(&mut chunk[..want]).await {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(crate::Error::StreamReadFailed(err.into())),
            };

            if n == 0 {
                return Err(self.truncated());
            }

            self.body.append(&chunk[..n])?;
            read += n as u64;
        }

        Ok(self.finish_load(read))
    }

    /// Decodes the loaded body according to its content type. Calling it
    /// again is a no-op.
    ///
    /// The input is released afterwards whether decoding succeeded or not;
    /// the raw bytes stay available through [`body`](Self::body).
    pub fn decode(&mut self) -> crate::Result<()> {
        if self.state == LoadState::Decoded {
            return Ok(());
        }

        if !self.body.is_complete() {
            return Err(crate::Error::BodyNotLoaded {
                declared: self.body.declared_length(),
                read: self.body.bytes_read(),
            });
        }

        self.state = LoadState::Decoding;
        let result = self.decode_body();

        self.state = LoadState::Decoded;
        self.input = None;
        self.body.mark_decoded();

        match result {
            Ok(outcome) => {
                log::debug!("request body decoded: {:?}", outcome);
                self.outcome = Some(outcome);
                Ok(())
            }
            Err(err) => {
                log::warn!("failed to decode request body: {}", err);
                self.outcome = Some(DecodeOutcome::Failed {
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn decode_body(&mut self) -> crate::Result<DecodeOutcome> {
        let content_type = match self.body.content_type() {
            Some(content_type) => content_type,
            None => return Ok(DecodeOutcome::Raw),
        };

        let mime = match content_type.parse::<mime::Mime>() {
            Ok(mime) => mime,
            Err(err) => {
                log::warn!("leaving body with Content-Type {:?} undecoded: {}", content_type, err);
                return Ok(DecodeOutcome::Raw);
            }
        };

        self.body.data_mut().rewind();

        if mime.type_() == mime::MULTIPART {
            let boundary = crate::boundary_from_mime(&mime)?;
            multipart::decode_into(self.body.data_mut(), &boundary, &self.config, &mut self.form)?;
        } else if mime.type_() == mime::APPLICATION && mime.subtype() == mime::WWW_FORM_URLENCODED {
            let charset = mime.get_param(mime::CHARSET).map(|charset| charset.to_string());
            let params = urlencoded::decode(&self.body.bytes()?, charset.as_deref())?;
            self.form.params.extend(params);
        } else if mime.type_() == mime::APPLICATION && (mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON)) {
            let document: serde_json::Value =
                serde_json::from_reader(self.body.data_mut()).map_err(crate::Error::DecodeJson)?;

            match document {
                serde_json::Value::Object(members) => {
                    for (name, value) in members {
                        self.form.params.add(name, value);
                    }
                }
                other => self.form.params.add("", other),
            }
        } else {
            return Ok(DecodeOutcome::Raw);
        }

        Ok(DecodeOutcome::Parsed)
    }
}
