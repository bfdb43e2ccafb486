use crate::input::Input;
use crate::loader::BodyLoader;
use crate::{urlencoded, Config, File, Param, Params, RequestBody};
use bytes::Bytes;
use futures_util::stream::Stream;
use http::request::Parts;
use http::{HeaderMap, Method, Uri};
use std::io::Read;
use tokio::io::AsyncRead;

/// An incoming request as seen by a handler: the head, the parameters decoded
/// so far and the loader for its body.
///
/// Query-string parameters are available straight away. Body parameters and
/// files are merged in once the body is loaded and decoded.
///
/// # Examples
///
/// ```
/// use bodyspool::Request;
///
/// # fn run() -> bodyspool::Result<()> {
/// let req = http::Request::post("/submit?page=2")
///     .header("content-type", "application/x-www-form-urlencoded")
///     .header("content-length", "11")
///     .body(&b"a=1&b=2&b=3"[..])
///     .unwrap();
///
/// let mut req = Request::from_blocking(req);
/// assert_eq!(req.text("page"), Some("2"));
///
/// req.load(None, true)?;
/// assert_eq!(req.text("a"), Some("1"));
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
#[derive(Debug)]
pub struct Request {
    head: Parts,
    params: Params,
    files: Vec<(String, File)>,
    loader: BodyLoader,
}

impl Request {
    pub fn new(head: Parts, input: Input) -> Request {
        Request::with_config(head, input, Config::default())
    }

    pub fn with_config(head: Parts, input: Input, config: Config) -> Request {
        let params = head.uri.query().map(urlencoded::parse_query).unwrap_or_default();
        let loader = BodyLoader::from_headers(input, &head.headers, config);

        Request {
            head,
            params,
            files: Vec::new(),
            loader,
        }
    }

    /// A request whose body is read with blocking I/O.
    pub fn from_blocking<R>(req: http::Request<R>) -> Request
    where
        R: Read + Send + 'static,
    {
        let (head, body) = req.into_parts();
        Request::new(head, Input::blocking(body))
    }

    /// A request whose body is an [`AsyncRead`].
    pub fn from_async<A>(req: http::Request<A>) -> Request
    where
        A: AsyncRead + Send + 'static,
    {
        let (head, body) = req.into_parts();
        Request::new(head, Input::from_async(body))
    }

    /// A request whose body is a stream of byte chunks.
    pub fn from_stream<S, O, E>(req: http::Request<S>) -> Request
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let (head, body) = req.into_parts();
        Request::new(head, Input::from_stream(body))
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.loader.body().content_type()
    }

    pub fn content_length(&self) -> u64 {
        self.loader.body().declared_length()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.get(name)
    }

    /// The first value of `name` as text.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.params.text(name)
    }

    pub fn files(&self) -> &[(String, File)] {
        &self.files
    }

    pub fn file(&self, name: &str) -> Option<&File> {
        self.files.iter().find(|(n, _)| n == name).map(|(_, file)| file)
    }

    pub fn loader(&self) -> &BodyLoader {
        &self.loader
    }

    pub fn body(&self) -> &RequestBody {
        self.loader.body()
    }

    /// The raw body received so far.
    pub fn data(&self) -> crate::Result<Bytes> {
        self.loader.body().bytes()
    }

    pub fn is_loaded(&self) -> bool {
        self.loader.is_complete()
    }

    pub fn is_decoded(&self) -> bool {
        self.loader.is_decoded()
    }

    pub fn load_progress(&self, in_bytes: bool) -> u64 {
        self.loader.progress(in_bytes)
    }

    /// Loads up to `size` more bytes of the body and, with `decode` set,
    /// decodes it once complete.
    pub fn load(&mut self, size: Option<u64>, decode: bool) -> crate::Result<u64> {
        let read = self.loader.load(size)?;

        if decode && self.loader.is_complete() {
            self.decode()?;
        }

        Ok(read)
    }

    pub async fn load_async(&mut self, size: Option<u64>, decode: bool) -> crate::Result<u64> {
        let read = self.loader.load_async(size).await?;

        if decode && self.loader.is_complete() {
            self.decode()?;
        }

        Ok(read)
    }

    /// Replaces the body with `data`, already received in full. The
    /// `Content-Type` header still picks the decoder; parameters merged from
    /// an earlier decode stay.
    pub fn set_data<B: Into<Bytes>>(&mut self, data: B) -> crate::Result<()> {
        let content_type = self.content_type().map(str::to_owned);
        let config = self.loader.config().clone();

        self.loader = BodyLoader::complete(data, content_type.as_deref(), config)?;
        Ok(())
    }

    /// Decodes the loaded body and merges its parameters and files into the
    /// request. Whatever was decoded before an error is merged too.
    pub fn decode(&mut self) -> crate::Result<()> {
        let result = self.loader.decode();

        let (params, files) = self.loader.take_form().into_parts();
        self.params.extend(params);
        self.files.extend(files);

        result
    }
}
