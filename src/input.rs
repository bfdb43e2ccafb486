use bytes::Bytes;
use futures_util::stream::{Stream, TryStreamExt};
use std::fmt;
use std::io::{self, Read};
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

/// How a body's transport has to be driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Reads block the calling thread.
    Blocking,
    /// Reads suspend the calling task.
    Async,
}

impl Mode {
    pub(crate) fn api_name(self) -> &'static str {
        match self {
            Mode::Blocking => "blocking",
            Mode::Async => "async",
        }
    }
}

/// The transport a request body is read from.
pub enum Input {
    Blocking(Box<dyn Read + Send>),
    Async(Pin<Box<dyn AsyncRead + Send>>),
}

impl Input {
    pub fn blocking<R>(reader: R) -> Input
    where
        R: Read + Send + 'static,
    {
        Input::Blocking(Box::new(reader))
    }

    pub fn from_async<R>(reader: R) -> Input
    where
        R: AsyncRead + Send + 'static,
    {
        Input::Async(Box::pin(reader))
    }

    /// Wraps a stream of byte chunks, e.g. a server's body stream, as an async
    /// input.
    ///
    /// # Examples
    ///
    /// ```
    /// use bodyspool::{Input, Mode};
    /// use bytes::Bytes;
    /// use std::convert::Infallible;
    /// use futures_util::stream::once;
    ///
    /// let stream = once(async { Result::<Bytes, Infallible>::Ok(Bytes::from("a=1")) });
    /// assert_eq!(Input::from_stream(stream).mode(), Mode::Async);
    /// ```
    pub fn from_stream<S, O, E>(stream: S) -> Input
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let stream = stream
            .map_ok(|b| -> Bytes { b.into() })
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err));

        Input::from_async(StreamReader::new(stream))
    }

    /// An input with no bytes, for requests without a body.
    pub fn empty() -> Input {
        Input::blocking(io::empty())
    }

    pub fn mode(&self) -> Mode {
        match self {
            Input::Blocking(_) => Mode::Blocking,
            Input::Async(_) => Mode::Async,
        }
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Input").field(&self.mode()).finish()
    }
}
