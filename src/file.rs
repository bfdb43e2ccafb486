use crate::helpers;
use crate::multipart::Part;
use crate::SpooledBuffer;
use bytes::Bytes;
use serde::de::DeserializeOwned;

/// An uploaded file, decoded from a multipart part that carried a
/// `filename`.
///
/// The payload stays in the part's [`SpooledBuffer`], so large uploads live
/// on disk rather than in memory.
#[derive(Debug)]
pub struct File {
    name: String,
    file_name: Option<String>,
    content_type: Option<mime::Mime>,
    data: SpooledBuffer,
}

impl File {
    pub(crate) fn from_part(part: Part) -> File {
        let name = part.name().unwrap_or_default().to_owned();
        let file_name = part.file_name().map(str::to_owned);
        let content_type = part.content_type();

        File {
            name,
            file_name,
            content_type,
            data: part.into_body(),
        }
    }

    /// The form field this file was submitted under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The client-side file name, falling back to `Content-Description`.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn content_type(&self) -> Option<&mime::Mime> {
        self.content_type.as_ref()
    }

    pub fn content_length(&self) -> u64 {
        self.data.len()
    }

    /// Whether the payload spilled to a temporary file.
    pub fn is_spilled(&self) -> bool {
        self.data.is_spilled()
    }

    /// Copies the payload into memory.
    pub fn bytes(&self) -> crate::Result<Bytes> {
        Ok(self.data.to_bytes()?)
    }

    /// Decodes the payload as text, using the charset of its `Content-Type`
    /// or UTF-8.
    pub fn text(&self) -> crate::Result<String> {
        self.text_with_charset("utf-8")
    }

    pub fn text_with_charset(&self, default_encoding: &str) -> crate::Result<String> {
        let encoding_name = self
            .content_type()
            .and_then(|mime| mime.get_param(mime::CHARSET))
            .map(|charset| charset.as_str())
            .unwrap_or(default_encoding);

        let encoding = helpers::encoding_for(Some(encoding_name)).unwrap_or(encoding_rs::UTF_8);

        Ok(helpers::decode_text(&self.bytes()?, encoding))
    }

    /// Deserializes the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> crate::Result<T> {
        serde_json::from_slice(&self.bytes()?).map_err(crate::Error::DecodeJson)
    }

    /// Gives up the file's metadata and returns the payload buffer, with its
    /// read cursor at the start.
    pub fn into_data(mut self) -> SpooledBuffer {
        self.data.rewind();
        self.data
    }
}
