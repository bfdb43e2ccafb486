use crate::constants;
use crate::RequestBody;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display};
use std::time::{Duration, Instant, SystemTime};

/// Where an upload is in its lifecycle.
///
/// `New → Started → InProgress (repeated) → Decoding → Completed`, with any
/// failure going to `Failed`. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    New,
    Started,
    InProgress,
    Decoding,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }
}

/// A snapshot of an upload, suitable for a progress view.
///
/// Serializes with the field names as written and snake_case statuses, for
/// example `{"id": "u1", "status": "in_progress", "progress": 40, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadInfo {
    pub id: String,
    pub status: UploadStatus,
    pub bytes_read: u64,
    /// Bytes read by the most recent chunk.
    pub last_bytes_read: u64,
    /// Percentage of the declared body received.
    pub progress: u64,
    pub created: SystemTime,
    pub updated: SystemTime,
    pub meta: BTreeMap<String, String>,
}

impl UploadInfo {
    pub(crate) fn new(id: String) -> UploadInfo {
        let now = SystemTime::now();

        UploadInfo {
            id,
            status: UploadStatus::New,
            bytes_read: 0,
            last_bytes_read: 0,
            progress: 0,
            created: now,
            updated: now,
            meta: BTreeMap::new(),
        }
    }
}

type Callback = Box<dyn FnMut(&UploadInfo) + Send>;

/// The tracked record of one upload, with the callbacks to run on status
/// changes.
pub struct Upload {
    info: UploadInfo,
    touched: Instant,
    callbacks: HashMap<UploadStatus, Vec<Callback>>,
}

impl Upload {
    pub fn new<I: Into<String>>(id: I) -> Upload {
        Upload {
            info: UploadInfo::new(id.into()),
            touched: Instant::now(),
            callbacks: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn status(&self) -> UploadStatus {
        self.info.status
    }

    pub fn info(&self) -> &UploadInfo {
        &self.info
    }

    /// Runs `callback` every time the upload enters `status`.
    pub fn on_status<F>(&mut self, status: UploadStatus, callback: F) -> &mut Upload
    where
        F: FnMut(&UploadInfo) + Send + 'static,
    {
        self.callbacks.entry(status).or_default().push(Box::new(callback));
        self
    }

    pub fn on_completed<F>(&mut self, callback: F) -> &mut Upload
    where
        F: FnMut(&UploadInfo) + Send + 'static,
    {
        self.on_status(UploadStatus::Completed, callback)
    }

    pub fn on_failed<F>(&mut self, callback: F) -> &mut Upload
    where
        F: FnMut(&UploadInfo) + Send + 'static,
    {
        self.on_status(UploadStatus::Failed, callback)
    }

    /// Runs `callback` after every chunk that is loaded.
    pub fn on_progress<F>(&mut self, callback: F) -> &mut Upload
    where
        F: FnMut(&UploadInfo) + Send + 'static,
    {
        self.on_status(UploadStatus::InProgress, callback)
    }

    /// Moves the upload to `status` and runs its callbacks. Nothing leaves a
    /// terminal status.
    pub(crate) fn set_status(&mut self, status: UploadStatus) {
        if self.info.status.is_terminal() {
            log::debug!(
                "upload {:?} is {:?}, ignoring move to {:?}",
                self.info.id,
                self.info.status,
                status
            );
            return;
        }

        if self.info.status != status {
            log::debug!("upload {:?}: {:?} -> {:?}", self.info.id, self.info.status, status);
        }

        self.info.status = status;
        self.touch();

        if let Some(callbacks) = self.callbacks.get_mut(&status) {
            for callback in callbacks.iter_mut() {
                callback(&self.info);
            }
        }
    }

    pub(crate) fn record_progress(&mut self, body: &RequestBody) {
        let bytes_read = body.bytes_read();

        self.info.last_bytes_read = bytes_read.saturating_sub(self.info.bytes_read);
        self.info.bytes_read = bytes_read;
        self.info.progress = body.progress(false);
        self.touch();
    }

    /// Marks the upload failed, keeping `error` under `meta["error"]`.
    pub fn fail<E: Display>(&mut self, error: E) {
        if self.info.status.is_terminal() {
            return;
        }

        let message = error.to_string();
        log::warn!("upload {:?} failed: {}", self.info.id, message);

        self.info.meta.insert(constants::ERROR_META_KEY.to_owned(), message);
        self.set_status(UploadStatus::Failed);
    }

    pub(crate) fn is_idle(&self, threshold: Duration) -> bool {
        self.touched.elapsed() > threshold
    }

    fn touch(&mut self) {
        self.info.updated = SystemTime::now();
        self.touched = Instant::now();
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("info", &self.info)
            .field("callbacks", &self.callbacks.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut upload = Upload::new("u1");
        upload.set_status(UploadStatus::Started);
        upload.set_status(UploadStatus::Completed);
        upload.set_status(UploadStatus::InProgress);
        upload.fail("too late");

        assert_eq!(upload.status(), UploadStatus::Completed);
        assert!(upload.info().meta.is_empty());
    }

    #[test]
    fn test_callbacks_see_the_new_status() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut upload = Upload::new("u1");

        let sink = seen.clone();
        upload.on_progress(move |info| sink.lock().unwrap().push(info.status));
        let sink = seen.clone();
        upload.on_failed(move |info| sink.lock().unwrap().push(info.status));

        upload.set_status(UploadStatus::Started);
        upload.set_status(UploadStatus::InProgress);
        upload.set_status(UploadStatus::InProgress);
        upload.fail("connection reset");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![UploadStatus::InProgress, UploadStatus::InProgress, UploadStatus::Failed]
        );
        assert_eq!(upload.info().meta.get("error").map(String::as_str), Some("connection reset"));
    }
}
