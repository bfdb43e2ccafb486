use crate::constants;
use crate::upload::{Upload, UploadInfo, UploadStatus};
use crate::{File, Request};
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;
use uuid::Uuid;

/// A registry of uploads in flight, keyed by the id the client chose.
///
/// The tracker has no internal locking: whoever drives an upload borrows it
/// mutably, and only one driver per id is expected at a time.
///
/// # Examples
///
/// ```
/// use bodyspool::{Request, UploadStatus, UploadTracker};
///
/// # fn run() -> bodyspool::Result<()> {
/// let req = http::Request::post("/upload?uid=u1")
///     .header("content-length", "5")
///     .body(&b"hello"[..])
///     .unwrap();
/// let mut req = Request::from_blocking(req);
///
/// let mut tracker = UploadTracker::new();
/// let mut session = tracker.upload(&req, None, Some(3));
///
/// let progress: Vec<u64> = session
///     .iter(&mut tracker, &mut req)
///     .map(|info| info.map(|info| info.progress))
///     .collect::<bodyspool::Result<_>>()?;
///
/// assert_eq!(progress, [60, 100, 100, 100]);
/// assert_eq!(tracker.get("u1").status, UploadStatus::Completed);
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
#[derive(Debug)]
pub struct UploadTracker {
    uploads: HashMap<String, Upload>,
    cleanup_threshold: Duration,
    chunk_size: u64,
}

impl UploadTracker {
    pub fn new() -> UploadTracker {
        UploadTracker::default()
    }

    /// How long an unfinished upload may go untouched before `cleanup`
    /// reclaims it.
    pub fn with_cleanup_threshold(mut self, threshold: Duration) -> UploadTracker {
        self.cleanup_threshold = threshold;
        self
    }

    /// The chunk size sessions load with unless `upload` is given one.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> UploadTracker {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Starts tracking the upload carried by `request`, or resumes it.
    ///
    /// The id is `id`, else the request's `uid` parameter, else a fresh UUID.
    /// Finished and idle records are cleaned up first.
    pub fn upload(&mut self, request: &Request, id: Option<&str>, chunk_size: Option<u64>) -> UploadSession {
        self.cleanup();

        let id = id
            .or_else(|| request.text(constants::UPLOAD_ID_PARAM))
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let upload = self.register(&id);
        if upload.status() == UploadStatus::New {
            upload.set_status(UploadStatus::Started);
        }

        UploadSession {
            id,
            chunk_size: chunk_size.unwrap_or(self.chunk_size).max(1),
            phase: Phase::Loading,
        }
    }

    /// The record for `id`, created in the `New` status if it isn't tracked
    /// yet. Callbacks attached here fire once the upload starts.
    pub fn register(&mut self, id: &str) -> &mut Upload {
        self.uploads.entry(id.to_owned()).or_insert_with(|| Upload::new(id))
    }

    /// A snapshot of the upload `id`. An unknown id gets a `New` snapshot
    /// rather than an error, so a poll that races the upload's start is fine.
    pub fn get(&self, id: &str) -> UploadInfo {
        match self.uploads.get(id) {
            Some(upload) => upload.info().clone(),
            None => UploadInfo::new(id.to_owned()),
        }
    }

    pub fn record(&self, id: &str) -> Option<&Upload> {
        self.uploads.get(id)
    }

    pub fn record_mut(&mut self, id: &str) -> Option<&mut Upload> {
        self.uploads.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.uploads.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }

    /// Marks the upload `id` failed with `error` as its reason.
    pub fn fail<E: Display>(&mut self, id: &str, error: E) {
        self.register(id).fail(error);
    }

    /// Removes finished uploads and uploads idle past the threshold, and
    /// returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let threshold = self.cleanup_threshold;
        let before = self.uploads.len();

        self.uploads
            .retain(|_, upload| !upload.status().is_terminal() && !upload.is_idle(threshold));

        let removed = before - self.uploads.len();
        if removed > 0 {
            log::debug!("removed {} upload records", removed);
        }

        removed
    }
}

impl Default for UploadTracker {
    fn default() -> Self {
        UploadTracker {
            uploads: HashMap::new(),
            cleanup_threshold: constants::DEFAULT_CLEANUP_THRESHOLD,
            chunk_size: constants::DEFAULT_UPLOAD_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Loading,
    Decode,
    Done,
}

/// Drives one upload chunk by chunk, yielding a snapshot after each step.
///
/// Each step loads one chunk while the body is incomplete, then reports
/// `Decoding`, then decodes and reports `Completed`. A session can be stopped
/// and picked up again; it ends after completion or the first error.
#[derive(Debug)]
pub struct UploadSession {
    id: String,
    chunk_size: u64,
    phase: Phase,
}

impl UploadSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// The record being driven, recreated if it was cleaned up while idle.
    /// `None` once the session is over or the upload failed elsewhere.
    fn record<'t>(&mut self, tracker: &'t mut UploadTracker) -> Option<&'t mut Upload> {
        if self.phase == Phase::Done {
            return None;
        }

        let upload = tracker.uploads.entry(self.id.clone()).or_insert_with(|| {
            log::debug!("upload {:?} was cleaned up while idle, tracking it again", self.id);
            let mut upload = Upload::new(self.id.as_str());
            upload.set_status(UploadStatus::Started);
            upload
        });

        if upload.status().is_terminal() {
            self.phase = Phase::Done;
            return None;
        }

        Some(upload)
    }

    fn advance(
        &mut self,
        upload: &mut Upload,
        request: &Request,
        result: crate::Result<UploadStatus>,
    ) -> crate::Result<UploadInfo> {
        match result {
            Ok(status) => {
                upload.record_progress(request.body());
                upload.set_status(status);

                self.phase = match status {
                    UploadStatus::Decoding => Phase::Decode,
                    UploadStatus::Completed => Phase::Done,
                    _ => Phase::Loading,
                };

                Ok(upload.info().clone())
            }
            Err(err) => {
                upload.fail(&err);
                self.phase = Phase::Done;
                Err(err)
            }
        }
    }

    /// Runs one step with a blocking body.
    pub fn step(&mut self, tracker: &mut UploadTracker, request: &mut Request) -> Option<crate::Result<UploadInfo>> {
        let phase = self.phase;
        let upload = self.record(tracker)?;

        let result = match phase {
            Phase::Loading if !request.is_loaded() => request
                .load(Some(self.chunk_size), false)
                .map(|_| UploadStatus::InProgress),
            Phase::Loading => Ok(UploadStatus::Decoding),
            _ => request.decode().map(|_| UploadStatus::Completed),
        };

        Some(self.advance(upload, request, result))
    }

    /// Runs one step with an async body.
    pub async fn step_async(
        &mut self,
        tracker: &mut UploadTracker,
        request: &mut Request,
    ) -> Option<crate::Result<UploadInfo>> {
        let phase = self.phase;
        let upload = self.record(tracker)?;

        let result = match phase {
            Phase::Loading if !request.is_loaded() => request
                .load_async(Some(self.chunk_size), false)
                .await
                .map(|_| UploadStatus::InProgress),
            Phase::Loading => Ok(UploadStatus::Decoding),
            _ => request.decode().map(|_| UploadStatus::Completed),
        };

        Some(self.advance(upload, request, result))
    }

    /// Runs one step like [`step`](Self::step) and reports the progress
    /// percentage, along with the request's files once the upload completes.
    pub fn step_files<'r>(
        &mut self,
        tracker: &mut UploadTracker,
        request: &'r mut Request,
    ) -> Option<crate::Result<(u64, Option<&'r [(String, File)]>)>> {
        let info = match self.step(tracker, request)? {
            Ok(info) => info,
            Err(err) => return Some(Err(err)),
        };

        let request: &'r Request = request;
        let files = match info.status {
            UploadStatus::Completed => Some(request.files()),
            _ => None,
        };

        Some(Ok((info.progress, files)))
    }

    /// Like [`step_files`](Self::step_files), for the single file sent as
    /// `name`. The completing step yields `None` if no such file arrived.
    pub fn step_file<'r>(
        &mut self,
        tracker: &mut UploadTracker,
        request: &'r mut Request,
        name: &str,
    ) -> Option<crate::Result<(u64, Option<&'r File>)>> {
        self.step_files(tracker, request).map(|step| {
            step.map(|(progress, files)| {
                let file = files.and_then(|files| files.iter().find(|(n, _)| n == name).map(|(_, file)| file));
                (progress, file)
            })
        })
    }

    /// Steps through the rest of a blocking upload.
    pub fn iter<'a>(&'a mut self, tracker: &'a mut UploadTracker, request: &'a mut Request) -> UploadIter<'a> {
        UploadIter {
            session: self,
            tracker,
            request,
        }
    }
}

/// Iterator returned by [`UploadSession::iter`].
#[derive(Debug)]
pub struct UploadIter<'a> {
    session: &'a mut UploadSession,
    tracker: &'a mut UploadTracker,
    request: &'a mut Request,
}

impl Iterator for UploadIter<'_> {
    type Item = crate::Result<UploadInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        self.session.step(self.tracker, self.request)
    }
}
