//! Upload orchestration
//!
//! Local files replace the audio of same-titled tracks already on the
//! platform. Transfers go one at a time; transcoding waits and confirmations
//! overlap freely.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::{MixdownError, Result};
use crate::upload::api::{RemoteTrack, TrackApi};

/// Delay between transcoding status checks.
pub const TRANSCODING_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How one file's upload ended.
#[derive(Debug)]
pub enum UploadStatus {
    Uploaded { permalink_url: String },
    /// The platform already has this version.
    Skipped,
    Failed(MixdownError),
}

/// Result for one local file.
#[derive(Debug)]
pub struct UploadOutcome {
    pub file: PathBuf,
    pub title: String,
    pub status: UploadStatus,
}

impl UploadOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, UploadStatus::Failed(_))
    }
}

/// Progress hooks for uploads. All default to doing nothing.
pub trait UploadProgress: Send + Sync {
    fn transfer_started(&self, _file: &Path, _filesize: u64) {}

    fn transferred(&self, _file: &Path, _bytes: u64) {}

    fn transcoding_started(&self, _file: &Path) {}

    fn finished(&self, _outcome: &UploadOutcome) {}
}

impl UploadProgress for () {}

/// Title a file is matched against: its name without extension.
pub fn title_for_file(file: &Path) -> String {
    file.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Uploads files to a platform account.
///
/// Clones share the transfer permit, so one uploader per process serializes
/// every transfer of that process.
pub struct Uploader<A> {
    api: Arc<A>,
    transfer_permit: Arc<Semaphore>,
    progress: Arc<dyn UploadProgress>,
    poll_interval: Duration,
}

impl<A> Clone for Uploader<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            transfer_permit: Arc::clone(&self.transfer_permit),
            progress: Arc::clone(&self.progress),
            poll_interval: self.poll_interval,
        }
    }
}

impl<A: TrackApi> Uploader<A> {
    pub fn new(api: A, progress: Arc<dyn UploadProgress>) -> Self {
        Self {
            api: Arc::new(api),
            transfer_permit: Arc::new(Semaphore::new(1)),
            progress,
            poll_interval: TRANSCODING_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Upload `files`, one outcome per file in the same order.
    ///
    /// The account's track list is fetched once. A file without a matching
    /// track, or whose track is already newer, doesn't stop its siblings.
    pub async fn upload(&self, files: &[PathBuf]) -> Result<Vec<UploadOutcome>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let remote = self.api.list_tracks().await?;
        let by_title: HashMap<&str, &RemoteTrack> = remote
            .iter()
            .map(|track| (track.title.as_str(), track))
            .collect();

        let uploads = files.iter().map(|file| {
            let title = title_for_file(file);
            let track = by_title.get(title.as_str()).copied();
            async move {
                let status = match track {
                    Some(track) => self.upload_if_newer(file, track).await,
                    None => {
                        warn!("No track titled \"{}\" to upload {} to", title, file.display());
                        UploadStatus::Failed(MixdownError::NoRemoteTrack {
                            title: title.clone(),
                        })
                    }
                };
                let outcome = UploadOutcome {
                    file: file.clone(),
                    title,
                    status,
                };
                self.progress.finished(&outcome);
                outcome
            }
        });

        Ok(join_all(uploads).await)
    }

    async fn upload_if_newer(&self, file: &Path, track: &RemoteTrack) -> UploadStatus {
        match track.is_older_than(file) {
            Ok(false) => {
                info!("Skipping already uploaded \"{}\"", file.display());
                UploadStatus::Skipped
            }
            Ok(true) => match self.upload_one(file, track).await {
                Ok(()) => UploadStatus::Uploaded {
                    permalink_url: track.permalink_url.clone(),
                },
                Err(err) => UploadStatus::Failed(err),
            },
            Err(err) => UploadStatus::Failed(err),
        }
    }

    /// Replace the audio of `track` with `file`.
    async fn upload_one(&self, file: &Path, track: &RemoteTrack) -> Result<()> {
        let filename = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let filesize = tokio::fs::metadata(file).await?.len();

        let uid = {
            let _permit =
                self.transfer_permit
                    .acquire()
                    .await
                    .map_err(|e| MixdownError::UploadTask {
                        reason: e.to_string(),
                    })?;

            info!("Uploading \"{}\"", filename);
            self.progress.transfer_started(file, filesize);
            let policy = self.api.upload_policy(&filename, filesize).await?;

            let progress = Arc::clone(&self.progress);
            let path = file.to_path_buf();
            self.api
                .put_file(
                    &policy,
                    file,
                    Arc::new(move |bytes| progress.transferred(&path, bytes)),
                )
                .await?;
            policy.uid
        };

        self.progress.transcoding_started(file);
        self.api.start_transcoding(&uid).await?;
        loop {
            let transcoding = self.api.transcoding(&uid).await?;
            if transcoding.is_finished() {
                break;
            }
            if !transcoding.is_pending() {
                return Err(MixdownError::TranscodingFailed {
                    title: track.title.clone(),
                    status: transcoding.status,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        self.api.confirm(track, &filename, &uid).await?;
        info!("Uploaded \"{}\" to {}", track.title, track.permalink_url);
        Ok(())
    }
}
