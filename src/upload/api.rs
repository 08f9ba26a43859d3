//! Streaming platform API surface
//!
//! The upload orchestrator only needs these six calls, so tests can swap in
//! an in-memory platform.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MixdownError, Result};

/// Transcoding status reported once the uploaded audio is ready.
pub const TRANSCODING_FINISHED: &str = "finished";

/// Transcoding status while the platform is still working.
pub const TRANSCODING_IN_PROGRESS: &str = "transcoding";

/// Called with the size of every chunk sent.
pub type ChunkProgress = Arc<dyn Fn(u64) + Send + Sync>;

/// A track already on the platform, uploads replace its audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub id: u64,
    pub title: String,
    /// RFC 3339 timestamp of the last change.
    pub last_modified: String,
    #[serde(default)]
    pub permalink_url: String,
}

impl RemoteTrack {
    pub fn last_modified(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.last_modified)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| MixdownError::UploadTask {
                reason: format!(
                    "track \"{}\" has an unreadable last_modified \"{}\": {}",
                    self.title, self.last_modified, e
                ),
            })
    }

    /// Whether the platform's copy predates the local file.
    pub fn is_older_than(&self, file: &Path) -> Result<bool> {
        let modified: DateTime<Utc> = std::fs::metadata(file)?.modified()?.into();
        Ok(self.last_modified()? < modified)
    }
}

/// Where and how to send the audio, as granted by the platform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadPolicy {
    pub url: String,
    pub uid: String,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
}

/// Transcoding state of an upload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Transcoding {
    pub status: String,
}

impl Transcoding {
    pub fn is_finished(&self) -> bool {
        self.status == TRANSCODING_FINISHED
    }

    /// Any status besides these two is terminal, e.g. "failed".
    pub fn is_pending(&self) -> bool {
        self.status == TRANSCODING_IN_PROGRESS
    }
}

/// Calls the upload workflow makes against the platform.
pub trait TrackApi: Send + Sync {
    /// Tracks on the account.
    fn list_tracks(&self) -> impl Future<Output = Result<Vec<RemoteTrack>>> + Send;

    /// Request a destination for a file of `filesize` bytes.
    fn upload_policy(
        &self,
        filename: &str,
        filesize: u64,
    ) -> impl Future<Output = Result<UploadPolicy>> + Send;

    /// Send the file to the granted destination.
    fn put_file(
        &self,
        policy: &UploadPolicy,
        file: &Path,
        progress: ChunkProgress,
    ) -> impl Future<Output = Result<()>> + Send;

    fn start_transcoding(&self, uid: &str) -> impl Future<Output = Result<()>> + Send;

    fn transcoding(&self, uid: &str) -> impl Future<Output = Result<Transcoding>> + Send;

    /// Make the uploaded audio the track's audio.
    fn confirm(
        &self,
        track: &RemoteTrack,
        filename: &str,
        uid: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn track(last_modified: &str) -> RemoteTrack {
        RemoteTrack {
            id: 1,
            title: "Song".to_string(),
            last_modified: last_modified.to_string(),
            permalink_url: String::new(),
        }
    }

    #[test]
    fn test_older_than_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("Song.wav");
        fs::write(&file, b"").unwrap();

        assert!(track("2001-01-01T00:00:00Z").is_older_than(&file).unwrap());
        assert!(!track("2999-01-01T00:00:00+02:00").is_older_than(&file).unwrap());
    }

    #[test]
    fn test_unreadable_last_modified() {
        let err = track("last week").last_modified().unwrap_err();
        assert_eq!(err.error_code(), "UPLOAD_TASK_ERROR");
    }

    #[test]
    fn test_transcoding_finished() {
        let finished: Transcoding = serde_json::from_str(r#"{"status": "finished"}"#).unwrap();
        let pending: Transcoding = serde_json::from_str(r#"{"status": "transcoding"}"#).unwrap();
        let failed: Transcoding = serde_json::from_str(r#"{"status": "failed"}"#).unwrap();
        assert!(finished.is_finished());
        assert!(!pending.is_finished());
        assert!(pending.is_pending());
        assert!(!failed.is_finished() && !failed.is_pending());
    }
}
