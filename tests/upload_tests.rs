//! Upload workflow tests against an in-memory platform

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use mixdown::upload::{
    ChunkProgress, RemoteTrack, TrackApi, Transcoding, UploadPolicy, UploadStatus, Uploader,
};
use mixdown::{MixdownError, Result};

const LONG_AGO: &str = "2001-01-01T00:00:00Z";
const FAR_FUTURE: &str = "2999-01-01T00:00:00Z";

/// Platform keeping its tracks in memory and recording every call.
#[derive(Default)]
struct FakePlatform {
    tracks: Vec<RemoteTrack>,
    /// Status checks answered with "transcoding" before the final status.
    pending_polls: usize,
    /// Defaults to "finished".
    final_status: Option<&'static str>,
    failing_put: Option<String>,
    calls: Mutex<Vec<String>>,
    polls: AtomicUsize,
    active_puts: AtomicUsize,
    max_active_puts: AtomicUsize,
}

impl FakePlatform {
    fn with_track(mut self, id: u64, title: &str, last_modified: &str) -> Self {
        self.tracks.push(RemoteTrack {
            id,
            title: title.to_string(),
            last_modified: last_modified.to_string(),
            permalink_url: format!("https://soundcloud.com/artist/track-{id}"),
        });
        self
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_starting(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }
}

impl TrackApi for FakePlatform {
    async fn list_tracks(&self) -> Result<Vec<RemoteTrack>> {
        self.record("list".to_string());
        Ok(self.tracks.clone())
    }

    async fn upload_policy(&self, filename: &str, filesize: u64) -> Result<UploadPolicy> {
        self.record(format!("policy {filename} {filesize}"));
        Ok(UploadPolicy {
            url: format!("https://uploads.example/{filename}"),
            uid: format!("uid-{filename}"),
            headers: Default::default(),
        })
    }

    async fn put_file(
        &self,
        policy: &UploadPolicy,
        file: &Path,
        progress: ChunkProgress,
    ) -> Result<()> {
        self.record(format!("put {}", policy.uid));
        let active = self.active_puts.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_puts.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active_puts.fetch_sub(1, Ordering::SeqCst);

        if self.failing_put.as_deref() == Some(policy.uid.as_str()) {
            return Err(MixdownError::Http {
                step: "File upload".to_string(),
                status: 500,
                body: "storage unavailable".to_string(),
            });
        }
        progress(fs::metadata(file)?.len());
        Ok(())
    }

    async fn start_transcoding(&self, uid: &str) -> Result<()> {
        self.record(format!("transcode {uid}"));
        Ok(())
    }

    async fn transcoding(&self, uid: &str) -> Result<Transcoding> {
        self.record(format!("status {uid}"));
        let polls = self.polls.fetch_add(1, Ordering::SeqCst);
        let status = if polls < self.pending_polls {
            "transcoding"
        } else {
            self.final_status.unwrap_or("finished")
        };
        Ok(Transcoding {
            status: status.to_string(),
        })
    }

    async fn confirm(&self, track: &RemoteTrack, filename: &str, uid: &str) -> Result<()> {
        self.record(format!("confirm {} {filename} {uid}", track.id));
        Ok(())
    }
}

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn uploader(platform: FakePlatform) -> Uploader<FakePlatform> {
    Uploader::new(platform, Arc::new(())).with_poll_interval(Duration::from_millis(1))
}

#[tokio::test]
async fn test_uploads_and_confirms_matching_track() {
    let dir = tempdir().unwrap();
    let file = write_file(dir.path(), "Song.wav", b"audio");
    let uploader = uploader(FakePlatform::default().with_track(7, "Song", LONG_AGO));

    let outcomes = uploader.upload(&[file.clone()]).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].file, file);
    match &outcomes[0].status {
        UploadStatus::Uploaded { permalink_url } => {
            assert_eq!(permalink_url, "https://soundcloud.com/artist/track-7")
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(
        uploader.api().calls(),
        vec![
            "list".to_string(),
            "policy Song.wav 5".to_string(),
            "put uid-Song.wav".to_string(),
            "transcode uid-Song.wav".to_string(),
            "status uid-Song.wav".to_string(),
            "confirm 7 Song.wav uid-Song.wav".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_newer_remote_track_is_skipped() {
    let dir = tempdir().unwrap();
    let file = write_file(dir.path(), "Song.wav", b"audio");
    let uploader = uploader(FakePlatform::default().with_track(7, "Song", FAR_FUTURE));

    let outcomes = uploader.upload(&[file]).await.unwrap();

    assert!(matches!(outcomes[0].status, UploadStatus::Skipped));
    assert_eq!(uploader.api().calls(), vec!["list".to_string()]);
}

#[tokio::test]
async fn test_unmatched_file_fails_alone() {
    let dir = tempdir().unwrap();
    let known = write_file(dir.path(), "Song.wav", b"audio");
    let unknown = write_file(dir.path(), "Song (Instrumental).wav", b"audio");
    let uploader = uploader(FakePlatform::default().with_track(7, "Song", LONG_AGO));

    let outcomes = uploader.upload(&[unknown, known]).await.unwrap();

    match &outcomes[0].status {
        UploadStatus::Failed(MixdownError::NoRemoteTrack { title }) => {
            assert_eq!(title, "Song (Instrumental)")
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert!(matches!(outcomes[1].status, UploadStatus::Uploaded { .. }));
    assert_eq!(uploader.api().calls_starting("confirm").len(), 1);
}

#[tokio::test]
async fn test_transcoding_polled_until_finished() {
    let dir = tempdir().unwrap();
    let file = write_file(dir.path(), "Song.wav", b"audio");
    let platform = FakePlatform {
        pending_polls: 3,
        ..FakePlatform::default()
    }
    .with_track(7, "Song", LONG_AGO);
    let uploader = uploader(platform);

    let outcomes = uploader.upload(&[file]).await.unwrap();

    assert!(!outcomes[0].is_failed());
    assert_eq!(uploader.api().calls_starting("status").len(), 4);
    let calls = uploader.api().calls();
    assert_eq!(calls.last().map(String::as_str), Some("confirm 7 Song.wav uid-Song.wav"));
}

#[tokio::test]
async fn test_failed_transcoding_is_not_confirmed() {
    let dir = tempdir().unwrap();
    let file = write_file(dir.path(), "Song.wav", b"audio");
    let platform = FakePlatform {
        pending_polls: 2,
        final_status: Some("failed"),
        ..FakePlatform::default()
    }
    .with_track(7, "Song", LONG_AGO);
    let uploader = uploader(platform);

    let outcomes = uploader.upload(&[file]).await.unwrap();

    match &outcomes[0].status {
        UploadStatus::Failed(MixdownError::TranscodingFailed { title, status }) => {
            assert_eq!(title, "Song");
            assert_eq!(status, "failed");
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(uploader.api().calls_starting("status").len(), 3);
    assert!(uploader.api().calls_starting("confirm").is_empty());
}

#[tokio::test]
async fn test_transfers_are_serialized() {
    let dir = tempdir().unwrap();
    let titles = ["One", "Two", "Three"];
    let mut platform = FakePlatform::default();
    for (id, title) in titles.iter().enumerate() {
        platform = platform.with_track(id as u64, title, LONG_AGO);
    }
    let files: Vec<PathBuf> = titles
        .iter()
        .map(|title| write_file(dir.path(), &format!("{title}.wav"), b"audio"))
        .collect();

    let first = uploader(platform);
    let second = first.clone();
    let (a, b) = tokio::join!(first.upload(&files[..2]), second.upload(&files[2..]));

    assert!(a.unwrap().iter().chain(b.unwrap().iter()).all(|o| !o.is_failed()));
    assert_eq!(first.api().max_active_puts.load(Ordering::SeqCst), 1);
    assert_eq!(first.api().calls_starting("confirm").len(), 3);
}

#[tokio::test]
async fn test_failed_transfer_keeps_siblings() {
    let dir = tempdir().unwrap();
    let one = write_file(dir.path(), "One.wav", b"audio");
    let two = write_file(dir.path(), "Two.wav", b"audio");
    let platform = FakePlatform {
        failing_put: Some("uid-One.wav".to_string()),
        ..FakePlatform::default()
    }
    .with_track(1, "One", LONG_AGO)
    .with_track(2, "Two", LONG_AGO);
    let uploader = uploader(platform);

    let outcomes = uploader.upload(&[one, two]).await.unwrap();

    match &outcomes[0].status {
        UploadStatus::Failed(err) => assert_eq!(err.error_code(), "HTTP_ERROR"),
        other => panic!("unexpected status: {other:?}"),
    }
    assert!(matches!(outcomes[1].status, UploadStatus::Uploaded { .. }));
    assert!(uploader.api().calls_starting("transcode uid-One").is_empty());
}

#[tokio::test]
async fn test_no_files_makes_no_calls() {
    let uploader = uploader(FakePlatform::default());
    assert!(uploader.upload(&[]).await.unwrap().is_empty());
    assert!(uploader.api().calls().is_empty());
}
