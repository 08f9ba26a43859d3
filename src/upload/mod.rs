//! Upload Module
//!
//! Replaces the audio of existing tracks on the streaming platform with
//! freshly rendered files.

pub mod api;
pub mod orchestrator;
pub mod soundcloud;

pub use api::{ChunkProgress, RemoteTrack, TrackApi, Transcoding, UploadPolicy};
pub use orchestrator::{
    title_for_file, UploadOutcome, UploadProgress, UploadStatus, Uploader,
    TRANSCODING_POLL_INTERVAL,
};
pub use soundcloud::SoundCloudClient;
