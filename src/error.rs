//! Error handling for Mixdown
//!
//! Errors are grouped the way the release workflow fails: the environment is
//! wrong before anything is touched, there is nothing to do, a render fails
//! partway, or an upload step is rejected upstream.

use std::path::PathBuf;

use thiserror::Error;

use crate::render::SongVersion;

/// Result type alias for Mixdown operations
pub type Result<T> = std::result::Result<T, MixdownError>;

/// Main error type for Mixdown operations
#[derive(Error, Debug)]
pub enum MixdownError {
    // Environment Errors
    #[error("DAW is not reachable: {reason}")]
    DawUnreachable { reason: String },

    #[error("DAW bridge call `{method}` failed: {message}")]
    Bridge { method: String, message: String },

    #[error("Master limiter not found")]
    MasterLimiterNotFound,

    #[error("Threshold parameter not found on master limiter \"{fx}\"")]
    LimiterThresholdNotFound { fx: String },

    #[error("DAW preference \"{name}\" is {actual}, expected {expected}: {hint}")]
    PreferenceMisconfigured {
        name: String,
        expected: i64,
        actual: i64,
        hint: String,
    },

    #[error("Track not found: {id}")]
    TrackNotFound { id: String },

    // No-op Conditions
    #[error("Nothing to render")]
    NothingToRender,

    #[error("Nothing to upload")]
    NothingToUpload,

    // Render Errors
    #[error("Rendering {version} failed: {source}")]
    RenderFailed {
        version: SongVersion,
        #[source]
        source: Box<MixdownError>,
    },

    #[error("Render output missing: {path}")]
    RenderOutputMissing { path: PathBuf },

    // External Tool Errors
    #[error("{program} exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Unexpected {program} output: {reason}")]
    ToolOutput { program: String, reason: String },

    // Upload Errors
    #[error("Track to upload not found on the platform: {title}")]
    NoRemoteTrack { title: String },

    #[error("{step} failed with {status} (with body \"{body}\")")]
    Http {
        step: String,
        status: u16,
        body: String,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upload task failed: {reason}")]
    UploadTask { reason: String },

    #[error("Transcoding of \"{title}\" ended with status \"{status}\"")]
    TranscodingFailed { title: String, status: String },

    // Argument Errors
    #[error("Missing configuration: {name}")]
    MissingConfig { name: String },

    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MixdownError {
    /// Attribute an error to the render of a specific version.
    pub fn in_render_of(self, version: SongVersion) -> Self {
        match self {
            err @ MixdownError::RenderFailed { .. } => err,
            err => MixdownError::RenderFailed {
                version,
                source: Box::new(err),
            },
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            MixdownError::DawUnreachable { .. } => "DAW_UNREACHABLE",
            MixdownError::Bridge { .. } => "BRIDGE_ERROR",
            MixdownError::MasterLimiterNotFound => "MASTER_LIMITER_NOT_FOUND",
            MixdownError::LimiterThresholdNotFound { .. } => "LIMITER_THRESHOLD_NOT_FOUND",
            MixdownError::PreferenceMisconfigured { .. } => "PREFERENCE_MISCONFIGURED",
            MixdownError::TrackNotFound { .. } => "TRACK_NOT_FOUND",
            MixdownError::NothingToRender => "NOTHING_TO_RENDER",
            MixdownError::NothingToUpload => "NOTHING_TO_UPLOAD",
            MixdownError::RenderFailed { .. } => "RENDER_FAILED",
            MixdownError::RenderOutputMissing { .. } => "RENDER_OUTPUT_MISSING",
            MixdownError::ToolFailed { .. } => "TOOL_FAILED",
            MixdownError::ToolOutput { .. } => "TOOL_OUTPUT",
            MixdownError::NoRemoteTrack { .. } => "NO_REMOTE_TRACK",
            MixdownError::Http { .. } => "HTTP_ERROR",
            MixdownError::Transport(_) => "TRANSPORT_ERROR",
            MixdownError::UploadTask { .. } => "UPLOAD_TASK_ERROR",
            MixdownError::TranscodingFailed { .. } => "TRANSCODING_FAILED",
            MixdownError::MissingConfig { .. } => "MISSING_CONFIG",
            MixdownError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            MixdownError::Io(_) => "IO_ERROR",
            MixdownError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether this is a "nothing to do" outcome rather than a hard failure.
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            MixdownError::NothingToRender | MixdownError::NothingToUpload
        )
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MixdownError::NothingToRender
            | MixdownError::NothingToUpload
            | MixdownError::DawUnreachable { .. }
            | MixdownError::MasterLimiterNotFound
            | MixdownError::LimiterThresholdNotFound { .. }
            | MixdownError::PreferenceMisconfigured { .. }
            | MixdownError::MissingConfig { .. }
            | MixdownError::InvalidArgument { .. } => 2,
            _ => 1,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            MixdownError::DawUnreachable { .. } | MixdownError::Bridge { .. } => {
                Some("Is the DAW running with the scripting bridge and web interface enabled?")
            }
            MixdownError::MasterLimiterNotFound => {
                Some("Add a limiter with \"Limit\" in its name to the master track.")
            }
            MixdownError::LimiterThresholdNotFound { .. } => {
                Some("The master limiter needs a parameter with \"Threshold\" in its name.")
            }
            MixdownError::PreferenceMisconfigured { .. } => {
                Some("Change the preference in the DAW and run again.")
            }
            MixdownError::NothingToRender => {
                Some("Instrumental and a cappella versions need a track named \"Vocals\".")
            }
            MixdownError::NoRemoteTrack { .. } => {
                Some("Create a placeholder track with the same title on the platform first.")
            }
            MixdownError::ToolFailed { .. } => Some("Check that ffmpeg, ffprobe and lame are installed."),
            MixdownError::MissingConfig { .. } => {
                Some("Pass the flag or set the corresponding environment variable.")
            }
            _ => None,
        }
    }
}
