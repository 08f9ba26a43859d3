//! DAW Module
//!
//! The DAW is consumed as a remote, mutable, handle-based object graph.
//! [`ProjectHandle`] is the capability surface the render workflow needs;
//! tracks, effects and parameters come back as plain snapshots and are
//! mutated through the handle by id.

pub mod bridge;
pub mod mock;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MixdownError, Result};
use crate::tools::CommandRunner;

pub use bridge::BridgeProject;
pub use mock::MockProject;

/// Project setting holding the output filename template.
pub const RENDER_PATTERN: &str = "RENDER_PATTERN";
/// Project setting holding render flag bits.
pub const RENDER_SETTINGS: &str = "RENDER_SETTINGS";
/// Project setting selecting how render bounds are chosen.
pub const RENDER_BOUNDSFLAG: &str = "RENDER_BOUNDSFLAG";
/// Project setting holding the custom render start, in seconds.
pub const RENDER_STARTPOS: &str = "RENDER_STARTPOS";
/// Project setting holding the custom render end, in seconds.
pub const RENDER_ENDPOS: &str = "RENDER_ENDPOS";

/// Global preference: run FX when stopped.
pub const RUN_ALL_ON_STOP: &str = "runallonstop";
/// Global preference: run FX for a while after stopping.
pub const RUN_AFTER_STOP: &str = "runafterstop";
/// Global preference: set media items offline when the DAW is inactive.
pub const OFFLINE_WHEN_INACTIVE: &str = "offlineinact";

/// Project notes key overriding the vocal loudness worth.
pub const VOCAL_LOUDNESS_WORTH_KEY: &str = "vocal-loudness-worth";

/// Stable identifier of a track within the open project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A media item placed on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Start, in seconds.
    pub position: f64,
    /// Length, in seconds.
    pub length: f64,
    /// Whether the item is actually muted, including by item groups and lanes.
    #[serde(default)]
    pub muted: bool,
}

impl MediaItem {
    pub fn new(position: f64, length: f64) -> Self {
        Self {
            position,
            length,
            muted: false,
        }
    }

    /// End, in seconds.
    pub fn end(&self) -> f64 {
        self.position + self.length
    }
}

/// An effect parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxParam {
    /// Parameter name. Empty when the DAW reports an undecodable name.
    #[serde(default)]
    pub name: String,
    /// Normalized value in [0, 1].
    pub normalized: f64,
}

/// An effect on a track's FX chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fx {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub params: Vec<FxParam>,
}

fn default_enabled() -> bool {
    true
}

/// Snapshot of a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub soloed: bool,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub items: Vec<MediaItem>,
    #[serde(default)]
    pub fxs: Vec<Fx>,
    /// Parent folder track, if nested.
    #[serde(default)]
    pub parent: Option<TrackId>,
}

impl Track {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(id),
            name: name.into(),
            muted: false,
            soloed: false,
            selected: false,
            items: Vec::new(),
            fxs: Vec::new(),
            parent: None,
        }
    }
}

/// Boolean per-track state that can be read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackFlag {
    Mute,
    Solo,
    Select,
}

/// A point of the project tempo map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoMarker {
    /// Position, in seconds.
    pub position: f64,
    pub bpm: f64,
}

/// Addresses one parameter of one effect on one track.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamRef {
    pub track: TrackId,
    pub fx: usize,
    pub param: usize,
}

/// Operations consumed from the DAW scripting interface.
///
/// Every call is a synchronous remote procedure call. Implementations take
/// `&self`; the DAW owns the mutable state.
pub trait ProjectHandle {
    /// All tracks, in project order.
    fn tracks(&self) -> Result<Vec<Track>>;

    /// The master track.
    fn master_track(&self) -> Result<Track>;

    /// Directory containing the project file.
    fn project_dir(&self) -> Result<PathBuf>;

    /// Open a project file, making it the current project.
    fn open_project(&self, file: &Path) -> Result<()>;

    fn track_flag(&self, track: &TrackId, flag: TrackFlag) -> Result<bool>;

    fn set_track_flag(&self, track: &TrackId, flag: TrackFlag, value: bool) -> Result<()>;

    fn fx_enabled(&self, track: &TrackId, fx: usize) -> Result<bool>;

    fn set_fx_enabled(&self, track: &TrackId, fx: usize, enabled: bool) -> Result<()>;

    fn param_normalized(&self, param: &ParamRef) -> Result<f64>;

    fn set_param_normalized(&self, param: &ParamRef, value: f64) -> Result<()>;

    /// Read a named string project setting.
    fn info_string(&self, key: &str) -> Result<String>;

    fn set_info_string(&self, key: &str, value: &str) -> Result<()>;

    /// Read a named numeric project setting.
    fn info_value(&self, key: &str) -> Result<f64>;

    fn set_info_value(&self, key: &str, value: f64) -> Result<()>;

    /// Read a global integer preference.
    fn int_config_var(&self, name: &str) -> Result<i64>;

    fn set_int_config_var(&self, name: &str, value: i64) -> Result<()>;

    fn cursor_position(&self) -> Result<f64>;

    fn set_cursor_position(&self, position: f64) -> Result<()>;

    fn tempo_markers(&self) -> Result<Vec<TempoMarker>>;

    fn set_tempo_markers(&self, markers: &[TempoMarker]) -> Result<()>;

    /// Free-form project notes.
    fn notes(&self) -> Result<String>;

    /// Trigger a render with the current settings and block until it completes.
    fn render(&self) -> Result<()>;

    fn save(&self) -> Result<()>;
}

/// Author metadata stored as a JSON object in the project notes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectMetadata {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl ProjectMetadata {
    /// Parse project notes. Notes that aren't a JSON object carry no metadata.
    pub fn parse(notes: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(notes) {
            Ok(serde_json::Value::Object(fields)) => Self { fields },
            _ => Self::default(),
        }
    }

    /// Read the metadata of a project.
    pub fn of<P: ProjectHandle + ?Sized>(project: &P) -> Result<Self> {
        Ok(Self::parse(&project.notes()?))
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    /// The `vocal-loudness-worth` setting, as a number or numeric string.
    pub fn vocal_loudness_worth(&self) -> Option<f64> {
        match self.fields.get(VOCAL_LOUDNESS_WORTH_KEY)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Project file for a project directory, or the path itself if it's a project file.
pub fn project_file_for(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "rpp") {
        return path.to_path_buf();
    }

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.join(format!("{name}.rpp"))
}

/// Make the project at `project_dir` current, opening it if it isn't already.
pub fn get_or_open<P: ProjectHandle>(project: P, project_dir: Option<&Path>) -> Result<P> {
    let Some(project_dir) = project_dir else {
        return Ok(project);
    };

    let wanted = project_dir
        .canonicalize()
        .unwrap_or_else(|_| project_dir.to_path_buf());
    let wanted_dir = if wanted.extension().is_some_and(|ext| ext == "rpp") {
        wanted.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        wanted.clone()
    };

    if project.project_dir()? == wanted_dir {
        debug!("Project already open: {}", wanted_dir.display());
        return Ok(project);
    }

    let file = project_file_for(&wanted);
    info!("Opening project: {}", file.display());
    project.open_project(&file)?;
    Ok(project)
}

/// Fail before any mutation if a global preference would spoil renders.
pub fn validate_render_preferences<P: ProjectHandle + ?Sized>(project: &P) -> Result<()> {
    let offline_when_inactive = project.int_config_var(OFFLINE_WHEN_INACTIVE)?;
    if offline_when_inactive != 0 {
        return Err(MixdownError::PreferenceMisconfigured {
            name: "Set media items offline when application is not active".to_string(),
            expected: 0,
            actual: offline_when_inactive,
            hint: "it must be unchecked, or media items will be silent in the render".to_string(),
        });
    }
    Ok(())
}

/// Close the DAW without saving.
///
/// A failing exit is reported to the caller as output text rather than an error.
pub fn exit_daw(runner: &dyn CommandRunner, executable: &Path) -> Option<String> {
    let program = executable.to_string_lossy();
    match runner.run(&program, &[OsString::from("-close:exit:nosave")]) {
        Ok(_) => None,
        Err(err) => Some(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_metadata_vocal_loudness_worth() {
        let meta = ProjectMetadata::parse(r#"{"vocal-loudness-worth": 3.5}"#);
        assert_eq!(meta.vocal_loudness_worth(), Some(3.5));

        let meta = ProjectMetadata::parse(r#"{"vocal-loudness-worth": "1.25"}"#);
        assert_eq!(meta.vocal_loudness_worth(), Some(1.25));
    }

    #[test]
    fn test_metadata_tolerates_free_text_notes() {
        assert_eq!(ProjectMetadata::parse("mix notes: more bass"), ProjectMetadata::default());
        assert_eq!(ProjectMetadata::parse("[1, 2]").vocal_loudness_worth(), None);
        assert_eq!(ProjectMetadata::parse("").vocal_loudness_worth(), None);
    }

    #[test]
    fn test_project_file_for() {
        assert_eq!(
            project_file_for(Path::new("/music/Song")),
            PathBuf::from("/music/Song/Song.rpp")
        );
        assert_eq!(
            project_file_for(Path::new("/music/Song/Other.rpp")),
            PathBuf::from("/music/Song/Other.rpp")
        );
    }

    #[test]
    fn test_get_or_open_skips_current_project() {
        let dir = tempdir().unwrap();
        let project = MockProject::new(dir.path().canonicalize().unwrap());

        let project = get_or_open(project, Some(dir.path())).unwrap();
        assert!(project.opened_files().is_empty());
    }

    #[test]
    fn test_get_or_open_opens_other_project() {
        let current = tempdir().unwrap();
        let other = tempdir().unwrap();
        let project = MockProject::new(current.path().canonicalize().unwrap());

        let project = get_or_open(project, Some(other.path())).unwrap();
        let other = other.path().canonicalize().unwrap();
        let name = other.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(project.opened_files(), vec![other.join(format!("{name}.rpp"))]);
    }

    #[test]
    fn test_validate_render_preferences() {
        let project = MockProject::new("/music/Song");
        assert!(validate_render_preferences(&project).is_ok());

        project.set_int_config_var(OFFLINE_WHEN_INACTIVE, 1).unwrap();
        let err = validate_render_preferences(&project).unwrap_err();
        assert_eq!(err.error_code(), "PREFERENCE_MISCONFIGURED");
        assert!(err.to_string().contains("silent"));
    }
}
