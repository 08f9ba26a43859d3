//! Song versions
//!
//! The closed set of mixes rendered from one project, and where each lands
//! on disk relative to the project directory.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// DAW render pattern that recreates the project's folder/track hierarchy.
pub const STEMS_PATTERN: &str = "$folders $tracknumber - $track";

/// Different versions of a song to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SongVersion {
    Main,
    Instrumental,
    InstrumentalDJ,
    Acappella,
    Stems,
}

impl SongVersion {
    /// All versions, in render order.
    pub const ALL: [SongVersion; 5] = [
        SongVersion::Main,
        SongVersion::Instrumental,
        SongVersion::InstrumentalDJ,
        SongVersion::Acappella,
        SongVersion::Stems,
    ];

    /// Versions rendered or uploaded when none are requested explicitly.
    pub const DEFAULT: [SongVersion; 3] = [
        SongVersion::Main,
        SongVersion::Instrumental,
        SongVersion::Acappella,
    ];

    fn suffix(&self) -> Option<&'static str> {
        match self {
            SongVersion::Main => None,
            SongVersion::Instrumental => Some("Instrumental"),
            SongVersion::InstrumentalDJ => Some("DJ Instrumental"),
            SongVersion::Acappella => Some("A Cappella"),
            SongVersion::Stems => Some("Stems"),
        }
    }

    /// Name of the project for this version, e.g. `Song (Instrumental)`.
    pub fn name_for_project_dir(&self, project_dir: &Path) -> String {
        let project_name = project_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match self.suffix() {
            Some(suffix) => format!("{project_name} ({suffix})"),
            None => project_name,
        }
    }

    /// Path of the rendered output. A `.wav` file, or a directory for stems.
    pub fn path_for_project_dir(&self, project_dir: &Path) -> PathBuf {
        let name = self.name_for_project_dir(project_dir);
        if self.is_directory() {
            project_dir.join(name)
        } else {
            project_dir.join(format!("{name}.wav"))
        }
    }

    /// Whether the output of this version is a directory of files.
    pub fn is_directory(&self) -> bool {
        matches!(self, SongVersion::Stems)
    }

    /// Extra render pattern components nested under the output name.
    pub fn pattern(&self) -> Option<&'static str> {
        match self {
            SongVersion::Stems => Some(STEMS_PATTERN),
            _ => None,
        }
    }
}

impl fmt::Display for SongVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SongVersion::Main => "main",
            SongVersion::Instrumental => "instrumental",
            SongVersion::InstrumentalDJ => "DJ instrumental",
            SongVersion::Acappella => "a cappella",
            SongVersion::Stems => "stems",
        };
        f.write_str(label)
    }
}
