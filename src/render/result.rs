//! Render results and loudness statistics
//!
//! Times are whole seconds. Sub-second precision is irrelevant to someone
//! waiting on a DAW.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::Result;
use crate::render::SongVersion;
use crate::tools::{ffmpeg, CommandRunner};

/// Loudness statistics of an audio file. Metrics the analysis didn't report are absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SummaryStats {
    /// Peak volume, in dB.
    pub max_volume: Option<f64>,
    /// Integrated loudness, in LUFS.
    pub lufs_i: Option<f64>,
    /// Loudness range, in LU.
    pub lra: Option<f64>,
}

impl SummaryStats {
    /// Labelled metrics, sorted by label.
    pub fn entries(&self) -> [(&'static str, Option<f64>); 3] {
        [
            ("lra", self.lra),
            ("lufs_i", self.lufs_i),
            ("max_volume", self.max_volume),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.entries().iter().all(|(_, value)| value.is_none())
    }
}

/// Statistics of a previous render at `path`, or none if nothing is there yet.
pub fn existing_summary_stats(runner: &dyn CommandRunner, path: &Path) -> Result<SummaryStats> {
    if path.is_file() {
        ffmpeg::summary_stats_for_file(runner, path)
    } else {
        Ok(SummaryStats::default())
    }
}

/// Audio length of a file, or of every `.wav` below a directory.
pub fn audio_duration(runner: &dyn CommandRunner, path: &Path) -> Result<Duration> {
    let secs = if path.is_dir() {
        let mut total = 0.0;
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
            let is_wav = entry.path().extension().is_some_and(|ext| ext == "wav");
            if entry.file_type().is_file() && is_wav {
                total += ffmpeg::probe_duration(runner, entry.path())?;
            }
        }
        total
    } else {
        ffmpeg::probe_duration(runner, path)?
    };

    Ok(Duration::from_secs(secs.max(0.0).round() as u64))
}

/// Ratio of audio length to render time. Infinite when the render took no time.
pub fn speedup(audio: Duration, render: Duration) -> f64 {
    if render.is_zero() {
        return f64::INFINITY;
    }
    audio.as_secs_f64() / render.as_secs_f64()
}

/// A finished render of one song version.
///
/// Audio duration and loudness statistics are derived on first request and
/// then kept; each is computed at most once per result.
#[derive(Debug)]
pub struct RenderResult {
    version: SongVersion,
    name: String,
    path: PathBuf,
    render_delta: Duration,
    duration: OnceLock<Duration>,
    summary_stats: OnceLock<SummaryStats>,
}

impl RenderResult {
    /// Record a render. The render time is truncated to whole seconds.
    pub fn new(version: SongVersion, name: String, path: PathBuf, elapsed: Duration) -> Self {
        Self {
            version,
            name,
            path,
            render_delta: Duration::from_secs(elapsed.as_secs()),
            duration: OnceLock::new(),
            summary_stats: OnceLock::new(),
        }
    }

    /// Compute every derived value now, e.g. before `path` is deleted.
    pub fn eager(self, runner: &dyn CommandRunner) -> Result<Self> {
        self.duration(runner)?;
        self.summary_stats(runner)?;
        Ok(self)
    }

    pub fn version(&self) -> SongVersion {
        self.version
    }

    /// Display name, e.g. `Song (Instrumental)`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rendered file, or directory for stems.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn render_delta(&self) -> Duration {
        self.render_delta
    }

    /// How long the rendered audio is.
    pub fn duration(&self, runner: &dyn CommandRunner) -> Result<Duration> {
        if let Some(duration) = self.duration.get() {
            return Ok(*duration);
        }
        let duration = audio_duration(runner, &self.path)?;
        Ok(*self.duration.get_or_init(|| duration))
    }

    /// Loudness statistics of the rendered file. Empty for directories.
    pub fn summary_stats(&self, runner: &dyn CommandRunner) -> Result<SummaryStats> {
        if let Some(stats) = self.summary_stats.get() {
            return Ok(*stats);
        }
        let stats = existing_summary_stats(runner, &self.path)?;
        Ok(*self.summary_stats.get_or_init(|| stats))
    }

    /// How much faster the render was than real time.
    pub fn render_speedup(&self, runner: &dyn CommandRunner) -> Result<f64> {
        Ok(speedup(self.duration(runner)?, self.render_delta))
    }
}

/// `H:MM:SS`, the way render times are shown.
pub struct Hms(pub Duration);

impl fmt::Display for Hms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        write!(f, "{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
    }
}
