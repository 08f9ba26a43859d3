//! ffmpeg and ffprobe wrappers
//!
//! The diagnostic output of these tools is undocumented and verbose, so the
//! parsers only look for the labels they need and tolerate everything else.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use tracing::debug;

use crate::error::{MixdownError, Result};
use crate::render::SummaryStats;
use crate::tools::CommandRunner;

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

/// Leading silence longer than this is trimmed from a cappella renders.
pub const LEADING_SILENCE_SECS: f64 = 1.0;
/// Trailing silence longer than this is trimmed from a cappella renders.
pub const TRAILING_SILENCE_SECS: f64 = 3.0;
const SILENCE_THRESHOLD: f64 = 0.02;

static MAX_VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"max_volume:\s*(-?[\d.]+|-?inf) dB").unwrap());
static INTEGRATED_LOUDNESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"I:\s+(-?[\d.]+|-?inf) LUFS").unwrap());
static LOUDNESS_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"LRA:\s+(-?[\d.]+) LU\b").unwrap());
static DURATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"duration=(\S+)").unwrap());

fn capture_f64(re: &Regex, output: &str) -> Option<f64> {
    // The ebur128 summary repeats the labels; the last occurrence is the summary.
    re.captures_iter(output)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Arguments for measuring peak volume and EBU R128 loudness.
pub fn stats_args(file: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        file.into(),
        "-filter:a".into(),
        "volumedetect,ebur128=framelog=verbose".into(),
        "-hide_banner".into(),
        "-nostats".into(),
        "-f".into(),
        "null".into(),
        "/dev/null".into(),
    ]
}

/// Scan ffmpeg diagnostics for peak volume, integrated loudness and loudness range.
///
/// Each metric is looked up independently; a missing one is left absent.
pub fn parse_summary_stats(output: &str) -> SummaryStats {
    SummaryStats {
        max_volume: capture_f64(&MAX_VOLUME, output),
        lufs_i: capture_f64(&INTEGRATED_LOUDNESS, output),
        lra: capture_f64(&LOUDNESS_RANGE, output),
    }
}

/// Loudness statistics for an audio file.
pub fn summary_stats_for_file(runner: &dyn CommandRunner, file: &Path) -> Result<SummaryStats> {
    let output = runner.run(FFMPEG, &stats_args(file))?;
    Ok(parse_summary_stats(&output.stderr))
}

/// Parse the `duration=` field of ffprobe output, in seconds.
pub fn parse_duration(output: &str) -> Result<f64> {
    let raw = DURATION
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| MixdownError::ToolOutput {
            program: FFPROBE.to_string(),
            reason: "no duration field".to_string(),
        })?;

    if raw == "N/A" {
        return Ok(0.0);
    }

    raw.parse().map_err(|_| MixdownError::ToolOutput {
        program: FFPROBE.to_string(),
        reason: format!("invalid duration \"{raw}\""),
    })
}

/// Duration of an audio file, in seconds.
pub fn probe_duration(runner: &dyn CommandRunner, file: &Path) -> Result<f64> {
    let args: Vec<OsString> = vec![
        "-i".into(),
        file.into(),
        "-show_entries".into(),
        "format=duration".into(),
    ];
    let output = runner.run(FFPROBE, &args)?;
    parse_duration(&output.stdout)
}

fn silence_filter() -> String {
    [
        "areverse".to_string(),
        "atrim=start=0.2".to_string(),
        format!(
            "silenceremove=start_periods=1:start_silence={TRAILING_SILENCE_SECS}:start_threshold={SILENCE_THRESHOLD}"
        ),
        "areverse".to_string(),
        "atrim=start=0.2".to_string(),
        format!(
            "silenceremove=start_periods=1:start_silence={LEADING_SILENCE_SECS}:start_threshold={SILENCE_THRESHOLD}"
        ),
    ]
    .join(",")
}

/// Scratch path next to `file` for in-place rewrites.
pub(crate) fn scratch_path(file: &Path, extension: &str) -> PathBuf {
    let rand_id: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    let mut name = file.as_os_str().to_owned();
    name.push(format!(" {rand_id}.tmp.{extension}"));
    PathBuf::from(name)
}

/// Trim leading and trailing silence from an audio file, in place.
pub fn trim_silence(runner: &dyn CommandRunner, file: &Path) -> Result<()> {
    let tmp = scratch_path(file, "wav");
    let args: Vec<OsString> = vec![
        "-i".into(),
        file.into(),
        "-filter:a".into(),
        silence_filter().into(),
        tmp.clone().into(),
    ];

    debug!("Trimming silence: {}", file.display());
    if let Err(err) = runner.run(FFMPEG, &args) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }

    fs::rename(&tmp, file)?;
    Ok(())
}
