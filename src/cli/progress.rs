//! Console progress and reports
//!
//! Spinners for renders, byte bars for uploads, and the before/after
//! statistics table printed after each render.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::error::{MixdownError, Result};
use crate::render::{Hms, RenderObserver, RenderOutcome, SongVersion, SummaryStats};
use crate::tools::CommandRunner;
use crate::upload::{UploadOutcome, UploadProgress, UploadStatus};

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn transfer_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

fn format_stat(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Name, path, statistics table and timing of a finished render.
pub fn render_report(outcome: &RenderOutcome, runner: &dyn CommandRunner) -> Result<String> {
    let result = &outcome.result;
    let after: SummaryStats = result.summary_stats(runner)?;
    let speedup = result.render_speedup(runner)?;

    let mut report = String::new();
    let _ = writeln!(report, "{}", result.name());
    let _ = writeln!(report, "{}", result.path().display());
    let _ = writeln!(report, "  {:<12} {:>10} {:>10}", "", "Before", "After");
    for ((label, before), (_, after)) in outcome.before.entries().into_iter().zip(after.entries()) {
        let _ = writeln!(
            report,
            "  {:<12} {:>10} {:>10}",
            label,
            format_stat(before),
            format_stat(after)
        );
    }
    let _ = write!(
        report,
        "Rendered in {}, a {:.1}x speedup",
        Hms(result.render_delta()),
        speedup
    );
    Ok(report)
}

/// Shows a spinner per render and prints each render's report.
pub struct RenderProgress<'a> {
    multi: MultiProgress,
    runner: &'a dyn CommandRunner,
    bars: Mutex<HashMap<SongVersion, ProgressBar>>,
    on_finished: Option<Box<dyn Fn(&RenderOutcome) + 'a>>,
}

impl<'a> RenderProgress<'a> {
    pub fn new(multi: MultiProgress, runner: &'a dyn CommandRunner) -> Self {
        Self {
            multi,
            runner,
            bars: Mutex::new(HashMap::new()),
            on_finished: None,
        }
    }

    /// Also run `hook` after each successful render.
    pub fn on_finished(mut self, hook: impl Fn(&RenderOutcome) + 'a) -> Self {
        self.on_finished = Some(Box::new(hook));
        self
    }

    fn take_bar(&self, version: SongVersion) -> Option<ProgressBar> {
        self.bars.lock().ok().and_then(|mut bars| bars.remove(&version))
    }
}

impl RenderObserver for RenderProgress<'_> {
    fn planned(&self, project_dir: &Path, versions: &[SongVersion]) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        for version in versions {
            let bar = self.multi.add(ProgressBar::new_spinner());
            bar.set_style(spinner_style());
            bar.set_message(format!(
                "Rendering \"{}\"",
                version.name_for_project_dir(project_dir)
            ));
            bars.insert(*version, bar);
        }
    }

    fn started(&self, version: SongVersion, _name: &str) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(&version) {
                bar.enable_steady_tick(Duration::from_millis(100));
            }
        }
    }

    fn finished(&self, outcome: &RenderOutcome) {
        if let Some(bar) = self.take_bar(outcome.result.version()) {
            bar.finish_with_message(format!("Rendered \"{}\"", outcome.result.name()));
        }
        match render_report(outcome, self.runner) {
            Ok(report) => {
                let _ = self.multi.println(report);
            }
            Err(err) => {
                let _ = self.multi.println(format!("Statistics unavailable: {err}"));
            }
        }
        if let Some(hook) = &self.on_finished {
            hook(outcome);
        }
    }

    fn failed(&self, version: SongVersion, error: &MixdownError) {
        if let Some(bar) = self.take_bar(version) {
            bar.abandon_with_message(format!("Failed: {error}"));
        }
    }
}

/// Byte progress per uploaded file.
pub struct UploadBars {
    multi: MultiProgress,
    bars: Mutex<HashMap<PathBuf, ProgressBar>>,
}

impl UploadBars {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn with_bar(&self, file: &Path, f: impl FnOnce(&ProgressBar)) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(file) {
                f(bar);
            }
        }
    }
}

fn file_label(file: &Path) -> String {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl UploadProgress for UploadBars {
    fn transfer_started(&self, file: &Path, filesize: u64) {
        let bar = self.multi.add(ProgressBar::new(filesize));
        bar.set_style(transfer_style());
        bar.set_message(format!("Uploading \"{}\"", file_label(file)));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(file.to_path_buf(), bar);
        }
    }

    fn transferred(&self, file: &Path, bytes: u64) {
        self.with_bar(file, |bar| bar.inc(bytes));
    }

    fn transcoding_started(&self, file: &Path) {
        self.with_bar(file, |bar| {
            bar.set_style(spinner_style());
            bar.set_message(format!("Transcoding \"{}\"", file_label(file)));
            bar.enable_steady_tick(Duration::from_millis(100));
        });
    }

    fn finished(&self, outcome: &UploadOutcome) {
        let bar = self
            .bars
            .lock()
            .ok()
            .and_then(|mut bars| bars.remove(&outcome.file));
        let message = match &outcome.status {
            UploadStatus::Uploaded { permalink_url } => {
                format!("Uploaded \"{}\" {}", outcome.title, permalink_url)
            }
            UploadStatus::Skipped => format!("Skipping already uploaded \"{}\"", outcome.title),
            UploadStatus::Failed(err) => format!("Failed to upload \"{}\": {}", outcome.title, err),
        };
        match bar {
            Some(bar) if outcome.is_failed() => bar.abandon_with_message(message),
            Some(bar) => bar.finish_with_message(message),
            None => {
                let _ = self.multi.println(message);
            }
        }
    }
}
