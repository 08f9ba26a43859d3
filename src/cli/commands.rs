//! CLI Command Implementations
//!
//! DAW work runs on the calling thread. Uploads run on a tokio runtime and
//! start as soon as their file is rendered, overlapping later renders.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use indicatif::MultiProgress;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::progress::{RenderProgress, UploadBars};
use crate::cli::RenderArgs;
use crate::config::Settings;
use crate::daw::{exit_daw, get_or_open, BridgeProject, ProjectHandle};
use crate::error::{MixdownError, Result};
use crate::export::export_files;
use crate::render::{render_project, RenderOptions, SongVersion, SummaryStats};
use crate::tools::{ffmpeg, lame, SystemRunner};
use crate::upload::{SoundCloudClient, UploadOutcome, UploadStatus, Uploader};

type UploadTask = JoinHandle<Result<Vec<UploadOutcome>>>;

/// Existing rendered files of `versions` in a project directory.
///
/// Stems are directories and never uploaded.
pub fn existing_render_files(project_dir: &Path, versions: &[SongVersion]) -> Vec<PathBuf> {
    versions
        .iter()
        .filter(|version| !version.is_directory())
        .map(|version| version.path_for_project_dir(project_dir))
        .filter(|path| path.is_file())
        .collect()
}

fn connect(settings: &Settings) -> Result<BridgeProject> {
    BridgeProject::connect(&settings.daw_bridge_url, settings.daw_web_port)
}

fn build_runtime() -> Result<Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn build_uploader(settings: &Settings, multi: &MultiProgress) -> Result<Uploader<SoundCloudClient>> {
    let client = SoundCloudClient::new(
        settings.require_oauth_token()?,
        &settings.parsed_additional_headers()?,
        settings.soundcloud_user_id,
    )?;
    Ok(Uploader::new(client, Arc::new(UploadBars::new(multi.clone()))))
}

fn spawn_upload(
    runtime: &Runtime,
    uploader: &Uploader<SoundCloudClient>,
    files: Vec<PathBuf>,
) -> UploadTask {
    let uploader = uploader.clone();
    runtime.spawn(async move { uploader.upload(&files).await })
}

/// Wait for uploads and print what was uploaded. Fails if any upload failed.
fn finish_uploads(runtime: &Runtime, tasks: Vec<UploadTask>) -> Result<()> {
    if tasks.is_empty() {
        return Ok(());
    }

    let mut failures = 0;
    let mut uploaded = Vec::new();
    for joined in runtime.block_on(join_all(tasks)) {
        let outcomes = joined
            .map_err(|e| MixdownError::UploadTask {
                reason: e.to_string(),
            })
            .and_then(|outcomes| outcomes);
        match outcomes {
            Ok(outcomes) => {
                for outcome in outcomes {
                    match outcome.status {
                        UploadStatus::Uploaded { permalink_url } => {
                            uploaded.push((outcome.title, permalink_url))
                        }
                        UploadStatus::Skipped => {}
                        UploadStatus::Failed(_) => failures += 1,
                    }
                }
            }
            Err(err) => {
                eprintln!("Upload failed: {err}");
                failures += 1;
            }
        }
    }

    if !uploaded.is_empty() {
        println!();
        println!("{:<40} URL", "Title");
        for (title, url) in uploaded {
            println!("{title:<40} {url}");
        }
    }

    if failures > 0 {
        return Err(MixdownError::UploadTask {
            reason: format!("{failures} upload(s) failed"),
        });
    }
    Ok(())
}

/// Open each project in turn and render it, stopping at the first failure.
///
/// Returns the number of versions rendered alongside the outcome instead of
/// bailing out, so uploads started along the way can still be awaited.
fn render_each<P: ProjectHandle>(
    mut project: P,
    project_dirs: &[Option<&Path>],
    mut render_current: impl FnMut(&P) -> Result<usize>,
) -> (usize, Result<()>) {
    let mut rendered = 0;
    for &project_dir in project_dirs {
        project = match get_or_open(project, project_dir) {
            Ok(project) => project,
            Err(err) => return (rendered, Err(err)),
        };
        match render_current(&project) {
            Ok(count) => rendered += count,
            Err(err) => return (rendered, Err(err)),
        }
    }
    (rendered, Ok(()))
}

/// Render versions of each project, uploading as requested.
pub fn render(settings: &Settings, args: &RenderArgs) -> Result<()> {
    let versions = args.versions.versions();
    let runner = SystemRunner;
    let multi = MultiProgress::new();
    let runtime = build_runtime()?;

    let uploader = if args.upload || args.upload_existing {
        Some(build_uploader(settings, &multi)?)
    } else {
        None
    };
    let upload_rendered = args.upload && !args.dry_run;
    let upload_existing = args.upload_existing && !args.dry_run;

    let options = RenderOptions {
        dry_run: args.dry_run,
        vocal_loudness_worth: args.vocal_loudness_worth,
    };

    let project_dirs: Vec<Option<&Path>> = if args.project_dirs.is_empty() {
        vec![None]
    } else {
        args.project_dirs.iter().map(|dir| Some(dir.as_path())).collect()
    };

    let uploads = RefCell::new(Vec::new());
    let project = connect(settings)?;

    let (rendered, outcome) = render_each(project, &project_dirs, |project| {
        let project_dir = project.project_dir()?;

        if let (true, Some(uploader)) = (upload_existing, &uploader) {
            let not_rendering: Vec<SongVersion> = SongVersion::ALL
                .into_iter()
                .filter(|version| !versions.contains(version))
                .collect();
            let files = existing_render_files(&project_dir, &not_rendering);
            if !files.is_empty() {
                uploads
                    .borrow_mut()
                    .push(spawn_upload(&runtime, uploader, files));
            }
        }

        let observer = RenderProgress::new(multi.clone(), &runner).on_finished(|done| {
            let path = done.result.path();
            if let (true, Some(uploader)) = (upload_rendered, &uploader) {
                if path.is_file() {
                    let task = spawn_upload(&runtime, uploader, vec![path.to_path_buf()]);
                    uploads.borrow_mut().push(task);
                }
            }
        });

        match render_project(project, &runner, &versions, &options, &observer) {
            Ok(outcomes) => Ok(outcomes.len()),
            Err(err) if err.is_noop() => {
                warn!("Nothing to render in {}", project_dir.display());
                Ok(0)
            }
            Err(err) => Err(err),
        }
    });

    if outcome.is_ok() && rendered > 0 && args.exit {
        if let Some(output) = exit_daw(&runner, &settings.daw_executable) {
            eprintln!("{output}");
        }
    }

    // Already started uploads finish even if a later render failed.
    let uploaded = finish_uploads(&runtime, uploads.into_inner());
    outcome?;
    uploaded?;

    if rendered == 0 {
        return Err(MixdownError::NothingToRender);
    }
    Ok(())
}

/// Files to measure for the `stat` command.
fn stat_targets(settings: &Settings, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if paths.is_empty() {
        let project_dir = connect(settings)?.project_dir()?;
        return Ok(existing_render_files(&project_dir, &SongVersion::ALL));
    }

    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(existing_render_files(path, &SongVersion::ALL));
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn print_stats(file: &Path, stats: &SummaryStats) {
    println!("{}", file.display());
    for (label, value) in stats.entries() {
        let value = value.map(|v| v.to_string()).unwrap_or_default();
        println!("  {label:<12} {value:>10}");
    }
}

/// Print loudness statistics.
pub fn stat(settings: &Settings, paths: &[PathBuf]) -> Result<()> {
    let runner = SystemRunner;
    let files = stat_targets(settings, paths)?;
    if files.is_empty() {
        warn!("No rendered files found");
    }

    for (index, file) in files.iter().enumerate() {
        if index > 0 {
            println!();
        }
        let stats = ffmpeg::summary_stats_for_file(&runner, file)?;
        print_stats(file, &stats);
    }
    Ok(())
}

/// Encode and tag files.
pub fn tag(settings: &Settings, files: &[PathBuf]) -> Result<()> {
    let runner = SystemRunner;
    for file in files {
        match lame::encode_and_tag(&runner, file, &settings.artist)? {
            Some(mp3) => println!("Encoded {}", mp3.display()),
            None => println!("Skipping up-to-date {}", file.with_extension("mp3").display()),
        }
    }
    Ok(())
}

/// Copy files into an album directory.
pub fn export(dst_dir: &Path, files: &[PathBuf]) -> Result<()> {
    for exported in export_files(dst_dir, files)? {
        if exported.copied {
            println!("{}", exported.destination.display());
        } else {
            println!("Skipping up-to-date {}", exported.destination.display());
        }
    }
    Ok(())
}

/// Print the open project's directory.
pub fn path(settings: &Settings) -> Result<()> {
    println!("{}", connect(settings)?.project_dir()?.display());
    Ok(())
}

/// Upload existing renders.
pub fn upload(settings: &Settings, project_dirs: &[PathBuf], versions: &[SongVersion]) -> Result<()> {
    let dirs = if project_dirs.is_empty() {
        vec![connect(settings)?.project_dir()?]
    } else {
        project_dirs.to_vec()
    };

    let files: Vec<PathBuf> = dirs
        .iter()
        .flat_map(|dir| existing_render_files(dir, versions))
        .collect();
    if files.is_empty() {
        return Err(MixdownError::NothingToUpload);
    }
    info!("Uploading {} file(s)", files.len());

    let multi = MultiProgress::new();
    let uploader = build_uploader(settings, &multi)?;
    let runtime = build_runtime()?;
    let task = spawn_upload(&runtime, &uploader, files);
    finish_uploads(&runtime, vec![task])
}
