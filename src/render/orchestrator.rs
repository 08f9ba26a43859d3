//! Render orchestration
//!
//! Renders the requested versions of one project strictly in
//! [`SongVersion::ALL`] order. Each version is a composition of scoped
//! settings around [`render_version`]; whatever happens, the project is left
//! the way it was found, apart from vocals being made audible for the main
//! mix and stems.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Instant;

use rand::Rng;
use tracing::{info, warn};

use crate::daw::{
    validate_render_preferences, ParamRef, ProjectHandle, ProjectMetadata, Track, TrackFlag,
    TrackId,
};
use crate::error::{MixdownError, Result};
use crate::render::guard::ScopeStack;
use crate::render::result::{existing_summary_stats, RenderResult, SummaryStats};
use crate::render::settings::{
    adjust_master_limiter_threshold, adjust_render_bounds, adjust_render_pattern,
    adjust_render_settings, avoid_fx_tails, find_master_limiter_threshold, mute_tracks,
    normalize_tempo, select_tracks_only, toggle_fx, MONO_TRACKS_TO_MONO_FILES,
    SELECTED_TRACKS_VIA_MASTER, VOCAL_LOUDNESS_WORTH,
};
use crate::render::tracks::{
    acappella_mute_set, stem_eligible_tracks, vocal_tracks, vox_tracks_to_mute,
};
use crate::render::SongVersion;
use crate::tools::{ffmpeg, CommandRunner};

/// Options for rendering a project.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Render, report, then throw the output away.
    pub dry_run: bool,
    /// Overrides the project's vocal loudness worth, in dB.
    pub vocal_loudness_worth: Option<f64>,
}

/// Tracks playing a role in some version, classified once per project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackRoles {
    pub vocals: Vec<TrackId>,
    pub vox: Vec<TrackId>,
    pub acappella_mute: Vec<TrackId>,
}

fn ids(tracks: Vec<&Track>) -> Vec<TrackId> {
    tracks.into_iter().map(|track| track.id.clone()).collect()
}

/// Tracks to render as stems, as the project stands now.
///
/// Muting decides eligibility, so this is evaluated after vocals are unmuted.
fn stem_set(tracks: &[Track]) -> HashSet<TrackId> {
    ids(stem_eligible_tracks(tracks)).into_iter().collect()
}

impl TrackRoles {
    pub fn classify(tracks: &[Track]) -> Self {
        Self {
            vocals: ids(vocal_tracks(tracks)),
            vox: ids(vox_tracks_to_mute(tracks)),
            acappella_mute: ids(acappella_mute_set(tracks)),
        }
    }

    /// Whether rendering `version` would produce something distinct.
    pub fn can_render(&self, version: SongVersion) -> bool {
        let has_vocals = !self.vocals.is_empty();
        let has_vox = !self.vox.is_empty();
        match version {
            SongVersion::Main | SongVersion::Stems => true,
            SongVersion::Instrumental => has_vocals || has_vox,
            // Without vox tracks this is identical to the instrumental.
            SongVersion::InstrumentalDJ => has_vocals && has_vox,
            SongVersion::Acappella => has_vocals,
        }
    }

    /// Tracks muted for a version.
    fn muted_for(&self, version: SongVersion) -> Vec<TrackId> {
        match version {
            SongVersion::Instrumental => self.vocals.iter().chain(&self.vox).cloned().collect(),
            SongVersion::InstrumentalDJ => self.vocals.clone(),
            SongVersion::Acappella => self.acappella_mute.clone(),
            SongVersion::Main | SongVersion::Stems => Vec::new(),
        }
    }
}

/// Requested versions worth rendering, in render order.
pub fn plan_renders(requested: &[SongVersion], roles: &TrackRoles) -> Vec<SongVersion> {
    SongVersion::ALL
        .into_iter()
        .filter(|version| requested.contains(version))
        .filter(|version| {
            let renderable = roles.can_render(*version);
            if !renderable {
                warn!("Skipping {} version: nothing distinct to render", version);
            }
            renderable
        })
        .collect()
}

/// Whether a version removes the vocals and so needs the limiter compensated.
fn removes_vocals(version: SongVersion) -> bool {
    matches!(
        version,
        SongVersion::Instrumental | SongVersion::InstrumentalDJ | SongVersion::Acappella
    )
}

/// One rendered version, with the statistics of the file it replaced.
#[derive(Debug)]
pub struct RenderOutcome {
    pub before: SummaryStats,
    pub result: RenderResult,
}

/// Progress hooks for a project render. All default to doing nothing.
pub trait RenderObserver {
    fn planned(&self, _project_dir: &Path, _versions: &[SongVersion]) {}

    fn started(&self, _version: SongVersion, _name: &str) {}

    fn finished(&self, _outcome: &RenderOutcome) {}

    fn failed(&self, _version: SongVersion, _error: &MixdownError) {}
}

impl RenderObserver for () {}

/// Render the requested versions of the current project.
///
/// Fails fast: the first failing version aborts the rest, and the error names
/// it. Versions rendered before that keep their output. The project is saved
/// once everything succeeded, since rendering always leaves it dirty.
pub fn render_project<P: ProjectHandle + ?Sized>(
    project: &P,
    runner: &dyn CommandRunner,
    requested: &[SongVersion],
    options: &RenderOptions,
    observer: &dyn RenderObserver,
) -> Result<Vec<RenderOutcome>> {
    validate_render_preferences(project)?;

    let worth = match options.vocal_loudness_worth {
        Some(worth) => worth,
        None => ProjectMetadata::of(project)?
            .vocal_loudness_worth()
            .unwrap_or(VOCAL_LOUDNESS_WORTH),
    };

    let roles = TrackRoles::classify(&project.tracks()?);
    let plan = plan_renders(requested, &roles);
    if plan.is_empty() {
        return Err(MixdownError::NothingToRender);
    }

    // Resolved before any mutation so a missing limiter touches nothing.
    let threshold = if worth != 0.0 && plan.iter().any(|version| removes_vocals(*version)) {
        Some(find_master_limiter_threshold(&project.master_track()?)?)
    } else {
        None
    };

    let project_dir = project.project_dir()?;
    observer.planned(&project_dir, &plan);

    let mut outcomes = Vec::with_capacity(plan.len());
    for version in plan {
        let name = version.name_for_project_dir(&project_dir);
        info!("Rendering \"{}\"", name);
        observer.started(version, &name);

        let outcome = existing_summary_stats(runner, &version.path_for_project_dir(&project_dir))
            .and_then(|before| {
                let task = RenderTask {
                    project,
                    runner,
                    roles: &roles,
                    threshold: threshold.as_ref(),
                    worth,
                    dry_run: options.dry_run,
                };
                let result = task.run(version)?;
                Ok(RenderOutcome { before, result })
            })
            .map_err(|err| err.in_render_of(version));

        match outcome {
            Ok(outcome) => {
                observer.finished(&outcome);
                outcomes.push(outcome);
            }
            Err(err) => {
                observer.failed(version, &err);
                return Err(err);
            }
        }
    }

    project.save()?;
    Ok(outcomes)
}

/// Everything a single version's render needs.
struct RenderTask<'a, P: ?Sized> {
    project: &'a P,
    runner: &'a dyn CommandRunner,
    roles: &'a TrackRoles,
    threshold: Option<&'a ParamRef>,
    worth: f64,
    dry_run: bool,
}

impl<P: ProjectHandle + ?Sized> RenderTask<'_, P> {
    fn run(&self, version: SongVersion) -> Result<RenderResult> {
        match version {
            SongVersion::Main => {
                self.make_vocals_audible()?;
                render_version(self.project, self.runner, version, self.dry_run)
            }
            SongVersion::Instrumental | SongVersion::InstrumentalDJ => {
                let scope = self.without_vocals(version)?;
                let result = render_version(self.project, self.runner, version, self.dry_run)?;
                scope.release()?;
                Ok(result)
            }
            SongVersion::Acappella => {
                let scope = self.without_vocals(version)?;
                let result = render_version(self.project, self.runner, version, self.dry_run)?;
                scope.release()?;

                // A dry run's output is already gone.
                if !self.dry_run {
                    ffmpeg::trim_silence(self.runner, result.path())?;
                }
                Ok(result)
            }
            SongVersion::Stems => {
                self.make_vocals_audible()?;
                let master = self.project.master_track()?;
                let stems = stem_set(&self.project.tracks()?);

                let mut scope = select_tracks_only(self.project, &stems)?;
                scope.append(toggle_fx(self.project, &[master], false)?);
                scope.append(adjust_render_settings(
                    self.project,
                    MONO_TRACKS_TO_MONO_FILES | SELECTED_TRACKS_VIA_MASTER,
                )?);

                let result = render_version(self.project, self.runner, version, self.dry_run)?;
                scope.release()?;
                Ok(result)
            }
        }
    }

    /// Compensate the limiter, mute the version's tracks, and for the DJ
    /// version hold the tempo constant.
    fn without_vocals(&self, version: SongVersion) -> Result<ScopeStack<'_>> {
        let mut scope = ScopeStack::new();
        if let Some(threshold) = self.threshold {
            scope.append(adjust_master_limiter_threshold(
                self.project,
                threshold,
                self.worth,
            )?);
        }
        scope.append(mute_tracks(self.project, &self.roles.muted_for(version))?);
        if version == SongVersion::InstrumentalDJ {
            scope.append(normalize_tempo(self.project)?);
        }
        Ok(scope)
    }

    /// Unsolo and unmute the vocals. Deliberately not restored.
    fn make_vocals_audible(&self) -> Result<()> {
        for vocal in &self.roles.vocals {
            self.project.set_track_flag(vocal, TrackFlag::Solo, false)?;
            self.project.set_track_flag(vocal, TrackFlag::Mute, false)?;
        }
        Ok(())
    }
}

/// Render the project with its current settings to the path for `version`.
///
/// The DAW writes to a randomly named temporary output first, since it would
/// otherwise stop to ask before overwriting. The temporary output then
/// replaces any previous render, or in a dry run is measured and deleted.
pub fn render_version<P: ProjectHandle + ?Sized>(
    project: &P,
    runner: &dyn CommandRunner,
    version: SongVersion,
    dry_run: bool,
) -> Result<RenderResult> {
    let project_dir = project.project_dir()?;
    let out_name = version.name_for_project_dir(&project_dir);
    let out_path = version.path_for_project_dir(&project_dir);

    let rand_id: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    let in_name = format!("{out_name} {rand_id}.tmp");
    let pattern = match version.pattern() {
        Some(pattern) => format!("{in_name}/{pattern}"),
        None => in_name.clone(),
    };

    let mut scope = avoid_fx_tails(project)?;
    scope.append(adjust_render_bounds(project)?);
    scope.append(adjust_render_pattern(project, &pattern)?);
    let started = Instant::now();
    project.render()?;
    let elapsed = started.elapsed();
    scope.release()?;

    let tmp_path = if version.is_directory() {
        project_dir.join(&in_name)
    } else {
        project_dir.join(format!("{in_name}.wav"))
    };
    if !tmp_path.exists() {
        return Err(MixdownError::RenderOutputMissing { path: tmp_path });
    }

    if dry_run {
        let result = RenderResult::new(version, out_name, tmp_path.clone(), elapsed).eager(runner);
        remove_all(&tmp_path)?;
        return result;
    }

    remove_all(&out_path)?;
    fs::rename(&tmp_path, &out_path)?;
    info!("Rendered {}", out_path.display());
    Ok(RenderResult::new(version, out_name, out_path, elapsed))
}

/// Delete a file or directory tree, if there is one.
fn remove_all(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
