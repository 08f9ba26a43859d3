//! Scoped DAW settings
//!
//! Each function applies one transient change for the length of a render and
//! returns the [`ScopeStack`] that undoes it. Everything reads the current
//! value first, so restoring puts back exactly what the user had.

use std::collections::HashSet;

use tracing::debug;

use crate::daw::{
    ParamRef, ProjectHandle, TempoMarker, Track, TrackFlag, TrackId, RENDER_BOUNDSFLAG,
    RENDER_ENDPOS, RENDER_PATTERN, RENDER_SETTINGS, RENDER_STARTPOS, RUN_AFTER_STOP,
    RUN_ALL_ON_STOP,
};
use crate::error::{MixdownError, Result};
use crate::render::guard::ScopeStack;
use crate::render::tracks::audible_bounds;

/// Span of the limiter's threshold control, in dB (-60 to +12).
///
/// Measured against the DAW; the plugin doesn't report it.
pub const LIMITER_RANGE: f64 = 72.0;

/// How much louder the vocals make a mix, in dB, unless configured otherwise.
pub const VOCAL_LOUDNESS_WORTH: f64 = 2.0;

/// Render setting bit: render mono tracks to mono files.
pub const MONO_TRACKS_TO_MONO_FILES: u32 = 16;
/// Render setting bit: render selected tracks through the master.
pub const SELECTED_TRACKS_VIA_MASTER: u32 = 128;

/// Render bounds setting selecting the custom start and end positions.
const CUSTOM_TIME_BOUNDS: f64 = 0.0;

/// Name fragment identifying the master limiter.
const LIMITER_MARKER: &str = "Limit";
/// Name fragment identifying the limiter's threshold parameter.
const THRESHOLD_MARKER: &str = "Threshold";

/// Locate the threshold of the last limiter on the master chain.
pub fn find_master_limiter_threshold(master: &Track) -> Result<ParamRef> {
    let (fx_index, fx) = master
        .fxs
        .iter()
        .enumerate()
        .rev()
        .find(|(_, fx)| fx.name.contains(LIMITER_MARKER))
        .ok_or(MixdownError::MasterLimiterNotFound)?;

    let param_index = fx
        .params
        .iter()
        .position(|param| param.name.contains(THRESHOLD_MARKER))
        .ok_or_else(|| MixdownError::LimiterThresholdNotFound {
            fx: fx.name.clone(),
        })?;

    Ok(ParamRef {
        track: master.id.clone(),
        fx: fx_index,
        param: param_index,
    })
}

/// Normalized threshold that makes the limiter push `worth` dB harder.
///
/// Not clamped; the DAW clamps out-of-range values itself.
pub fn louder_threshold(previous: f64, worth: f64) -> f64 {
    (previous * LIMITER_RANGE - worth) / LIMITER_RANGE
}

/// Lower the master limiter threshold to make up for missing vocals.
///
/// A worth of exactly zero changes nothing.
pub fn adjust_master_limiter_threshold<'a, P: ProjectHandle + ?Sized>(
    project: &'a P,
    threshold: &ParamRef,
    worth: f64,
) -> Result<ScopeStack<'a>> {
    let mut scope = ScopeStack::new();
    if worth == 0.0 {
        return Ok(scope);
    }

    let previous = project.param_normalized(threshold)?;
    let louder = louder_threshold(previous, worth);
    debug!(
        "Limiter threshold {:.5} -> {:.5} for {} dB vocal loudness",
        previous, louder, worth
    );

    let param = threshold.clone();
    scope.enter(
        "master limiter threshold",
        || Ok(previous),
        move |value| project.set_param_normalized(&param, value),
        louder,
    )?;
    Ok(scope)
}

/// Set the output filename template.
pub fn adjust_render_pattern<'a, P: ProjectHandle + ?Sized>(
    project: &'a P,
    pattern: &str,
) -> Result<ScopeStack<'a>> {
    let mut scope = ScopeStack::new();
    scope.enter(
        "render pattern",
        || project.info_string(RENDER_PATTERN),
        move |value: String| project.set_info_string(RENDER_PATTERN, &value),
        pattern.to_string(),
    )?;
    Ok(scope)
}

/// Render exactly the span covered by audible media items.
pub fn adjust_render_bounds<'a, P: ProjectHandle + ?Sized>(
    project: &'a P,
) -> Result<ScopeStack<'a>> {
    let (start, end) = audible_bounds(&project.tracks()?);
    debug!("Render bounds {:.3}s to {:.3}s", start, end);

    let mut scope = ScopeStack::new();
    for (key, during) in [
        (RENDER_BOUNDSFLAG, CUSTOM_TIME_BOUNDS),
        (RENDER_STARTPOS, start),
        (RENDER_ENDPOS, end),
    ] {
        scope.enter(
            key,
            || project.info_value(key),
            move |value| project.set_info_value(key, value),
            during,
        )?;
    }
    Ok(scope)
}

/// Replace the render setting bits.
pub fn adjust_render_settings<'a, P: ProjectHandle + ?Sized>(
    project: &'a P,
    settings: u32,
) -> Result<ScopeStack<'a>> {
    let mut scope = ScopeStack::new();
    scope.enter(
        "render settings",
        || project.info_value(RENDER_SETTINGS),
        move |value| project.set_info_value(RENDER_SETTINGS, value),
        f64::from(settings),
    )?;
    Ok(scope)
}

fn set_track_flags<'a, P: ProjectHandle + ?Sized>(
    scope: &mut ScopeStack<'a>,
    project: &'a P,
    track: &TrackId,
    flag: TrackFlag,
    value: bool,
) -> Result<()> {
    let getter_id = track.clone();
    let setter_id = track.clone();
    scope.enter(
        format!("{flag:?} of track {track}"),
        move || project.track_flag(&getter_id, flag),
        move |value| project.set_track_flag(&setter_id, flag, value),
        value,
    )
}

/// Mute the given tracks.
pub fn mute_tracks<'a, P: ProjectHandle + ?Sized>(
    project: &'a P,
    tracks: &[TrackId],
) -> Result<ScopeStack<'a>> {
    let mut scope = ScopeStack::new();
    for track in tracks {
        set_track_flags(&mut scope, project, track, TrackFlag::Mute, true)?;
    }
    Ok(scope)
}

/// Select exactly the given tracks.
///
/// Only tracks whose selection differs are touched.
pub fn select_tracks_only<'a, P: ProjectHandle + ?Sized>(
    project: &'a P,
    selected: &HashSet<TrackId>,
) -> Result<ScopeStack<'a>> {
    let mut scope = ScopeStack::new();
    for track in project.tracks()? {
        let wanted = selected.contains(&track.id);
        if track.selected != wanted {
            set_track_flags(&mut scope, project, &track.id, TrackFlag::Select, wanted)?;
        }
    }
    Ok(scope)
}

/// Enable or disable every effect on the given tracks.
pub fn toggle_fx<'a, P: ProjectHandle + ?Sized>(
    project: &'a P,
    tracks: &[Track],
    enabled: bool,
) -> Result<ScopeStack<'a>> {
    let mut scope = ScopeStack::new();
    for track in tracks {
        for (index, fx) in track.fxs.iter().enumerate() {
            if fx.enabled == enabled {
                continue;
            }
            let getter_id = track.id.clone();
            let setter_id = track.id.clone();
            scope.enter(
                format!("FX \"{}\" on track {}", fx.name, track.id),
                move || project.fx_enabled(&getter_id, index),
                move |value| project.set_fx_enabled(&setter_id, index, value),
                enabled,
            )?;
        }
    }
    Ok(scope)
}

/// Stop effect tails from before the render start bleeding into it.
pub fn avoid_fx_tails<'a, P: ProjectHandle + ?Sized>(project: &'a P) -> Result<ScopeStack<'a>> {
    let mut scope = ScopeStack::new();
    for name in [RUN_ALL_ON_STOP, RUN_AFTER_STOP] {
        scope.enter(
            name,
            || project.int_config_var(name),
            move |value| project.set_int_config_var(name, value),
            0,
        )?;
    }
    scope.enter(
        "cursor position",
        || project.cursor_position(),
        move |value| project.set_cursor_position(value),
        0.0,
    )?;
    Ok(scope)
}

/// Flatten the tempo map to the project's initial tempo.
pub fn normalize_tempo<'a, P: ProjectHandle + ?Sized>(project: &'a P) -> Result<ScopeStack<'a>> {
    let mut scope = ScopeStack::new();
    let markers = project.tempo_markers()?;
    if markers.len() < 2 {
        return Ok(scope);
    }

    let bpm = markers[0].bpm;
    debug!("Flattening {} tempo markers to {} bpm", markers.len(), bpm);
    let constant = vec![TempoMarker { position: 0.0, bpm }];
    scope.enter(
        "tempo map",
        move || Ok(markers),
        move |markers: Vec<TempoMarker>| project.set_tempo_markers(&markers),
        constant,
    )?;
    Ok(scope)
}
