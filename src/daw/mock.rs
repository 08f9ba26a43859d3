//! Mock DAW project for testing
//!
//! Keeps the whole project in memory and records what the render workflow
//! did to it: every render captures a snapshot of the state it saw, every
//! parameter write and save is counted. Rendering writes placeholder files
//! where the DAW would.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::daw::{
    ParamRef, ProjectHandle, TempoMarker, Track, TrackFlag, TrackId, OFFLINE_WHEN_INACTIVE,
    RENDER_BOUNDSFLAG, RENDER_ENDPOS, RENDER_PATTERN, RENDER_SETTINGS, RENDER_STARTPOS,
    RUN_AFTER_STOP, RUN_ALL_ON_STOP,
};
use crate::error::{MixdownError, Result};

/// Placeholder audio written for every rendered file.
const RENDERED_BYTES: &[u8] = b"RIFF\0\0\0\0WAVE";

/// Project state as seen by one render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSnapshot {
    pub tracks: Vec<Track>,
    pub master: Track,
    pub pattern: String,
    pub settings: f64,
    pub bounds_flag: f64,
    pub start: f64,
    pub end: f64,
    pub tempo_markers: Vec<TempoMarker>,
    pub run_all_on_stop: i64,
    pub run_after_stop: i64,
    pub cursor: f64,
}

impl RenderSnapshot {
    /// Names of tracks muted at render time.
    pub fn muted(&self) -> Vec<&str> {
        self.tracks
            .iter()
            .filter(|track| track.muted)
            .map(|track| track.name.as_str())
            .collect()
    }

    /// Names of tracks selected at render time.
    pub fn selected(&self) -> Vec<&str> {
        self.tracks
            .iter()
            .filter(|track| track.selected)
            .map(|track| track.name.as_str())
            .collect()
    }

    /// Normalized value of a parameter at render time.
    pub fn param(&self, param: &ParamRef) -> Option<f64> {
        let track = if param.track == self.master.id {
            &self.master
        } else {
            self.tracks.iter().find(|track| track.id == param.track)?
        };
        track
            .fxs
            .get(param.fx)?
            .params
            .get(param.param)
            .map(|p| p.normalized)
    }
}

#[derive(Debug)]
struct State {
    dir: PathBuf,
    tracks: Vec<Track>,
    master: Track,
    info_strings: HashMap<String, String>,
    info_values: HashMap<String, f64>,
    config_vars: HashMap<String, i64>,
    cursor: f64,
    tempo_markers: Vec<TempoMarker>,
    notes: String,
    opened: Vec<PathBuf>,
    renders: Vec<RenderSnapshot>,
    param_writes: Vec<(ParamRef, f64)>,
    saves: usize,
    fail_render_at: Option<usize>,
    fail_open: bool,
}

impl State {
    fn track_mut(&mut self, id: &TrackId) -> Result<&mut Track> {
        if self.master.id == *id {
            return Ok(&mut self.master);
        }
        self.tracks
            .iter_mut()
            .find(|track| track.id == *id)
            .ok_or_else(|| MixdownError::TrackNotFound { id: id.to_string() })
    }

    fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot {
            tracks: self.tracks.clone(),
            master: self.master.clone(),
            pattern: self.info_strings.get(RENDER_PATTERN).cloned().unwrap_or_default(),
            settings: self.info_values.get(RENDER_SETTINGS).copied().unwrap_or_default(),
            bounds_flag: self.info_values.get(RENDER_BOUNDSFLAG).copied().unwrap_or_default(),
            start: self.info_values.get(RENDER_STARTPOS).copied().unwrap_or_default(),
            end: self.info_values.get(RENDER_ENDPOS).copied().unwrap_or_default(),
            tempo_markers: self.tempo_markers.clone(),
            run_all_on_stop: self.config_vars.get(RUN_ALL_ON_STOP).copied().unwrap_or_default(),
            run_after_stop: self.config_vars.get(RUN_AFTER_STOP).copied().unwrap_or_default(),
            cursor: self.cursor,
        }
    }

    /// Write what the DAW would for the current render pattern.
    fn write_output(&self) -> Result<()> {
        let pattern = self.info_strings.get(RENDER_PATTERN).cloned().unwrap_or_default();

        // A pattern with wildcards below a directory renders one file per selected track.
        match pattern.split_once('/') {
            Some((dir, wildcards)) if wildcards.contains('$') => {
                let out_dir = self.dir.join(dir);
                fs::create_dir_all(&out_dir)?;
                let selected = self.tracks.iter().filter(|track| track.selected);
                for (index, track) in selected.enumerate() {
                    let file = out_dir.join(format!("{:02} - {}.wav", index + 1, track.name));
                    fs::write(file, RENDERED_BYTES)?;
                }
            }
            _ => fs::write(self.dir.join(format!("{pattern}.wav")), RENDERED_BYTES)?,
        }
        Ok(())
    }
}

/// In-memory stand-in for a project open in the DAW.
#[derive(Debug)]
pub struct MockProject {
    state: RefCell<State>,
}

impl MockProject {
    /// An empty project saved in `dir`, with the DAW's default preferences.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let info_strings = HashMap::from([(RENDER_PATTERN.to_string(), "$project".to_string())]);
        let info_values = HashMap::from([
            (RENDER_SETTINGS.to_string(), 0.0),
            (RENDER_BOUNDSFLAG.to_string(), 1.0),
            (RENDER_STARTPOS.to_string(), 0.0),
            (RENDER_ENDPOS.to_string(), 0.0),
        ]);
        let config_vars = HashMap::from([
            (RUN_ALL_ON_STOP.to_string(), 1),
            (RUN_AFTER_STOP.to_string(), 1),
            (OFFLINE_WHEN_INACTIVE.to_string(), 0),
        ]);

        Self {
            state: RefCell::new(State {
                dir: dir.into(),
                tracks: Vec::new(),
                master: Track::new("master", "MASTER"),
                info_strings,
                info_values,
                config_vars,
                cursor: 0.0,
                tempo_markers: Vec::new(),
                notes: String::new(),
                opened: Vec::new(),
                renders: Vec::new(),
                param_writes: Vec::new(),
                saves: 0,
                fail_render_at: None,
                fail_open: false,
            }),
        }
    }

    pub fn add_track(&self, track: Track) {
        self.state.borrow_mut().tracks.push(track);
    }

    pub fn set_master(&self, master: Track) {
        self.state.borrow_mut().master = master;
    }

    pub fn set_notes(&self, notes: &str) {
        self.state.borrow_mut().notes = notes.to_string();
    }

    /// Make the render with this zero-based index fail.
    pub fn fail_render_at(&self, index: usize) {
        self.state.borrow_mut().fail_render_at = Some(index);
    }

    /// Make opening any other project fail.
    pub fn fail_open(&self) {
        self.state.borrow_mut().fail_open = true;
    }

    /// Current snapshot of a track, master included.
    pub fn track(&self, id: &str) -> Option<Track> {
        let state = self.state.borrow();
        if state.master.id.0 == id {
            return Some(state.master.clone());
        }
        state.tracks.iter().find(|track| track.id.0 == id).cloned()
    }

    /// Snapshot of the current state, as a render would see it.
    pub fn snapshot(&self) -> RenderSnapshot {
        self.state.borrow().snapshot()
    }

    /// State seen by each attempted render, in order.
    pub fn renders(&self) -> Vec<RenderSnapshot> {
        self.state.borrow().renders.clone()
    }

    pub fn saves(&self) -> usize {
        self.state.borrow().saves
    }

    pub fn opened_files(&self) -> Vec<PathBuf> {
        self.state.borrow().opened.clone()
    }

    pub fn param_writes(&self) -> Vec<(ParamRef, f64)> {
        self.state.borrow().param_writes.clone()
    }
}

impl ProjectHandle for MockProject {
    fn tracks(&self) -> Result<Vec<Track>> {
        Ok(self.state.borrow().tracks.clone())
    }

    fn master_track(&self) -> Result<Track> {
        Ok(self.state.borrow().master.clone())
    }

    fn project_dir(&self) -> Result<PathBuf> {
        Ok(self.state.borrow().dir.clone())
    }

    fn open_project(&self, file: &Path) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_open {
            return Err(MixdownError::Bridge {
                method: "open_project".to_string(),
                message: format!("cannot open {}", file.display()),
            });
        }
        state.opened.push(file.to_path_buf());
        state.dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(())
    }

    fn track_flag(&self, track: &TrackId, flag: TrackFlag) -> Result<bool> {
        let mut state = self.state.borrow_mut();
        let track = state.track_mut(track)?;
        Ok(match flag {
            TrackFlag::Mute => track.muted,
            TrackFlag::Solo => track.soloed,
            TrackFlag::Select => track.selected,
        })
    }

    fn set_track_flag(&self, track: &TrackId, flag: TrackFlag, value: bool) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let track = state.track_mut(track)?;
        match flag {
            TrackFlag::Mute => track.muted = value,
            TrackFlag::Solo => track.soloed = value,
            TrackFlag::Select => track.selected = value,
        }
        Ok(())
    }

    fn fx_enabled(&self, track: &TrackId, fx: usize) -> Result<bool> {
        let mut state = self.state.borrow_mut();
        let track = state.track_mut(track)?;
        track
            .fxs
            .get(fx)
            .map(|fx| fx.enabled)
            .ok_or_else(|| MixdownError::Bridge {
                method: "fx_enabled".to_string(),
                message: format!("no FX {fx} on track {}", track.id),
            })
    }

    fn set_fx_enabled(&self, track: &TrackId, fx: usize, enabled: bool) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let track = state.track_mut(track)?;
        let id = track.id.clone();
        let effect = track.fxs.get_mut(fx).ok_or_else(|| MixdownError::Bridge {
            method: "set_fx_enabled".to_string(),
            message: format!("no FX {fx} on track {id}"),
        })?;
        effect.enabled = enabled;
        Ok(())
    }

    fn param_normalized(&self, param: &ParamRef) -> Result<f64> {
        let mut state = self.state.borrow_mut();
        let track = state.track_mut(&param.track)?;
        track
            .fxs
            .get(param.fx)
            .and_then(|fx| fx.params.get(param.param))
            .map(|p| p.normalized)
            .ok_or_else(|| MixdownError::Bridge {
                method: "param_normalized".to_string(),
                message: format!("no parameter {param:?}"),
            })
    }

    fn set_param_normalized(&self, param: &ParamRef, value: f64) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let target = state
            .track_mut(&param.track)?
            .fxs
            .get_mut(param.fx)
            .and_then(|fx| fx.params.get_mut(param.param))
            .ok_or_else(|| MixdownError::Bridge {
                method: "set_param_normalized".to_string(),
                message: format!("no parameter {param:?}"),
            })?;
        target.normalized = value;
        state.param_writes.push((param.clone(), value));
        Ok(())
    }

    fn info_string(&self, key: &str) -> Result<String> {
        Ok(self
            .state
            .borrow()
            .info_strings
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    fn set_info_string(&self, key: &str, value: &str) -> Result<()> {
        self.state
            .borrow_mut()
            .info_strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn info_value(&self, key: &str) -> Result<f64> {
        Ok(self
            .state
            .borrow()
            .info_values
            .get(key)
            .copied()
            .unwrap_or_default())
    }

    fn set_info_value(&self, key: &str, value: f64) -> Result<()> {
        self.state
            .borrow_mut()
            .info_values
            .insert(key.to_string(), value);
        Ok(())
    }

    fn int_config_var(&self, name: &str) -> Result<i64> {
        self.state
            .borrow()
            .config_vars
            .get(name)
            .copied()
            .ok_or_else(|| MixdownError::Bridge {
                method: "int_config_var".to_string(),
                message: format!("unknown preference {name}"),
            })
    }

    fn set_int_config_var(&self, name: &str, value: i64) -> Result<()> {
        self.state
            .borrow_mut()
            .config_vars
            .insert(name.to_string(), value);
        Ok(())
    }

    fn cursor_position(&self) -> Result<f64> {
        Ok(self.state.borrow().cursor)
    }

    fn set_cursor_position(&self, position: f64) -> Result<()> {
        self.state.borrow_mut().cursor = position;
        Ok(())
    }

    fn tempo_markers(&self) -> Result<Vec<TempoMarker>> {
        Ok(self.state.borrow().tempo_markers.clone())
    }

    fn set_tempo_markers(&self, markers: &[TempoMarker]) -> Result<()> {
        self.state.borrow_mut().tempo_markers = markers.to_vec();
        Ok(())
    }

    fn notes(&self) -> Result<String> {
        Ok(self.state.borrow().notes.clone())
    }

    fn render(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let index = state.renders.len();
        let snapshot = state.snapshot();
        state.renders.push(snapshot);

        if state.fail_render_at == Some(index) {
            return Err(MixdownError::Bridge {
                method: "render".to_string(),
                message: "render aborted".to_string(),
            });
        }
        state.write_output()
    }

    fn save(&self) -> Result<()> {
        self.state.borrow_mut().saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_render_writes_pattern_file() {
        let dir = tempdir().unwrap();
        let project = MockProject::new(dir.path());
        project.set_info_string(RENDER_PATTERN, "Song 123456.tmp").unwrap();

        project.render().unwrap();
        assert!(dir.path().join("Song 123456.tmp.wav").is_file());
        assert_eq!(project.renders()[0].pattern, "Song 123456.tmp");
    }

    #[test]
    fn test_render_stems_pattern_writes_selected_tracks() {
        let dir = tempdir().unwrap();
        let project = MockProject::new(dir.path());
        let mut keys = Track::new("1", "Keys");
        keys.selected = true;
        project.add_track(keys);
        project.add_track(Track::new("2", "Bass"));
        project
            .set_info_string(RENDER_PATTERN, "Stems 1.tmp/$folders $tracknumber - $track")
            .unwrap();

        project.render().unwrap();
        let out = dir.path().join("Stems 1.tmp");
        assert!(out.join("01 - Keys.wav").is_file());
        assert_eq!(fs::read_dir(out).unwrap().count(), 1);
    }

    #[test]
    fn test_failing_render_is_recorded() {
        let dir = tempdir().unwrap();
        let project = MockProject::new(dir.path());
        project.fail_render_at(0);

        assert!(project.render().is_err());
        assert_eq!(project.renders().len(), 1);
        assert!(project.render().is_ok());
    }

    #[test]
    fn test_unknown_track() {
        let project = MockProject::new("/music/Song");
        let err = project
            .track_flag(&TrackId::new("nope"), TrackFlag::Mute)
            .unwrap_err();
        assert_eq!(err.error_code(), "TRACK_NOT_FOUND");
    }
}
