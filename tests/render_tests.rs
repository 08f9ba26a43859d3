//! Render workflow tests against an in-memory project

use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use tempfile::{tempdir, TempDir};

use mixdown::daw::{
    Fx, FxParam, MediaItem, MockProject, ParamRef, ProjectHandle, TempoMarker, Track, TrackFlag,
    TrackId, OFFLINE_WHEN_INACTIVE,
};
use mixdown::render::{render_project, RenderOptions, SongVersion};
use mixdown::tools::MockRunner;
use mixdown::MixdownError;

fn track(id: &str, name: &str, position: f64, length: f64) -> Track {
    let mut track = Track::new(id, name);
    track.items.push(MediaItem::new(position, length));
    track
}

fn master_with_limiter(threshold: f64) -> Track {
    let mut master = Track::new("master", "MASTER");
    master.fxs.push(Fx {
        name: "VST: ReaEQ".to_string(),
        enabled: true,
        params: vec![],
    });
    master.fxs.push(Fx {
        name: "VST: Pro-L 2 Limiter".to_string(),
        enabled: true,
        params: vec![
            FxParam {
                name: "Gain".to_string(),
                normalized: 0.0,
            },
            FxParam {
                name: "Threshold".to_string(),
                normalized: threshold,
            },
        ],
    });
    master
}

fn threshold_param() -> ParamRef {
    ParamRef {
        track: TrackId::new("master"),
        fx: 1,
        param: 1,
    }
}

/// A project `Song` with vocals over drums and a limiter at 0.5.
fn song_project() -> (TempDir, MockProject) {
    let dir = tempdir().unwrap();
    let project_dir = dir.path().join("Song");
    fs::create_dir(&project_dir).unwrap();

    let project = MockProject::new(&project_dir);
    project.set_master(master_with_limiter(0.5));
    project.add_track(track("1", "Vocals", 5.0, 10.0));
    project.add_track(track("2", "Drums", 0.0, 30.0));
    (dir, project)
}

fn render(project: &MockProject, versions: &[SongVersion]) -> mixdown::Result<Vec<SongVersion>> {
    let runner = MockRunner::new().with_duration(30.0);
    let outcomes = render_project(project, &runner, versions, &RenderOptions::default(), &())?;
    Ok(outcomes.iter().map(|o| o.result.version()).collect())
}

fn wav_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".wav"))
        .collect();
    names.sort();
    names
}

#[test]
fn test_main_only() {
    let (_dir, project) = song_project();
    let project_dir = project.project_dir().unwrap();

    let rendered = render(&project, &[SongVersion::Main]).unwrap();

    assert_eq!(rendered, vec![SongVersion::Main]);
    assert_eq!(wav_files(&project_dir), vec!["Song.wav".to_string()]);
    assert_eq!(project.saves(), 1);
    assert!(project.param_writes().is_empty());
}

#[test]
fn test_instrumental_and_acappella_compensate_limiter() {
    let (_dir, project) = song_project();
    let project_dir = project.project_dir().unwrap();

    let rendered = render(
        &project,
        &[SongVersion::Acappella, SongVersion::Instrumental],
    )
    .unwrap();

    assert_eq!(rendered, vec![SongVersion::Instrumental, SongVersion::Acappella]);
    let renders = project.renders();
    assert_eq!(renders.len(), 2);
    for snapshot in &renders {
        let during = snapshot.param(&threshold_param()).unwrap();
        assert_relative_eq!(during, 0.47222, epsilon = 1e-5);
    }
    assert_eq!(renders[0].muted(), vec!["Vocals"]);
    assert_eq!(renders[1].muted(), vec!["Drums"]);

    assert_eq!(project.snapshot().param(&threshold_param()), Some(0.5));
    assert!(project.snapshot().muted().is_empty());
    assert_eq!(
        wav_files(&project_dir),
        vec![
            "Song (A Cappella).wav".to_string(),
            "Song (Instrumental).wav".to_string(),
        ]
    );
    assert_eq!(project.saves(), 1);
}

#[test]
fn test_render_bounds_follow_audible_items() {
    let (_dir, project) = song_project();

    render(&project, &[SongVersion::Main, SongVersion::Acappella]).unwrap();

    let renders = project.renders();
    assert_eq!((renders[0].start, renders[0].end), (0.0, 30.0));
    assert_eq!((renders[1].start, renders[1].end), (5.0, 15.0));
    for snapshot in &renders {
        assert_eq!(snapshot.bounds_flag, 0.0);
        assert_eq!(snapshot.run_all_on_stop, 0);
        assert_eq!(snapshot.run_after_stop, 0);
    }

    let after = project.snapshot();
    assert_eq!(after.bounds_flag, 1.0);
    assert_eq!(after.pattern, "$project");
    assert_eq!((after.run_all_on_stop, after.run_after_stop), (1, 1));
}

#[test]
fn test_nothing_to_render_without_vocals() {
    let dir = tempdir().unwrap();
    let project = MockProject::new(dir.path().join("Beat"));
    project.set_master(master_with_limiter(0.5));
    project.add_track(track("1", "Drums", 0.0, 30.0));

    let err = render(&project, &[SongVersion::Instrumental, SongVersion::Acappella]).unwrap_err();
    assert!(matches!(err, MixdownError::NothingToRender));
    assert!(project.renders().is_empty());
    assert_eq!(project.saves(), 0);

    fs::create_dir(dir.path().join("Beat")).unwrap();
    let rendered = render(&project, &[SongVersion::Main]).unwrap();
    assert_eq!(rendered, vec![SongVersion::Main]);
}

#[test]
fn test_dry_run_leaves_no_output() {
    let (_dir, project) = song_project();
    let project_dir = project.project_dir().unwrap();
    let runner = MockRunner::new().with_duration(30.0);
    let options = RenderOptions {
        dry_run: true,
        vocal_loudness_worth: None,
    };

    let outcomes = render_project(
        &project,
        &runner,
        &[SongVersion::Main, SongVersion::Acappella],
        &options,
        &(),
    )
    .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(wav_files(&project_dir).is_empty());
    // Measured while the output still existed.
    assert_eq!(
        outcomes[0].result.duration(&runner).unwrap().as_secs(),
        30
    );
    assert!(!outcomes[1].result.path().exists());
}

#[test]
fn test_dj_instrumental_needs_vox() {
    let (_dir, project) = song_project();

    let err = render(&project, &[SongVersion::InstrumentalDJ]).unwrap_err();
    assert!(matches!(err, MixdownError::NothingToRender));

    project.add_track(track("3", "Chop (Vox)", 0.0, 2.0));
    project
        .set_tempo_markers(&[
            TempoMarker {
                position: 0.0,
                bpm: 120.0,
            },
            TempoMarker {
                position: 20.0,
                bpm: 90.0,
            },
        ])
        .unwrap();

    let rendered = render(
        &project,
        &[SongVersion::Instrumental, SongVersion::InstrumentalDJ],
    )
    .unwrap();
    assert_eq!(
        rendered,
        vec![SongVersion::Instrumental, SongVersion::InstrumentalDJ]
    );

    let renders = project.renders();
    assert_eq!(renders[0].muted(), vec!["Vocals", "Chop (Vox)"]);
    assert_eq!(renders[0].tempo_markers.len(), 2);
    assert_eq!(renders[1].muted(), vec!["Vocals"]);
    assert_eq!(
        renders[1].tempo_markers,
        vec![TempoMarker {
            position: 0.0,
            bpm: 120.0
        }]
    );
    assert_eq!(project.tempo_markers().unwrap().len(), 2);
}

#[test]
fn test_stems_render_selected_tracks() {
    let (_dir, project) = song_project();
    let project_dir = project.project_dir().unwrap();
    let mut bus = Track::new("3", "Reverb Bus");
    bus.fxs.push(Fx {
        name: "ReaVerb".to_string(),
        enabled: true,
        params: vec![],
    });
    project.add_track(bus);
    let mut folder = Track::new("4", "Folder");
    folder.selected = true;
    project.add_track(folder);

    render(&project, &[SongVersion::Stems]).unwrap();

    let snapshot = &project.renders()[0];
    assert_eq!(snapshot.selected(), vec!["Vocals", "Drums", "Reverb Bus"]);
    assert_eq!(snapshot.settings, 144.0);
    assert!(snapshot.master.fxs.iter().all(|fx| !fx.enabled));
    assert!(snapshot.pattern.ends_with(".tmp/$folders $tracknumber - $track"));

    let stems = project_dir.join("Song (Stems)");
    assert_eq!(wav_files(&stems).len(), 3);

    let after = project.snapshot();
    assert_eq!(after.selected(), vec!["Folder"]);
    assert_eq!(after.settings, 0.0);
    assert!(after.master.fxs.iter().all(|fx| fx.enabled));
}

#[test]
fn test_failure_mid_render_restores_project() {
    let (_dir, project) = song_project();
    let project_dir = project.project_dir().unwrap();
    let before = project.snapshot();
    project.fail_render_at(1);

    let err = render(
        &project,
        &[SongVersion::Instrumental, SongVersion::Acappella],
    )
    .unwrap_err();

    match err {
        MixdownError::RenderFailed { version, source } => {
            assert_eq!(version, SongVersion::Acappella);
            assert_eq!(source.error_code(), "BRIDGE_ERROR");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(project.snapshot(), before);
    assert_eq!(project.saves(), 0);
    assert_eq!(
        wav_files(&project_dir),
        vec!["Song (Instrumental).wav".to_string()]
    );
}

#[test]
fn test_missing_limiter_touches_nothing() {
    let (_dir, project) = song_project();
    project.set_master(Track::new("master", "MASTER"));
    let before = project.snapshot();

    let err = render(&project, &[SongVersion::Main, SongVersion::Instrumental]).unwrap_err();

    assert_eq!(err.error_code(), "MASTER_LIMITER_NOT_FOUND");
    assert!(project.renders().is_empty());
    assert_eq!(project.snapshot(), before);
}

#[test]
fn test_zero_vocal_loudness_worth_skips_limiter() {
    let (_dir, project) = song_project();
    project.set_master(Track::new("master", "MASTER"));
    project.set_notes(r#"{"vocal-loudness-worth": "0"}"#);

    let rendered = render(&project, &[SongVersion::Instrumental]).unwrap();

    assert_eq!(rendered, vec![SongVersion::Instrumental]);
    assert!(project.param_writes().is_empty());
}

#[test]
fn test_vocal_loudness_worth_from_notes() {
    let (_dir, project) = song_project();
    project.set_notes(r#"{"vocal-loudness-worth": 7.2}"#);

    render(&project, &[SongVersion::Instrumental]).unwrap();

    let during = project.renders()[0].param(&threshold_param()).unwrap();
    assert_relative_eq!(during, 0.4, epsilon = 1e-9);
}

#[test]
fn test_offline_media_preference_blocks_rendering() {
    let (_dir, project) = song_project();
    project.set_int_config_var(OFFLINE_WHEN_INACTIVE, 1).unwrap();

    let err = render(&project, &[SongVersion::Main]).unwrap_err();

    assert_eq!(err.error_code(), "PREFERENCE_MISCONFIGURED");
    assert_eq!(err.exit_code(), 2);
    assert!(project.renders().is_empty());
}

#[test]
fn test_main_unmutes_vocals_for_good() {
    let (_dir, project) = song_project();
    project
        .set_track_flag(&TrackId::new("1"), TrackFlag::Mute, true)
        .unwrap();

    render(&project, &[SongVersion::Main]).unwrap();

    assert!(project.renders()[0].muted().is_empty());
    assert!(!project.track("1").unwrap().muted);
}

#[test]
fn test_stems_include_vocals_muted_beforehand() {
    let (_dir, project) = song_project();
    let project_dir = project.project_dir().unwrap();
    project
        .set_track_flag(&TrackId::new("1"), TrackFlag::Mute, true)
        .unwrap();

    render(&project, &[SongVersion::Stems]).unwrap();

    let snapshot = &project.renders()[0];
    assert!(snapshot.muted().is_empty());
    assert_eq!(snapshot.selected(), vec!["Vocals", "Drums"]);
    assert_eq!(wav_files(&project_dir.join("Song (Stems)")).len(), 2);
}
