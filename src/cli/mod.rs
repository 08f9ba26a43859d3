//! CLI Module
//!
//! Command-line interface for the release workflow.

pub mod commands;
pub mod progress;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::Settings;
use crate::render::SongVersion;

/// Mixdown - render, measure, tag and upload the versions of a song
#[derive(Parser, Debug)]
#[command(name = "mixdown")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render vocal, instrumental, etc. versions of projects
    ///
    /// Renders the currently open project unless project directories are
    /// given. Overwrites existing versions and prints statistics for each.
    #[command(name = "render")]
    Render(RenderArgs),

    /// Print loudness statistics of files, or of a project's renders
    #[command(name = "stat")]
    Stat {
        /// Audio files or project directories, defaulting to the open project
        paths: Vec<PathBuf>,
    },

    /// Encode .wav files to tagged .mp3 files
    #[command(name = "tag")]
    Tag {
        /// Files named like `NN - Title.wav` inside an album directory
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Copy files into a directory in album order
    #[command(name = "export")]
    Export {
        /// Destination directory, created if missing
        dst_dir: PathBuf,

        /// Files, in album order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the directory of the open project
    #[command(name = "path")]
    Path,

    /// Upload existing renders of projects to SoundCloud
    #[command(name = "upload")]
    Upload {
        /// Project directories, defaulting to the open project
        project_dirs: Vec<PathBuf>,

        #[command(flatten)]
        versions: VersionFlags,
    },
}

/// Arguments of the `render` command.
#[derive(Args, Debug, Clone, Default)]
pub struct RenderArgs {
    /// Project directories, defaulting to the open project
    pub project_dirs: Vec<PathBuf>,

    #[command(flatten)]
    pub versions: VersionFlags,

    /// Render and report, then delete the output
    #[arg(long)]
    pub dry_run: bool,

    /// Exit the DAW once everything rendered
    #[arg(long)]
    pub exit: bool,

    /// Also upload the rendered files to SoundCloud
    #[arg(long)]
    pub upload: bool,

    /// Also upload existing renders of versions not being rendered
    #[arg(long)]
    pub upload_existing: bool,

    /// dB the vocals add to loudness, made up for when they're muted.
    /// Defaults to `vocal-loudness-worth` in the project notes, or 2.0
    #[arg(long)]
    pub vocal_loudness_worth: Option<f64>,
}

/// Version selection. Without any flag, the default versions are included.
#[derive(Args, Debug, Clone, Default)]
pub struct VersionFlags {
    /// Include the main version
    #[arg(long)]
    pub include_main: bool,

    /// Include the instrumental version
    #[arg(long)]
    pub include_instrumental: bool,

    /// Include the DJ instrumental version, which keeps vocal samples
    #[arg(long)]
    pub include_instrumental_dj: bool,

    /// Include the a cappella version
    #[arg(long)]
    pub include_acappella: bool,

    /// Include stems
    #[arg(long)]
    pub include_stems: bool,
}

impl VersionFlags {
    pub fn versions(&self) -> Vec<SongVersion> {
        let selected: Vec<SongVersion> = [
            (self.include_main, SongVersion::Main),
            (self.include_instrumental, SongVersion::Instrumental),
            (self.include_instrumental_dj, SongVersion::InstrumentalDJ),
            (self.include_acappella, SongVersion::Acappella),
            (self.include_stems, SongVersion::Stems),
        ]
        .into_iter()
        .filter_map(|(included, version)| included.then_some(version))
        .collect();

        if selected.is_empty() {
            SongVersion::DEFAULT.to_vec()
        } else {
            selected
        }
    }
}
