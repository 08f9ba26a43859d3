//! Mixdown - Release Workflow for DAW Projects
//!
//! Renders the release versions of a song project (main mix, instrumental,
//! DJ instrumental, a cappella and stems), reports loudness statistics, and
//! replaces the matching tracks on SoundCloud.
//!
//! # Architecture
//!
//! - [`daw`]: the open project, reached through a scripting bridge
//! - [`render`]: scoped setting changes and the render orchestration
//! - [`tools`]: ffmpeg and lame subprocesses
//! - [`upload`]: concurrent track replacement
//! - [`cli`]: command-line surface

pub mod cli;
pub mod config;
pub mod daw;
pub mod error;
pub mod export;
pub mod render;
pub mod tools;
pub mod upload;

pub use error::{MixdownError, Result};
