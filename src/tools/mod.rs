//! External Tools
//!
//! Loudness analysis, media probing, silence trimming and encoding are
//! delegated to external binaries. Everything goes through
//! [`CommandRunner`] so tests can substitute canned output.

pub mod ffmpeg;
pub mod lame;
pub mod mock;

use std::ffi::OsString;
use std::io;
use std::process::Command;

use tracing::debug;

use crate::error::{MixdownError, Result};

pub use mock::MockRunner;

/// Captured output of a finished external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs to completion.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, failing on a non-zero exit status.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput>;
}

/// Runs programs found on the system `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput> {
        debug!("Running {} {:?}", program, args);

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => MixdownError::ToolFailed {
                    program: program.to_string(),
                    status: "not found".to_string(),
                    stderr: e.to_string(),
                },
                _ => MixdownError::Io(e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(MixdownError::ToolFailed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}
