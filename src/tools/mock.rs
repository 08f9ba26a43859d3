//! Mock command runner for testing
//!
//! Answers ffmpeg, ffprobe and lame invocations with canned output and
//! creates the output files those tools would write, without running them.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{MixdownError, Result};
use crate::tools::{CommandOutput, CommandRunner};

/// Records every invocation and simulates tool output.
#[derive(Debug, Default)]
pub struct MockRunner {
    stats_output: String,
    duration_output: String,
    failing: HashSet<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            stats_output: String::new(),
            duration_output: "[FORMAT]\nduration=N/A\n[/FORMAT]\n".to_string(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Diagnostic text ffmpeg reports for loudness measurements.
    pub fn with_stats_output(mut self, stderr: &str) -> Self {
        self.stats_output = stderr.to_string();
        self
    }

    /// Duration ffprobe reports for every file, in seconds.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_output = format!("[FORMAT]\nduration={secs}\n[/FORMAT]\n");
        self
    }

    /// Make every invocation of `program` fail.
    pub fn failing(mut self, program: &str) -> Self {
        self.failing.insert(program.to_string());
        self
    }

    /// All invocations so far, program first.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Invocations of one program.
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|call| call.first().is_some_and(|p| p == program))
            .collect()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|arg| arg.to_string_lossy().into_owned()));
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }

        if self.failing.contains(program) {
            return Err(MixdownError::ToolFailed {
                program: program.to_string(),
                status: "exit status: 1".to_string(),
                stderr: "mock failure".to_string(),
            });
        }

        match program {
            "ffprobe" => Ok(CommandOutput {
                stdout: self.duration_output.clone(),
                stderr: String::new(),
            }),
            "ffmpeg" | "lame" => {
                if let Some(out) = args.last().map(Path::new) {
                    if out != Path::new("/dev/null") {
                        fs::write(out, b"")?;
                    }
                }
                Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: self.stats_output.clone(),
                })
            }
            _ => Ok(CommandOutput::default()),
        }
    }
}
