//! Mixdown CLI
//!
//! Command-line entry point for the release workflow.

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mixdown::cli::commands;
use mixdown::cli::{Cli, Commands};
use mixdown::Result;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    debug!("Mixdown v{}", env!("CARGO_PKG_VERSION"));

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(hint) = e.recovery_suggestion() {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let settings = &cli.settings;
    match &cli.command {
        Commands::Render(args) => commands::render(settings, args),
        Commands::Stat { paths } => commands::stat(settings, paths),
        Commands::Tag { files } => commands::tag(settings, files),
        Commands::Export { dst_dir, files } => commands::export(dst_dir, files),
        Commands::Path => commands::path(settings),
        Commands::Upload {
            project_dirs,
            versions,
        } => commands::upload(settings, project_dirs, &versions.versions()),
    }
}

/// Initialize tracing based on verbosity level
fn init_logging(cli: &Cli) {
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
