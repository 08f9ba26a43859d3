//! Configuration
//!
//! Connection details and credentials, each settable by flag or environment
//! variable.

use std::path::PathBuf;

use clap::Args;

use crate::daw::bridge::{DEFAULT_BRIDGE_URL, DEFAULT_WEB_PORT};
use crate::error::{MixdownError, Result};
use crate::upload::soundcloud::DEFAULT_USER_ID;

/// Where the DAW executable lives on a standard macOS install.
pub const DEFAULT_DAW_EXECUTABLE: &str = "/Applications/REAPER.app/Contents/MacOS/REAPER";

pub const OAUTH_TOKEN_ENV: &str = "SOUNDCLOUD_OAUTH_TOKEN";

/// Settings shared by every command.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct Settings {
    /// Scripting bridge running inside the DAW
    #[arg(long, env = "MIXDOWN_DAW_BRIDGE_URL", default_value = DEFAULT_BRIDGE_URL, global = true)]
    pub daw_bridge_url: String,

    /// Port of the DAW web interface, used to trigger renders
    #[arg(long, env = "MIXDOWN_DAW_WEB_PORT", default_value_t = DEFAULT_WEB_PORT, global = true)]
    pub daw_web_port: u16,

    /// DAW executable, used to exit the DAW
    #[arg(long, env = "MIXDOWN_DAW_EXECUTABLE", default_value = DEFAULT_DAW_EXECUTABLE, global = true)]
    pub daw_executable: PathBuf,

    /// SoundCloud OAuth token
    #[arg(long, env = OAUTH_TOKEN_ENV, hide_env_values = true, global = true)]
    pub oauth_token: Option<String>,

    /// Additional HTTP headers for SoundCloud, as `Name: value` lines
    #[arg(long, env = "SOUNDCLOUD_ADDITIONAL_HEADERS", default_value = "", hide_env_values = true, global = true)]
    pub additional_headers: String,

    /// SoundCloud account whose tracks are replaced
    #[arg(long, env = "SOUNDCLOUD_USER_ID", default_value_t = DEFAULT_USER_ID, global = true)]
    pub soundcloud_user_id: u64,

    /// Artist tag for encoded files
    #[arg(long, env = "MIXDOWN_ARTIST", default_value = "", global = true)]
    pub artist: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            daw_bridge_url: DEFAULT_BRIDGE_URL.to_string(),
            daw_web_port: DEFAULT_WEB_PORT,
            daw_executable: PathBuf::from(DEFAULT_DAW_EXECUTABLE),
            oauth_token: None,
            additional_headers: String::new(),
            soundcloud_user_id: DEFAULT_USER_ID,
            artist: String::new(),
        }
    }
}

impl Settings {
    /// The OAuth token, required for anything that uploads.
    pub fn require_oauth_token(&self) -> Result<&str> {
        self.oauth_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| MixdownError::MissingConfig {
                name: OAUTH_TOKEN_ENV.to_string(),
            })
    }

    pub fn parsed_additional_headers(&self) -> Result<Vec<(String, String)>> {
        parse_headers(&self.additional_headers)
    }
}

/// Parse `Name: value` header lines. Blank lines are ignored.
pub fn parse_headers(text: &str) -> Result<Vec<(String, String)>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (name, value) =
                line.split_once(':')
                    .ok_or_else(|| MixdownError::InvalidArgument {
                        reason: format!("header line without a colon: \"{line}\""),
                    })?;
            Ok((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
