//! MP3 encoding and tagging with lame

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{MixdownError, Result};
use crate::tools::CommandRunner;

pub const LAME: &str = "lame";

/// Tags derived from an album-ordered file name like `03 - Title.wav`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: String,
    pub album: String,
    pub number: String,
    pub title: String,
}

impl TrackTags {
    /// Album is the containing directory; number and title come from the stem.
    pub fn for_file(file: &Path, artist: &str) -> Self {
        let album = file
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (number, title) = match stem.split_once(" - ") {
            Some((number, title)) => (number.to_string(), title.to_string()),
            None => (stem, String::new()),
        };

        Self {
            artist: artist.to_string(),
            album,
            number,
            title,
        }
    }
}

/// True if `output` exists and was modified after `input`.
pub(crate) fn is_up_to_date(input: &Path, output: &Path) -> Result<bool> {
    if !output.exists() {
        return Ok(false);
    }
    let input_modified = fs::metadata(input)?.modified()?;
    let output_modified = fs::metadata(output)?.modified()?;
    Ok(input_modified < output_modified)
}

/// Encode a `.wav` file to a tagged `.mp3` beside it.
///
/// Returns `None` when the existing `.mp3` is already newer than the input.
pub fn encode_and_tag(
    runner: &dyn CommandRunner,
    input: &Path,
    artist: &str,
) -> Result<Option<PathBuf>> {
    if !input.is_file() {
        return Err(MixdownError::InvalidArgument {
            reason: format!("not a file: {}", input.display()),
        });
    }

    let output = input.with_extension("mp3");
    if is_up_to_date(input, &output)? {
        debug!("Skipping up-to-date {}", output.display());
        return Ok(None);
    }

    let tags = TrackTags::for_file(input, artist);
    let args: Vec<OsString> = vec![
        "--preset".into(),
        "standard".into(),
        "--ta".into(),
        tags.artist.into(),
        "--tl".into(),
        tags.album.into(),
        "--tn".into(),
        tags.number.into(),
        "--tt".into(),
        tags.title.into(),
        input.into(),
        output.clone().into(),
    ];

    info!("Encoding {}", input.display());
    runner.run(LAME, &args)?;
    Ok(Some(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::MockRunner;
    use tempfile::tempdir;

    #[test]
    fn test_tags_for_file() {
        let tags = TrackTags::for_file(Path::new("/albums/Night Drive/03 - Neon.wav"), "Bluu");
        assert_eq!(
            tags,
            TrackTags {
                artist: "Bluu".to_string(),
                album: "Night Drive".to_string(),
                number: "03".to_string(),
                title: "Neon".to_string(),
            }
        );
    }

    #[test]
    fn test_tags_without_number() {
        let tags = TrackTags::for_file(Path::new("/albums/A/Neon.wav"), "Bluu");
        assert_eq!(tags.number, "Neon");
        assert_eq!(tags.title, "");
    }

    #[test]
    fn test_encode_and_tag() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("01 - Intro.wav");
        fs::write(&input, b"wav").unwrap();

        let runner = MockRunner::new();
        let output = encode_and_tag(&runner, &input, "Bluu").unwrap();
        assert_eq!(output, Some(dir.path().join("01 - Intro.mp3")));

        let call = &runner.calls_to(LAME)[0];
        assert_eq!(&call[1..3], &["--preset".to_string(), "standard".to_string()]);
        assert!(call.contains(&"Intro".to_string()));
        assert!(call.contains(&"01".to_string()));
    }

    #[test]
    fn test_encode_skips_newer_mp3() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("01 - Intro.wav");
        fs::write(&input, b"wav").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(dir.path().join("01 - Intro.mp3"), b"mp3").unwrap();

        let runner = MockRunner::new();
        assert_eq!(encode_and_tag(&runner, &input, "Bluu").unwrap(), None);
        assert!(runner.calls().is_empty());
    }
}
