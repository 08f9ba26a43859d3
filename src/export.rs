//! Album export
//!
//! Copies finished renders into a directory under album-ordered names.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{MixdownError, Result};
use crate::tools::lame::is_up_to_date;

/// What happened to one exported file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exported {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// False when the destination was already newer than the source.
    pub copied: bool,
}

/// Album-ordered name for the file at 1-based `position`, e.g. `03 - Song.wav`.
pub fn album_file_name(position: usize, source: &Path) -> String {
    let name = source
        .with_extension("wav")
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{position:02} - {name}")
}

/// Copy `files` into `destination` in the given order.
pub fn export_files(destination: &Path, files: &[PathBuf]) -> Result<Vec<Exported>> {
    if let Some(missing) = files.iter().find(|file| !file.is_file()) {
        return Err(MixdownError::InvalidArgument {
            reason: format!("not a file: {}", missing.display()),
        });
    }
    fs::create_dir_all(destination)?;

    let mut exported = Vec::with_capacity(files.len());
    for (index, source) in files.iter().enumerate() {
        let target = destination.join(album_file_name(index + 1, source));
        let copied = if is_up_to_date(source, &target)? {
            debug!("Skipping up-to-date {}", target.display());
            false
        } else {
            info!("Exporting {} to {}", source.display(), target.display());
            fs::copy(source, &target)?;
            true
        };
        exported.push(Exported {
            source: source.clone(),
            destination: target,
            copied,
        });
    }
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_album_file_name() {
        assert_eq!(album_file_name(3, Path::new("/a/Song.wav")), "03 - Song.wav");
        assert_eq!(album_file_name(12, Path::new("/a/Song.aiff")), "12 - Song.wav");
    }

    #[test]
    fn test_export_in_order_and_skip_newer() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let album = dst.path().join("Album");
        let first = src.path().join("Intro.wav");
        let second = src.path().join("Outro.wav");
        fs::write(&first, b"1").unwrap();
        fs::write(&second, b"2").unwrap();

        let files = vec![second.clone(), first.clone()];
        let exported = export_files(&album, &files).unwrap();
        assert_eq!(exported[0].destination, album.join("01 - Outro.wav"));
        assert_eq!(exported[1].destination, album.join("02 - Intro.wav"));
        assert!(exported.iter().all(|e| e.copied));
        assert_eq!(fs::read(album.join("01 - Outro.wav")).unwrap(), b"2");

        std::thread::sleep(std::time::Duration::from_millis(20));
        let again = export_files(&album, &files).unwrap();
        assert!(again.iter().all(|e| !e.copied));
    }

    #[test]
    fn test_export_rejects_missing_file() {
        let dst = tempdir().unwrap();
        let err = export_files(dst.path(), &[PathBuf::from("/nonexistent.wav")]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }
}
