//! Directory scanning for playable videos.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::Error;

/// Extensions (lowercase, without dot) the player accepts.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv"];

/// Return `true` if `path` carries a supported video extension.
#[must_use]
pub fn is_supported_video(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)
}

fn is_mkv(path: &Path) -> bool {
    extension_of(path).as_deref() == Some("mkv")
}

/// Validate a user supplied video file name.
///
/// # Errors
/// Returns [`Error::UnsupportedExtension`] for anything that is not `.mp4`/`.mkv`.
pub fn check_video_name(name: &str) -> Result<String, Error> {
    if is_supported_video(Path::new(name)) {
        Ok(name.to_string())
    } else {
        Err(Error::UnsupportedExtension(name.to_string()))
    }
}

/// Converts a container into mp4. Implemented by the ffmpeg backend.
pub trait MediaConverter {
    fn convert_to_mp4(&mut self, source: &Path, target: &Path) -> Result<()>;
}

/// Playable videos of one library directory, in file-name order.
#[derive(Debug, Clone)]
pub struct MediaCatalog {
    root: PathBuf,
    videos: Vec<String>,
}

impl MediaCatalog {
    /// Scan `root` (top level only) for supported videos.
    ///
    /// # Errors
    /// Returns [`Error::MissingLibrary`] if `root` is missing or not a directory.
    pub fn scan(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::MissingLibrary(root));
        }

        let videos = library_files(&root)
            .filter(|p| is_supported_video(p))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect::<Vec<_>>();

        if videos.is_empty() {
            warn!(root = %root.display(), "no mp4 or mkv found in library");
        } else {
            info!(root = %root.display(), count = videos.len(), "video library scanned");
        }
        for v in &videos {
            debug!(video = %v, "catalog entry");
        }
        Ok(Self { root, videos })
    }

    /// Build a catalog from known names without touching the filesystem.
    pub fn from_names(root: impl Into<PathBuf>, videos: Vec<String>) -> Self {
        Self {
            root: root.into(),
            videos,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn videos(&self) -> &[String] {
        &self.videos
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.videos.iter().any(|v| v == video_id)
    }

    pub fn path_for(&self, video_id: &str) -> PathBuf {
        self.root.join(video_id)
    }

    /// Map a requested name onto a catalog entry.
    ///
    /// A request for `film.mkv` finds `film.mp4` once the mkv has been converted.
    pub fn lookup(&self, requested: &str) -> Option<&str> {
        if let Some(v) = self.videos.iter().find(|v| *v == requested) {
            return Some(v.as_str());
        }
        let requested = Path::new(requested);
        if !is_mkv(requested) {
            return None;
        }
        let converted = requested.with_extension("mp4");
        let converted = converted.to_str()?;
        self.videos
            .iter()
            .find(|v| *v == converted)
            .map(String::as_str)
    }
}

/// Convert every `.mkv` in `root` to `.mp4`, removing the mkv only after the
/// conversion succeeded. Returns how many files were converted.
///
/// A failed conversion is logged and leaves the mkv in place.
pub fn convert_mkv_files(root: &Path, converter: &mut dyn MediaConverter) -> Result<usize> {
    let pending = library_files(root)
        .filter(|p| is_mkv(p))
        .collect::<Vec<_>>();

    let mut converted = 0;
    for source in pending {
        let target = source.with_extension("mp4");
        if target.exists() {
            warn!(
                source = %source.display(),
                target = %target.display(),
                "mp4 already present; leaving mkv untouched"
            );
            continue;
        }
        info!(source = %source.display(), "converting mkv to mp4");
        match converter.convert_to_mp4(&source, &target) {
            Ok(()) => {
                std::fs::remove_file(&source)?;
                info!(source = %source.display(), target = %target.display(), "finished converting");
                converted += 1;
            }
            Err(err) => {
                warn!(source = %source.display(), "mkv conversion failed: {err:#}");
                if target.exists() {
                    // ffmpeg may leave a truncated output behind
                    let _ = std::fs::remove_file(&target);
                }
            }
        }
    }
    Ok(converted)
}

fn library_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && !is_hidden(e))
        .map(DirEntry::into_path)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_supported_extensions() {
        assert!(is_supported_video(Path::new("a.mp4")));
        assert!(is_supported_video(Path::new("dir/B.MKV")));
        assert!(!is_supported_video(Path::new("c.avi")));
        assert!(!is_supported_video(Path::new("mp4")));
    }

    #[test]
    fn check_video_name_rejects_other_extensions() {
        assert_eq!(check_video_name("film.mp4").unwrap(), "film.mp4");
        assert!(matches!(
            check_video_name("film.mov"),
            Err(Error::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn lookup_maps_converted_mkv() {
        let catalog = MediaCatalog::from_names("/v", vec!["a.mp4".into(), "b.mp4".into()]);
        assert_eq!(catalog.lookup("a.mp4"), Some("a.mp4"));
        assert_eq!(catalog.lookup("b.mkv"), Some("b.mp4"));
        assert_eq!(catalog.lookup("c.mkv"), None);
        assert_eq!(catalog.lookup("c.mp4"), None);
    }
}
