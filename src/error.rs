use std::path::PathBuf;

use thiserror::Error;

/// Library error type for slow-movie operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured video directory is missing or not a directory.
    #[error("video library not found: {}", .0.display())]
    MissingLibrary(PathBuf),

    /// The scan completed but found no playable videos.
    #[error("no mp4 or mkv found in {}", .0.display())]
    EmptyCatalog(PathBuf),

    /// A file name that does not carry a supported video extension.
    #[error("{0} should be an .mp4 or .mkv file")]
    UnsupportedExtension(String),

    /// A video identifier that is not part of the catalog.
    #[error("video {0} is not in the catalog")]
    UnknownVideo(String),

    /// A store key that would escape the store root or is empty.
    #[error("invalid store key: {0:?}")]
    InvalidKey(String),

    /// A persisted record that cannot be interpreted.
    #[error("corrupt record {key}: {value:?}")]
    CorruptRecord { key: String, value: String },

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),
}
