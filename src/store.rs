//! Durable playback progress.
//!
//! A [`KeyValueStore`] holds small text records. [`ProgressStore`] layers the
//! player's two record kinds on top of it: one `now-playing` pointer naming the
//! active video and one `progress/<video>` record per video holding a frame
//! position. Every record is written independently, so a crash while saving one
//! video's progress cannot damage another's.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::Error;

pub const POINTER_KEY: &str = "now-playing";
const PROGRESS_PREFIX: &str = "progress/";

/// Minimal string key-value persistence.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), Error>;
    /// Keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>, Error>;
}

/// One file per key below a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, Error> {
        let rel = Path::new(key);
        let valid = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(Error::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let path = self.path_for(key)?;
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        // Write-then-rename keeps the previous record intact if we die mid-write.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = dir.join(format!(".{file_name}.tmp"));
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(value.as_bytes())?;
            f.sync_all()?;
        }
        if let Err(err) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        debug!(key, value, path = %path.display(), "record saved");
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, Error> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|n| n.starts_with('.'))
}

/// In-memory store, mostly for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.records.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.records.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Per-video frame positions plus the now-playing pointer.
#[derive(Debug, Clone)]
pub struct ProgressStore<S> {
    inner: S,
}

impl<S: KeyValueStore> ProgressStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Stored position for `video_id`; a missing record is created as zero.
    pub fn load(&mut self, video_id: &str) -> Result<u64, Error> {
        let key = progress_key(video_id);
        match self.inner.get(&key)? {
            Some(raw) => parse_position(&key, &raw),
            None => {
                self.inner.set(&key, "0")?;
                Ok(0)
            }
        }
    }

    pub fn save(&mut self, video_id: &str, position: u64) -> Result<(), Error> {
        self.inner.set(&progress_key(video_id), &position.to_string())
    }

    pub fn load_pointer(&self) -> Result<Option<String>, Error> {
        Ok(self
            .inner
            .get(POINTER_KEY)?
            .filter(|id| !id.is_empty()))
    }

    pub fn save_pointer(&mut self, video_id: &str) -> Result<(), Error> {
        self.inner.set(POINTER_KEY, video_id)
    }

    /// Every video that has a progress record, including ones no longer in the library.
    pub fn videos(&self) -> Result<Vec<String>, Error> {
        Ok(self
            .inner
            .list(PROGRESS_PREFIX)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(PROGRESS_PREFIX).map(str::to_string))
            .collect())
    }
}

fn progress_key(video_id: &str) -> String {
    format!("{PROGRESS_PREFIX}{video_id}")
}

/// Accepts whole frame counts as well as the `30.0` style floats older
/// progress files contain.
fn parse_position(key: &str, raw: &str) -> Result<u64, Error> {
    let raw = raw.trim();
    if let Ok(pos) = raw.parse::<u64>() {
        return Ok(pos);
    }
    match raw.parse::<f64>() {
        Ok(pos) if pos.is_finite() && pos >= 0.0 => Ok(pos.trunc() as u64),
        _ => Err(Error::CorruptRecord {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}
