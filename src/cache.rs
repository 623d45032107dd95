//! Key-value backends for the company profile cache.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use slug::slugify;
use tracing::debug;

use crate::error::PersistenceError;

pub trait KeyValueStore {
    /// `Ok(None)` when nothing has been stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Overwrites any previous value under `key`.
    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), PersistenceError>;
}

/// In-process cache. Counts writes and can be told to refuse them.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<String, Vec<u8>>,
    writes: usize,
    reject_writes: bool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache whose every `set` fails, like a full browser quota.
    pub fn full() -> Self {
        Self {
            reject_writes: true,
            ..Self::default()
        }
    }

    pub fn with_entry(key: &str, value: impl Into<Vec<u8>>) -> Self {
        let mut cache = Self::default();
        cache.entries.insert(key.to_string(), value.into());
        cache
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn raw(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }
}

impl KeyValueStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        if self.reject_writes {
            return Err(PersistenceError::Unavailable("quota exceeded".into()));
        }
        self.entries.insert(key.to_string(), value.to_vec());
        self.writes += 1;
        Ok(())
    }
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slugify(key)))
    }
}

impl KeyValueStore for FileCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        fs::write(&path, value)?;
        debug!(path = %path.display(), bytes = value.len(), "cache entry written");
        Ok(())
    }
}
