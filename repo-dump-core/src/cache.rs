//! # cache: per (repository, reference) snapshots of fetched file text
//!
//! A [`SnapshotCache`] remembers the text of every file that was included by
//! the most recent dump of one repository at one reference, plus the revision
//! that dump saw. The engine mutates it in place; persistence is left to a
//! [`CacheStore`] chosen by the caller.
//!
//! On disk (and in any store) a snapshot serializes to
//! `{"files": {path: text}, "owner", "repo", "ref", "commit"}`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Identity of a snapshot. No sharing across references.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub owner: String,
    pub repo: String,
    pub reference: String,
}

impl CacheKey {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            reference: reference.into(),
        }
    }

    /// `owner/repo`, the repository half of the identity.
    pub fn repository_key(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// File name used by [`FileCacheStore`]: separators flattened to `_`.
    fn file_name(&self) -> String {
        format!("{self}.json")
            .replace('/', "_")
            .replace(':', "_")
            .replace('@', "_")
            .replace('\\', "_")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.reference)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCache {
    pub owner: String,
    pub repo: String,
    #[serde(rename = "ref")]
    pub reference: String,
    /// Revision seen by the last dump that completed.
    pub commit: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl SnapshotCache {
    /// Fresh snapshot with no files and no recorded revision.
    pub fn empty(key: &CacheKey) -> Self {
        Self {
            owner: key.owner.clone(),
            repo: key.repo.clone(),
            reference: key.reference.clone(),
            commit: None,
            files: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.owner, &self.repo, &self.reference)
    }

    pub fn repository_key(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into());
    }

    /// Drop one path. Returns whether it was present.
    pub fn invalidate(&mut self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cache JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key-value persistence for snapshots. Callers serialize dumps per key.
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &CacheKey) -> Result<Option<SnapshotCache>, CacheError>;

    fn save(&self, cache: &SnapshotCache) -> Result<(), CacheError>;

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Wipe every entry regardless of key.
    fn clear_all(&self) -> Result<(), CacheError>;
}

/// In-process store holding serialized snapshots.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map still holds complete entries; each insert is a single call.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, key: &CacheKey) -> Result<Option<SnapshotCache>, CacheError> {
        match self.lock().get(&key.to_string()) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn save(&self, cache: &SnapshotCache) -> Result<(), CacheError> {
        let raw = serde_json::to_string(cache)?;
        self.lock().insert(cache.key().to_string(), raw);
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.lock().remove(&key.to_string());
        Ok(())
    }

    fn clear_all(&self) -> Result<(), CacheError> {
        self.lock().clear();
        Ok(())
    }
}

/// One JSON file per key inside a directory.
///
/// ```text
/// <root>/
///   owner_repo_main.json
///   owner_repo_v1.2.json
/// ```
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    root: PathBuf,
}

impl FileCacheStore {
    /// The directory is created lazily on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.file_name())
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, key: &CacheKey) -> Result<Option<SnapshotCache>, CacheError> {
        let path = self.entry_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(%key, path = %path.display(), "No cached snapshot on disk");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let cache: SnapshotCache = serde_json::from_str(&raw)?;
        if cache.key() != *key {
            warn!(%key, found = %cache.key(), path = %path.display(), "Cached snapshot belongs to a different key, ignoring");
            return Ok(None);
        }
        debug!(%key, files = cache.len(), "Loaded cached snapshot");
        Ok(Some(cache))
    }

    fn save(&self, cache: &SnapshotCache) -> Result<(), CacheError> {
        fs::create_dir_all(&self.root)?;
        let key = cache.key();
        let path = self.entry_path(&key);
        // Write-then-rename: readers never observe a half-written entry.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(cache)?)?;
        fs::rename(&tmp, &path)?;
        info!(%key, files = cache.len(), path = %path.display(), "Persisted snapshot");
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_all(&self) -> Result<(), CacheError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0usize;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        info!(root = %self.root.display(), removed, "Cleared snapshot cache");
        Ok(())
    }
}
