//! Storage layer for relay state
//!
//! Provides the per-source seen-item store and the last-batch snapshot, both
//! persisted as pretty JSON through an atomic temp-file-and-rename write.

use crate::item::Item;
use chrono::Utc;
use indexmap::IndexSet;
use lazy_regex::regex_replace_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// File name of the seen-id list inside a source state directory
pub const SEEN_FILE_NAME: &str = "seen.json";
/// File name of the last-batch snapshot inside a source state directory
pub const SNAPSHOT_FILE_NAME: &str = "last_batch.json";

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Atomic rename of the temporary file failed
    #[error("Persist error: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Files belonging to one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    /// Seen-id list
    pub seen: PathBuf,
    /// Full last batch
    pub snapshot: PathBuf,
}

impl StatePaths {
    /// State files for `source` under `data_dir/<sanitized source>/`.
    ///
    /// # Examples
    ///
    /// ```
    /// use feed_relay::storage::StatePaths;
    /// use std::path::Path;
    ///
    /// let paths = StatePaths::for_source(Path::new("data"), "pics");
    /// assert_eq!(paths.seen, Path::new("data/pics/seen.json"));
    ///
    /// let other = StatePaths::for_source(Path::new("data"), "r/pics");
    /// assert!(other.seen.starts_with("data/r_pics-"));
    /// ```
    #[must_use]
    pub fn for_source(data_dir: &Path, source: &str) -> Self {
        let dir = data_dir.join(sanitize_source_name(source));
        Self {
            seen: dir.join(SEEN_FILE_NAME),
            snapshot: dir.join(SNAPSHOT_FILE_NAME),
        }
    }
}

/// Map a source name to a safe, collision-free directory name.
///
/// Names made only of `[A-Za-z0-9_-]` are used as is. Any other name is
/// sanitized and suffixed with a digest of the original, so two sources
/// never share a state directory.
#[must_use]
pub fn sanitize_source_name(name: &str) -> String {
    let cleaned = regex_replace_all!(r"[^A-Za-z0-9_-]", name.trim(), "_");
    if !cleaned.is_empty() && cleaned == name {
        return name.to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let stem = if cleaned.is_empty() { "default" } else { &cleaned };
    format!("{stem}-{}", &digest[..12])
}

/// One entry of a persisted seen file.
///
/// Older state files stored whole item records instead of bare ids; both
/// shapes are accepted on load.
#[derive(Deserialize)]
#[serde(untagged)]
enum SeenEntry {
    Id(String),
    Record { id: String },
}

impl SeenEntry {
    fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Record { id } => id,
        }
    }
}

/// Persistent, insertion-ordered set of item ids already relayed
#[derive(Debug)]
pub struct SeenStore {
    path: PathBuf,
    ids: IndexSet<String>,
    max_entries: usize,
    quarantined: Option<PathBuf>,
}

impl SeenStore {
    /// Load the store from `path`.
    ///
    /// A missing file yields an empty store. An unreadable or malformed file
    /// is renamed aside with a timestamp suffix and an empty store is
    /// returned, so a corrupt file never blocks a run.
    pub fn load(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        let path = path.into();
        let mut quarantined = None;
        let ids = match read_seen_file(&path) {
            Ok(Some(ids)) => {
                debug!(path = %path.display(), count = ids.len(), "Loaded seen store");
                ids
            }
            Ok(None) => {
                info!(path = %path.display(), "No seen store yet, starting empty");
                IndexSet::new()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Seen store is corrupt, starting empty");
                quarantined = quarantine(&path);
                IndexSet::new()
            }
        };

        Self {
            path,
            ids,
            max_entries: max_entries.max(1),
            quarantined,
        }
    }

    /// Where a corrupt file found by [`Self::load`] was moved, if any
    #[must_use]
    pub fn quarantined(&self) -> Option<&Path> {
        self.quarantined.as_deref()
    }

    /// Whether `id` was already relayed
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id` in memory. Idempotent; call [`Self::flush`] to persist.
    pub fn mark(&mut self, id: &str) {
        if !self.ids.contains(id) {
            self.ids.insert(id.to_string());
        }
    }

    /// Number of remembered ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Remembered ids, oldest first
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Location of the persisted file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trim to the retention ceiling and atomically persist.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if serialization or the atomic write fails.
    /// The in-memory set stays intact either way.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.trim();
        let ids: Vec<&String> = self.ids.iter().collect();
        write_json_atomic(&self.path, &ids)
    }

    /// Forget every id and persist the empty store.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the atomic write fails.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.ids.clear();
        self.flush()
    }

    fn trim(&mut self) {
        if self.ids.len() > self.max_entries {
            let surplus = self.ids.len() - self.max_entries;
            self.ids.drain(..surplus);
            debug!(dropped = surplus, "Trimmed seen store to retention ceiling");
        }
    }
}

fn read_seen_file(path: &Path) -> Result<Option<IndexSet<String>>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let entries: Vec<SeenEntry> = serde_json::from_str(&content)?;
    Ok(Some(entries.into_iter().map(SeenEntry::into_id).collect()))
}

/// Rename a bad state file to `<name>.corrupt.<timestamp>`.
///
/// Returns the new path when the move succeeded.
pub fn quarantine(path: &Path) -> Option<PathBuf> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let mut target = path.as_os_str().to_owned();
    target.push(format!(".corrupt.{stamp}"));
    let target = PathBuf::from(target);

    match std::fs::rename(path, &target) {
        Ok(()) => {
            warn!(
                path = %path.display(),
                moved_to = %target.display(),
                "Moved corrupt state file aside"
            );
            Some(target)
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to move corrupt state file");
            None
        }
    }
}

/// Serialize `data` as pretty JSON and atomically replace `path`.
///
/// Writes a temporary sibling in the same directory, syncs it to disk and
/// renames it over the destination.
///
/// # Errors
///
/// Returns a `StoreError` on serialization, I/O or rename failure; the
/// destination is left untouched in that case.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".relay-state-")
        .suffix(".tmp")
        .tempfile_in(&dir)?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), data)?;
    tmp.as_file_mut().write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

/// Persist the full batch fetched in the current run.
///
/// # Errors
///
/// Returns a `StoreError` if the atomic write fails.
pub fn write_snapshot(path: &Path, items: &[Item]) -> Result<(), StoreError> {
    write_json_atomic(path, items)
}

/// Read a batch snapshot back, `None` when none was written yet.
///
/// # Errors
///
/// Returns a `StoreError` if the file exists but cannot be read or parsed.
pub fn read_snapshot(path: &Path) -> Result<Option<Vec<Item>>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
