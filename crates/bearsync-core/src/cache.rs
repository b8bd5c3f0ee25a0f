//! Local note cache persisted as a single JSON file.
//!
//! The file is replaced atomically on every save: the new content goes to a
//! temporary file in the same directory, which is then renamed over the old
//! one. Nothing else coordinates access; one writer per process is assumed.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CachedNote;
use crate::Result;

/// A cache older than this is refreshed before it is read.
pub const STALE_AFTER_SECS: i64 = 300;

/// Snapshot of the synchronized notes and the position in the change feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCache {
    #[serde(default)]
    pub sync_token: Option<String>,
    #[serde(default)]
    pub last_sync_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: BTreeMap<String, CachedNote>,
}

impl NoteCache {
    pub fn new(sync_token: Option<String>, last_sync_date: DateTime<Utc>) -> Self {
        Self {
            sync_token,
            last_sync_date: Some(last_sync_date),
            notes: BTreeMap::new(),
        }
    }

    /// Insert or replace a note. Returns `true` when the id was new.
    pub fn upsert(&mut self, note: CachedNote) -> bool {
        self.notes.insert(note.record_name.clone(), note).is_none()
    }

    pub fn remove(&mut self, record_name: &str) -> Option<CachedNote> {
        self.notes.remove(record_name)
    }

    pub fn get(&self, record_name: &str) -> Option<&CachedNote> {
        self.notes.get(record_name)
    }

    pub fn find_by_unique_identifier(&self, unique_identifier: &str) -> Option<&CachedNote> {
        self.notes.values().find(|note| {
            note.unique_identifier
                .as_deref()
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(unique_identifier))
        })
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Stale when never synced or last synced more than
    /// [`STALE_AFTER_SECS`] before `now`.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.last_sync_date
            .is_none_or(|synced| now - synced > Duration::seconds(STALE_AFTER_SECS))
    }
}

/// Reads and writes the cache file.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the cache; fails when the file is missing or unreadable.
    pub fn load(&self) -> Result<NoteCache> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Read the cache, treating a missing or corrupt file as absent.
    pub fn load_or_none(&self) -> Option<NoteCache> {
        if !self.exists() {
            return None;
        }
        match self.load() {
            Ok(cache) => Some(cache),
            Err(error) => {
                tracing::warn!(
                    "Ignoring unreadable cache at {}: {}",
                    self.path.display(),
                    error
                );
                None
            }
        }
    }

    /// Write the cache through a temporary file and rename it into place.
    pub fn save(&self, cache: &NoteCache) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer(&mut file, cache)?;
        file.flush()?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|error| error.error)?;

        tracing::debug!(
            "Saved {} notes to {}",
            cache.len(),
            self.path.display()
        );
        Ok(())
    }
}
