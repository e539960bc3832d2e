//! Abstract store: one JSON file per patent identifier.
//!
//! The store is the durable cache behind abstract resolution. Every fetch
//! attempt, successful or not, is written here as `<dir>/<id>.json`, and a
//! later run only re-fetches identifiers whose stored abstract is still blank.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extension used for store entries
const ENTRY_EXTENSION: &str = "json";

/// Cached result of one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AbstractRecord {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Title", default)]
    pub title: Option<String>,
    #[serde(rename = "Abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(rename = "URL", default)]
    pub url: Option<String>,
    #[serde(rename = "Error", default)]
    pub error: Option<String>,
    #[serde(rename = "RetryCount", default)]
    pub retry_count: u32,
}

impl AbstractRecord {
    /// Build a failed-attempt record with no title or abstract.
    pub fn failed(id: &str, url: &str, error: impl Into<String>, retry_count: u32) -> Self {
        Self {
            id: id.to_string(),
            title: None,
            abstract_text: None,
            url: Some(url.to_string()),
            error: Some(error.into()),
            retry_count,
        }
    }

    /// A non-blank abstract is final and is never fetched again.
    pub fn has_abstract(&self) -> bool {
        self.abstract_text
            .as_deref()
            .map(|a| !a.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Directory-backed store of [`AbstractRecord`]s
#[derive(Debug, Clone)]
pub struct AbstractStore {
    root: PathBuf,
}

impl AbstractStore {
    /// Open the store at `root`, creating the directory if missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            info!(dir = ?root, "Creating abstract store directory");
        }
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Path of the entry for `id`.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.{}", id, ENTRY_EXTENSION))
    }

    /// Load the entry for `id`.
    ///
    /// Returns `Ok(None)` when no entry exists; unreadable or malformed
    /// entries are errors.
    pub fn load(&self, id: &str) -> Result<Option<AbstractRecord>> {
        let path = self.path_for(id);
        if !path.exists() {
            debug!(id = id, "No stored abstract");
            return Ok(None);
        }
        read_entry(&path).map(Some)
    }

    /// Write the entry for `id`, replacing any previous one.
    pub fn save(&self, id: &str, record: &AbstractRecord) -> Result<()> {
        let path = self.path_for(id);
        crate::write_json(&path, record)?;
        debug!(id = id, path = ?path, "Saved abstract record");
        Ok(())
    }

    /// Every entry in the store keyed by its file base name.
    pub fn index(&self) -> Result<BTreeMap<String, PathBuf>> {
        let mut entries = BTreeMap::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                entries.insert(stem.to_string(), path.clone());
            }
        }
        Ok(entries)
    }
}

/// Read a single store entry from disk.
pub fn read_entry(path: &Path) -> Result<AbstractRecord> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
