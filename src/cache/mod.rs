// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Content-keyed cache shared by the jobs of a run
//!
//! A cache entry maps a [`CacheKey`] to a [`Snapshot`] of a workspace
//! directory. A miss is a normal outcome, never an error. Entries outlive
//! runs; nothing else does.

mod filesystem;
mod key;
mod memory;

pub use filesystem::FilesystemCache;
pub use key::{hash_bytes, CacheKey, ContentHasher};
pub use memory::MemoryCache;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::errors::{CiflowError, CiflowResult};

/// Trait for cache stores.
///
/// Implementations must allow concurrent restores and serialize saves per
/// key; a restore observes an entry either entirely before or entirely
/// after a concurrent save.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an entry. `None` is a miss.
    async fn restore(&self, key: &CacheKey) -> CiflowResult<Option<Snapshot>>;

    /// Store an entry, replacing any previous one (last writer wins)
    async fn save(&self, key: &CacheKey, snapshot: &Snapshot) -> CiflowResult<()>;

    /// Remove one entry. Returns whether it existed.
    async fn invalidate(&self, key: &str) -> CiflowResult<bool>;

    /// Remove every entry
    async fn clear(&self) -> CiflowResult<()>;

    /// Get cache statistics
    async fn stats(&self) -> CiflowResult<CacheStats>;

    /// Describe every entry
    async fn list(&self) -> CiflowResult<Vec<CacheEntryInfo>>;
}

/// Cache store injected into a run
pub type CacheManager = Arc<dyn CacheStore>;

/// In-memory copy of a directory: relative path (`/`-separated) to bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<String, Vec<u8>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every regular file under `dir`
    pub fn capture(dir: &Path) -> CiflowResult<Self> {
        if !dir.is_dir() {
            return Err(CiflowError::cache(
                &format!("Cannot snapshot '{}'", dir.display()),
                "not a directory",
            ));
        }

        let mut snapshot = Self::new();
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry.map_err(|e| CiflowError::cache("Failed to walk directory", e))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| CiflowError::cache("Failed to relativize path", e))?;
            let content = std::fs::read(entry.path()).map_err(|e| CiflowError::FileReadError {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            })?;
            snapshot.insert(relative_key(relative), content);
        }

        Ok(snapshot)
    }

    /// Write the snapshot's files under `dir`, creating directories as needed.
    /// Files already in `dir` that the snapshot does not name are left alone.
    pub fn write_to(&self, dir: &Path) -> CiflowResult<()> {
        std::fs::create_dir_all(dir).map_err(|e| CiflowError::FileWriteError {
            path: dir.to_path_buf(),
            error: e.to_string(),
        })?;

        for (relative, content) in &self.files {
            let path = dir.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CiflowError::FileWriteError {
                    path: parent.to_path_buf(),
                    error: e.to_string(),
                })?;
            }
            std::fs::write(&path, content).map_err(|e| CiflowError::FileWriteError {
                path,
                error: e.to_string(),
            })?;
        }

        Ok(())
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn size_bytes(&self) -> u64 {
        self.files.values().map(|v| v.len() as u64).sum()
    }
}

fn relative_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cached entries
    pub entries: usize,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Oldest entry timestamp
    pub oldest_entry: Option<SystemTime>,
    /// Newest entry timestamp
    pub newest_entry: Option<SystemTime>,
}

impl CacheStats {
    pub(crate) fn from_entries(entries: &[CacheEntryInfo]) -> Self {
        Self {
            entries: entries.len(),
            size_bytes: entries.iter().map(|e| e.size_bytes).sum(),
            oldest_entry: entries.iter().map(|e| e.created).min(),
            newest_entry: entries.iter().map(|e| e.created).max(),
        }
    }

    /// Format size for display
    pub fn formatted_size(&self) -> String {
        format_size(self.size_bytes)
    }
}

/// Format a byte count for display
pub fn format_size(size_bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size_bytes >= GB {
        format!("{:.2} GB", size_bytes as f64 / GB as f64)
    } else if size_bytes >= MB {
        format!("{:.2} MB", size_bytes as f64 / MB as f64)
    } else if size_bytes >= KB {
        format!("{:.2} KB", size_bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", size_bytes)
    }
}

/// Summary of one stored entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryInfo {
    pub key: String,
    pub created: SystemTime,
    pub files: usize,
    pub size_bytes: u64,
}

/// Default store root: `$CIFLOW_CACHE_DIR`, else the user cache directory
pub fn default_cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("CIFLOW_CACHE_DIR") {
        return PathBuf::from(dir);
    }

    directories::ProjectDirs::from("dev", "ciflow", "ciflow")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("ciflow-cache"))
}
