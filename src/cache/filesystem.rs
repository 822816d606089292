// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Filesystem-based cache implementation
//!
//! Layout: `<root>/<first two key chars>/<key>/` holding `manifest.json`
//! and a `files/` tree. Saves are staged next to the entry and swapped in
//! under the key's write lock, so a restore never sees a partial entry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{hash_bytes, CacheEntryInfo, CacheKey, CacheStats, CacheStore, Snapshot};
use crate::errors::{CiflowError, CiflowResult};

const MANIFEST: &str = "manifest.json";
const FILES_DIR: &str = "files";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    key: String,
    created: SystemTime,
    files: Vec<ManifestFile>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    path: String,
    size: u64,
    digest: String,
}

enum Lookup {
    Hit(Snapshot),
    Missing,
    Corrupt(String),
}

/// Filesystem-based cache
pub struct FilesystemCache {
    /// Cache directory
    root: PathBuf,
    /// Per-key reader/writer locks
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl FilesystemCache {
    /// Create a new filesystem cache
    pub fn new(root: PathBuf) -> CiflowResult<Self> {
        if !root.exists() {
            std::fs::create_dir_all(&root)
                .map_err(|e| CiflowError::cache("Failed to create cache directory", e))?;
        }

        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_for(&self, key: &str) -> Arc<RwLock<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Path of a cache entry, or `None` for a key that could escape the root
    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        if !CacheKey::is_well_formed(key) {
            return None;
        }
        let prefix: String = key.chars().take(2).collect();
        Some(self.root.join(prefix).join(key))
    }

    async fn lookup(entry: &Path, key: &str) -> CiflowResult<Lookup> {
        let raw = match tokio::fs::read(entry.join(MANIFEST)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Lookup::Missing),
            Err(e) => return Err(CiflowError::cache("Failed to read cache manifest", e)),
        };

        let manifest: Manifest = match serde_json::from_slice(&raw) {
            Ok(manifest) => manifest,
            Err(e) => return Ok(Lookup::Corrupt(format!("unreadable manifest: {}", e))),
        };

        if manifest.key != key {
            return Ok(Lookup::Corrupt(format!("manifest names key '{}'", manifest.key)));
        }

        let mut snapshot = Snapshot::new();
        for file in manifest.files {
            if !is_safe_relative(&file.path) {
                return Ok(Lookup::Corrupt(format!("unsafe path '{}'", file.path)));
            }

            let content = match tokio::fs::read(entry.join(FILES_DIR).join(&file.path)).await {
                Ok(content) => content,
                Err(e) => return Ok(Lookup::Corrupt(format!("'{}': {}", file.path, e))),
            };

            if content.len() as u64 != file.size || hash_bytes(&content) != file.digest {
                return Ok(Lookup::Corrupt(format!("'{}' failed verification", file.path)));
            }

            snapshot.insert(file.path, content);
        }

        Ok(Lookup::Hit(snapshot))
    }

    fn read_manifest(entry: &Path) -> Option<Manifest> {
        let content = std::fs::read(entry.join(MANIFEST)).ok()?;
        serde_json::from_slice(&content).ok()
    }

    /// List all cache entries
    fn list_entries(&self) -> CiflowResult<Vec<CacheEntryInfo>> {
        let mut entries = Vec::new();

        if !self.root.exists() {
            return Ok(entries);
        }

        for prefix_dir in std::fs::read_dir(&self.root)
            .map_err(|e| CiflowError::cache("Failed to read cache directory", e))?
        {
            let prefix_dir = prefix_dir
                .map_err(|e| CiflowError::cache("Failed to read cache entry", e))?
                .path();

            if !prefix_dir.is_dir() {
                continue;
            }

            for entry_dir in std::fs::read_dir(&prefix_dir)
                .map_err(|e| CiflowError::cache("Failed to read cache subdirectory", e))?
            {
                let entry_dir = entry_dir
                    .map_err(|e| CiflowError::cache("Failed to read cache entry", e))?
                    .path();

                let hidden = entry_dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map_or(true, |n| n.starts_with('.'));
                if hidden || !entry_dir.is_dir() {
                    continue;
                }

                if let Some(manifest) = Self::read_manifest(&entry_dir) {
                    entries.push(CacheEntryInfo {
                        key: manifest.key,
                        created: manifest.created,
                        files: manifest.files.len(),
                        size_bytes: manifest.files.iter().map(|f| f.size).sum(),
                    });
                }
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn stage(parent: &Path, key: &CacheKey, snapshot: &Snapshot) -> CiflowResult<tempfile::TempDir> {
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(parent)
            .map_err(|e| CiflowError::cache("Failed to create staging directory", e))?;

        snapshot.write_to(&staging.path().join(FILES_DIR))?;

        let manifest = Manifest {
            key: key.to_string(),
            created: SystemTime::now(),
            files: snapshot
                .files()
                .map(|(path, content)| ManifestFile {
                    path: path.to_string(),
                    size: content.len() as u64,
                    digest: hash_bytes(content),
                })
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| CiflowError::cache("Failed to serialize cache manifest", e))?;
        std::fs::write(staging.path().join(MANIFEST), json)
            .map_err(|e| CiflowError::cache("Failed to write cache manifest", e))?;

        Ok(staging)
    }
}

fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

#[async_trait]
impl CacheStore for FilesystemCache {
    async fn restore(&self, key: &CacheKey) -> CiflowResult<Option<Snapshot>> {
        let Some(entry) = self.entry_path(key.as_str()) else {
            warn!("Ignoring malformed cache key '{}'", key);
            return Ok(None);
        };
        let lock = self.lock_for(key.as_str());

        {
            let _read = lock.read().await;
            match Self::lookup(&entry, key.as_str()).await? {
                Lookup::Hit(snapshot) => {
                    debug!("Cache hit for {}", key);
                    return Ok(Some(snapshot));
                }
                Lookup::Missing => {
                    debug!("Cache miss for {}", key);
                    return Ok(None);
                }
                Lookup::Corrupt(_) => {}
            }
        }

        // Re-check under the write lock: a save may have replaced the entry
        let _write = lock.write().await;
        match Self::lookup(&entry, key.as_str()).await? {
            Lookup::Hit(snapshot) => Ok(Some(snapshot)),
            Lookup::Missing => Ok(None),
            Lookup::Corrupt(reason) => {
                warn!("Discarding corrupt cache entry {}: {}", key, reason);
                tokio::fs::remove_dir_all(&entry)
                    .await
                    .map_err(|e| CiflowError::cache("Failed to remove corrupt cache entry", e))?;
                Ok(None)
            }
        }
    }

    async fn save(&self, key: &CacheKey, snapshot: &Snapshot) -> CiflowResult<()> {
        let entry = self.entry_path(key.as_str()).ok_or_else(|| {
            CiflowError::cache(
                "Refusing to save cache entry",
                format!("malformed key '{}'", key),
            )
        })?;
        let parent = entry.parent().unwrap_or(&self.root).to_path_buf();

        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| CiflowError::cache("Failed to create cache directory", e))?;

        // Staging happens outside the lock; only the swap is serialized.
        // Dropping `staging` after a successful swap finds nothing to clean.
        let staging = Self::stage(&parent, key, snapshot)?;

        let lock = self.lock_for(key.as_str());
        let _write = lock.write().await;

        let trash = if tokio::fs::try_exists(&entry).await.unwrap_or(false) {
            let trash = tempfile::Builder::new()
                .prefix(".trash-")
                .tempdir_in(&parent)
                .map_err(|e| CiflowError::cache("Failed to create trash directory", e))?;
            tokio::fs::rename(&entry, trash.path().join("entry"))
                .await
                .map_err(|e| CiflowError::cache("Failed to retire cache entry", e))?;
            Some(trash)
        } else {
            None
        };

        tokio::fs::rename(staging.path(), &entry)
            .await
            .map_err(|e| CiflowError::cache("Failed to commit cache entry", e))?;

        drop(trash);
        debug!("Saved {} file(s) to cache entry {}", snapshot.len(), key);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CiflowResult<bool> {
        let Some(entry) = self.entry_path(key) else {
            return Ok(false);
        };
        let lock = self.lock_for(key);
        let _write = lock.write().await;

        if !entry.exists() {
            return Ok(false);
        }

        tokio::fs::remove_dir_all(&entry)
            .await
            .map_err(|e| CiflowError::cache("Failed to remove cache entry", e))?;
        Ok(true)
    }

    async fn clear(&self) -> CiflowResult<()> {
        if self.root.exists() {
            tokio::fs::remove_dir_all(&self.root)
                .await
                .map_err(|e| CiflowError::cache("Failed to clear cache", e))?;

            tokio::fs::create_dir_all(&self.root)
                .await
                .map_err(|e| CiflowError::cache("Failed to recreate cache directory", e))?;
        }

        Ok(())
    }

    async fn stats(&self) -> CiflowResult<CacheStats> {
        let entries = self.list_entries()?;
        Ok(CacheStats::from_entries(&entries))
    }

    async fn list(&self) -> CiflowResult<Vec<CacheEntryInfo>> {
        self.list_entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(tag: u8) -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.insert("debug/libdep.rlib", vec![tag; 4096]);
        snapshot.insert("debug/build/out.txt", format!("build {}", tag));
        snapshot.insert(".fingerprint/dep", vec![0, tag, 0xff]);
        snapshot
    }

    #[tokio::test]
    async fn test_cache_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path().to_path_buf()).unwrap();
        let key = CacheKey::from_raw("cargo-abc123");

        cache.save(&key, &snapshot(7)).await.unwrap();

        let restored = cache.restore(&key).await.unwrap().unwrap();
        assert_eq!(restored, snapshot(7));
        assert!(temp_dir.path().join("ca/cargo-abc123").join(MANIFEST).exists());
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path().to_path_buf()).unwrap();

        let restored = cache.restore(&CacheKey::from_raw("cargo-none")).await.unwrap();
        assert!(restored.is_none());
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path().to_path_buf()).unwrap();
        let key = CacheKey::from_raw("cargo-abc");

        cache.save(&key, &snapshot(1)).await.unwrap();
        cache.save(&key, &snapshot(2)).await.unwrap();
        cache.save(&key, &snapshot(2)).await.unwrap();

        assert_eq!(cache.restore(&key).await.unwrap().unwrap(), snapshot(2));
        assert_eq!(cache.stats().await.unwrap().entries, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_never_tear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(FilesystemCache::new(temp_dir.path().to_path_buf()).unwrap());
        let key = CacheKey::from_raw("cargo-shared");

        let mut handles = Vec::new();
        for tag in 0..12u8 {
            let cache = cache.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache.save(&key, &snapshot(tag)).await.unwrap();
                if let Some(seen) = cache.restore(&key).await.unwrap() {
                    assert!((0..12).any(|t| seen == snapshot(t)), "torn entry observed");
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let last = cache.restore(&key).await.unwrap().unwrap();
        assert!((0..12).any(|t| last == snapshot(t)));

        // No staging or trash directories left behind
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path().join("ca"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("cargo-shared")]);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path().to_path_buf()).unwrap();
        let key = CacheKey::from_raw("cargo-corrupt");

        cache.save(&key, &snapshot(3)).await.unwrap();
        let stored = temp_dir
            .path()
            .join("ca/cargo-corrupt")
            .join(FILES_DIR)
            .join("debug/build/out.txt");
        std::fs::write(&stored, "tampered").unwrap();

        assert!(cache.restore(&key).await.unwrap().is_none());
        assert!(cache.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_invalidate() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path().to_path_buf()).unwrap();
        let key = CacheKey::from_raw("cargo-abc");

        cache.save(&key, &snapshot(1)).await.unwrap();
        assert!(cache.invalidate("cargo-abc").await.unwrap());
        assert!(!cache.invalidate("cargo-abc").await.unwrap());
        assert!(cache.restore(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_keys_stay_inside_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("a/cache");
        let victim = temp_dir.path().join("victim");
        std::fs::create_dir_all(victim.join("data")).unwrap();
        let cache = FilesystemCache::new(root.clone()).unwrap();

        for key in ["../victim", "../../victim", ".."] {
            assert!(!cache.invalidate(key).await.unwrap(), "{}", key);
        }
        assert!(victim.join("data").exists());
        assert!(root.exists());

        let escaping = CacheKey::from_raw("../victim");
        assert!(cache.save(&escaping, &snapshot(1)).await.is_err());
        assert!(cache.restore(&escaping).await.unwrap().is_none());
        assert!(!temp_dir.path().join("a/victim").exists());
    }

    #[tokio::test]
    async fn test_cache_stats_list_clear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path().to_path_buf()).unwrap();

        cache.save(&CacheKey::from_raw("cargo-a"), &snapshot(1)).await.unwrap();
        cache.save(&CacheKey::from_raw("docs-b"), &Snapshot::new()).await.unwrap();

        let entries = cache.list().await.unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["cargo-a", "docs-b"]);
        assert_eq!(entries[0].files, 3);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.size_bytes, snapshot(1).size_bytes());
        assert!(stats.oldest_entry.is_some());

        cache.clear().await.unwrap();
        assert_eq!(cache.stats().await.unwrap().entries, 0);
    }
}
