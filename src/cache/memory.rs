// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! In-memory cache, used by tests and `--no-cache` runs

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::SystemTime;
use tokio::sync::RwLock;

use super::{CacheEntryInfo, CacheKey, CacheStats, CacheStore, Snapshot};
use crate::errors::CiflowResult;

/// Process-local cache store
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (SystemTime, Snapshot)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn restore(&self, key: &CacheKey) -> CiflowResult<Option<Snapshot>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key.as_str()).map(|(_, snapshot)| snapshot.clone()))
    }

    async fn save(&self, key: &CacheKey, snapshot: &Snapshot) -> CiflowResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (SystemTime::now(), snapshot.clone()));
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CiflowResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn clear(&self) -> CiflowResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn stats(&self) -> CiflowResult<CacheStats> {
        let entries = self.list().await?;
        Ok(CacheStats::from_entries(&entries))
    }

    async fn list(&self) -> CiflowResult<Vec<CacheEntryInfo>> {
        let entries = self.entries.read().await;
        let mut list: Vec<_> = entries
            .iter()
            .map(|(key, (created, snapshot))| CacheEntryInfo {
                key: key.clone(),
                created: *created,
                files: snapshot.len(),
                size_bytes: snapshot.size_bytes(),
            })
            .collect();
        list.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_round_trip() {
        let cache = MemoryCache::new();
        let key = CacheKey::from_raw("cargo-1");
        let mut snapshot = Snapshot::new();
        snapshot.insert("registry/index", b"crates".to_vec());

        tokio_test::block_on(async {
            assert!(cache.restore(&key).await.unwrap().is_none());
            cache.save(&key, &snapshot).await.unwrap();
            assert_eq!(cache.restore(&key).await.unwrap(), Some(snapshot.clone()));

            let stats = cache.stats().await.unwrap();
            assert_eq!(stats.entries, 1);
            assert_eq!(stats.size_bytes, 6);

            assert!(cache.invalidate("cargo-1").await.unwrap());
            assert!(cache.list().await.unwrap().is_empty());
        });
    }
}
