// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Cache key derivation
//!
//! Uses BLAKE3 over the namespace and the exact bytes of the key files.

use blake3::Hasher;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::{CiflowError, CiflowResult};

/// Content hasher for generating cache keys
pub struct ContentHasher {
    hasher: Hasher,
}

impl ContentHasher {
    /// Create a new content hasher
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    /// Hash a length-prefixed field so adjacent fields cannot run together
    pub fn field(&mut self, data: &[u8]) {
        self.hasher.update(&(data.len() as u64).to_le_bytes());
        self.hasher.update(data);
    }

    /// Hash a file's path and contents. A missing file hashes as a marker
    /// distinct from an empty one.
    pub fn hash_file(&mut self, relative: &Path, root: &Path) -> CiflowResult<()> {
        self.field(relative.to_string_lossy().as_bytes());

        let path = root.join(relative);
        match std::fs::read(&path) {
            Ok(content) => {
                self.hasher.update(&[1]);
                self.field(&content);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.hasher.update(&[0]);
            }
            Err(e) => {
                return Err(CiflowError::FileReadError {
                    path,
                    error: e.to_string(),
                })
            }
        }

        Ok(())
    }

    /// Hash arbitrary bytes
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finalize and get the hash
    pub fn finalize(self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hex BLAKE3 digest of a byte slice
pub fn hash_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Cache key: `<namespace>-<blake3 hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key from a namespace and the files it depends on, read
    /// relative to `root`, in declaration order
    pub fn derive(namespace: &str, files: &[PathBuf], root: &Path) -> CiflowResult<Self> {
        let mut hasher = ContentHasher::new();
        hasher.field(namespace.as_bytes());
        for file in files {
            hasher.hash_file(file, root)?;
        }

        Ok(Self(format!("{}-{}", sanitize(namespace), hasher.finalize())))
    }

    /// Wrap an existing key string
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `key` has the shape `derive` produces: non-empty, made of
    /// `[A-Za-z0-9._-]`, and not starting with `.`. Only such keys may name
    /// a directory inside a store.
    pub fn is_well_formed(key: &str) -> bool {
        !key.is_empty() && !key.starts_with('.') && key.chars().all(is_key_char)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Keys name directories, so keep them to a portable character set
fn sanitize(namespace: &str) -> String {
    let cleaned: String = namespace
        .chars()
        .map(|c| if is_key_char(c) { c } else { '_' })
        .collect();

    if cleaned.is_empty() || cleaned.starts_with('.') {
        format!("_{}", cleaned)
    } else {
        cleaned
    }
}
