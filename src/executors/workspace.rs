// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Isolated per-job working directories

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{CiflowError, CiflowResult};

/// Private copy of the source tree, removed on drop
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Copy `source` into a fresh temporary directory, skipping `.git` and
    /// any path under `exclude`
    pub fn create(source: &Path, exclude: &[PathBuf]) -> CiflowResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("ciflow-job-")
            .tempdir()
            .map_err(|e| CiflowError::Workspace {
                message: format!("Failed to create workspace: {}", e),
            })?;

        let files = copy_tree(source, dir.path(), exclude)?;
        debug!(
            "Seeded workspace {} with {} file(s)",
            dir.path().display(),
            files
        );

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn copy_tree(source: &Path, dest: &Path, exclude: &[PathBuf]) -> CiflowResult<usize> {
    let workspace_error = |message: String| CiflowError::Workspace { message };

    if !source.is_dir() {
        return Err(workspace_error(format!(
            "Source tree '{}' is not a directory",
            source.display()
        )));
    }

    let mut copied = 0;
    let walker = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.file_name() != ".git" && !exclude.iter().any(|ex| entry.path().starts_with(ex))
        });

    for entry in walker {
        let entry = entry.map_err(|e| workspace_error(format!("Failed to walk source tree: {}", e)))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| workspace_error(e.to_string()))?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| CiflowError::FileWriteError {
                path: target.clone(),
                error: e.to_string(),
            })?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| CiflowError::FileWriteError {
                path: target.clone(),
                error: e.to_string(),
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> CiflowResult<()> {
    let points_to = std::fs::read_link(link).map_err(|e| CiflowError::FileReadError {
        path: link.to_path_buf(),
        error: e.to_string(),
    })?;
    std::os::unix::fs::symlink(points_to, target).map_err(|e| CiflowError::FileWriteError {
        path: target.to_path_buf(),
        error: e.to_string(),
    })
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> CiflowResult<()> {
    if link.is_file() {
        std::fs::copy(link, target).map_err(|e| CiflowError::FileWriteError {
            path: target.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_tree() -> TempDir {
        let source = TempDir::new().unwrap();
        std::fs::create_dir_all(source.path().join("src")).unwrap();
        std::fs::create_dir_all(source.path().join(".git/objects")).unwrap();
        std::fs::create_dir_all(source.path().join(".ciflow/cache/ab")).unwrap();
        std::fs::write(source.path().join("Cargo.lock"), "version = 3\n").unwrap();
        std::fs::write(source.path().join("src/lib.rs"), "pub fn f() {}\n").unwrap();
        std::fs::write(source.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(source.path().join(".ciflow/ci.yml"), "on: push\n").unwrap();
        std::fs::write(source.path().join(".ciflow/cache/ab/entry"), "x").unwrap();
        source
    }

    #[test]
    fn test_workspace_copies_tree() {
        let source = source_tree();
        let cache_dir = source.path().join(".ciflow/cache");
        let workspace = Workspace::create(source.path(), &[cache_dir]).unwrap();

        let ws = workspace.path();
        assert_eq!(std::fs::read_to_string(ws.join("Cargo.lock")).unwrap(), "version = 3\n");
        assert!(ws.join("src/lib.rs").exists());
        assert!(ws.join(".ciflow/ci.yml").exists());
        assert!(!ws.join(".git").exists());
        assert!(!ws.join(".ciflow/cache").exists());
    }

    #[test]
    fn test_workspaces_are_isolated() {
        let source = source_tree();
        let a = Workspace::create(source.path(), &[]).unwrap();
        let b = Workspace::create(source.path(), &[]).unwrap();

        std::fs::write(a.path().join("Cargo.lock"), "changed").unwrap();

        assert_eq!(std::fs::read_to_string(b.path().join("Cargo.lock")).unwrap(), "version = 3\n");
        assert_eq!(
            std::fs::read_to_string(source.path().join("Cargo.lock")).unwrap(),
            "version = 3\n"
        );
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let source = source_tree();
        let workspace = Workspace::create(source.path(), &[]).unwrap();
        let path = workspace.path().to_path_buf();
        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_source_is_error() {
        let dir = TempDir::new().unwrap();
        let err = Workspace::create(&dir.path().join("nope"), &[]).err().unwrap();
        assert!(matches!(err, CiflowError::Workspace { .. }));
    }
}
