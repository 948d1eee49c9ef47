//! A scratch directory standing in for a storage root.
//!
//! ```
//! use slive_test::storage::TestStorage;
//!
//! let storage = TestStorage::new();
//! std::fs::write(storage.path().join("file"), b"x").unwrap();
//! assert_eq!(storage.files_under("").len(), 1);
//! ```

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary directory that is deleted when dropped.
#[derive(Debug)]
pub struct TestStorage {
    tempdir: TempDir,
}

impl TestStorage {
    /// Creates a new, empty directory.
    pub fn new() -> Self {
        Self {
            tempdir: tempfile::tempdir().unwrap(),
        }
    }

    /// The root of the directory.
    pub fn path(&self) -> &Path {
        self.tempdir.path()
    }

    /// Resolves a `/`-separated path relative to the root.
    pub fn join(&self, relative: &str) -> PathBuf {
        self.path().join(relative.trim_start_matches('/'))
    }

    /// Returns all regular files below `relative`, relative to the root and sorted.
    pub fn files_under(&self, relative: &str) -> Vec<String> {
        let mut files = Vec::new();
        collect_files(self.path(), &self.join(relative), &mut files);
        files.sort();
        files
    }

    /// Returns all directories directly below `relative`, sorted by name.
    pub fn dirs_in(&self, relative: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.join(relative)) else {
            return Vec::new();
        };

        let mut dirs: Vec<_> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        dirs.sort();
        dirs
    }
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            collect_files(root, &path, files);
        } else if file_type.is_file() {
            if let Ok(relative) = path.strip_prefix(root) {
                files.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
}

impl Default for TestStorage {
    fn default() -> Self {
        Self::new()
    }
}
