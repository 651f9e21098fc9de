// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for rnasim

use std::path::{Path, PathBuf};
use tracing::debug;

/// The name of the data directory
pub const DATA_DIR: &str = ".rnasim";

/// File name of the candidate store inside the data directory
pub const STORE_FILE: &str = "candidates.sqlite";

/// Result of finding a data root
#[derive(Debug)]
pub struct DataRoot {
    /// The directory containing the .rnasim folder
    pub root: PathBuf,
    /// The full path to the .rnasim folder
    pub data_path: PathBuf,
    /// Whether this is the current directory or a parent
    pub is_parent: bool,
}

/// Find the nearest .rnasim directory by walking up from the given path.
/// Returns None if no .rnasim directory is found.
pub fn find_data_root(start: impl AsRef<Path>) -> Option<DataRoot> {
    let mut current = start.as_ref().to_path_buf();

    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }

    let original = current.clone();

    loop {
        let data_path = current.join(DATA_DIR);
        if data_path.is_dir() {
            return Some(DataRoot {
                root: current.clone(),
                data_path,
                is_parent: current != original,
            });
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Default store path for `start`: inside the nearest existing data
/// directory, else a new one directly under `start`.
pub fn default_store_path(start: impl AsRef<Path>) -> PathBuf {
    match find_data_root(&start) {
        Some(root) => {
            if root.is_parent {
                debug!(root = %root.root.display(), "using data directory of a parent");
            }
            root.data_path.join(STORE_FILE)
        }
        None => start.as_ref().join(DATA_DIR).join(STORE_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_data_root_in_current_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(DATA_DIR)).unwrap();

        let result = find_data_root(dir.path()).unwrap();
        assert_eq!(result.root, dir.path().canonicalize().unwrap());
        assert!(!result.is_parent);
    }

    #[test]
    fn find_data_root_in_parent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(DATA_DIR)).unwrap();
        let subdir = dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();

        let result = find_data_root(&subdir).unwrap();
        assert_eq!(result.root, dir.path().canonicalize().unwrap());
        assert!(result.is_parent);
    }

    #[test]
    fn default_store_path_uses_parent_data_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(DATA_DIR)).unwrap();
        let subdir = dir.path().join("nested").join("deeper");
        fs::create_dir_all(&subdir).unwrap();

        assert_eq!(
            default_store_path(&subdir),
            dir.path().canonicalize().unwrap().join(DATA_DIR).join(STORE_FILE)
        );
    }

    #[test]
    fn default_store_path_fallback() {
        let dir = TempDir::new().unwrap();
        assert!(find_data_root(dir.path()).is_none());
        assert_eq!(
            default_store_path(dir.path()),
            dir.path().join(DATA_DIR).join(STORE_FILE)
        );
    }
}
