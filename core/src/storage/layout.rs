//! Storage layout configuration

use std::path::{Path, PathBuf};

use crate::filesys::file::File;

/// Storage layout for the core
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Resolve a possibly relative directory against the base dir
    pub fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.base_dir.join(dir)
        }
    }

    /// Snapshot file of one collection inside a data directory
    pub fn collection_file(&self, data_dir: &Path, name: &str) -> File {
        File::new(self.resolve(data_dir).join(format!("{}.json", name)))
    }

    /// Append-only journal of one collection inside a data directory
    pub fn journal_file(&self, data_dir: &Path, name: &str) -> File {
        File::new(self.resolve(data_dir).join(format!("{}.jsonl", name)))
    }

    /// Default logs directory
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/etc/dockhand");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dockhand");

        Self::new(base_dir)
    }
}
