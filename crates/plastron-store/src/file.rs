use crate::{fsync_dir, StateStore, StoreError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File-backed state store: one JSON document per key under a root
/// directory. Writes are atomic (tempfile in the target directory,
/// `sync_all`, rename, directory fsync).
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let content = serde_json::to_string_pretty(value)?;

        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.key_path(key))
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&self.root)?;

        Ok(())
    }
}
