//! Persistence layer for Plastron.
//!
//! This crate provides the `StateStore` key/value boundary the orchestrator
//! persists through, a `FileStore` with atomic tempfile+rename writes, an
//! in-memory store for tests, a typed `SnapshotStore` for the tracked
//! container set with blake3 integrity checksums, and a `StoreLock` that
//! enforces the single-active-instance assumption.

pub mod file;
pub mod lock;
pub mod memory;
pub mod snapshot;

pub use file::FileStore;
pub use lock::StoreLock;
pub use memory::MemoryStore;
pub use snapshot::{SnapshotStore, SNAPSHOT_KEY};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("integrity check failed for '{key}': expected {expected}, got {actual}")]
    IntegrityFailure {
        key: String,
        expected: String,
        actual: String,
    },
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
}

/// Key/value persistence boundary: JSON documents under logical keys.
///
/// The orchestrator stores the serialized container array under a single
/// fixed key; `get` of an absent key returns `None` rather than an error.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;
}
