//! Versioned object store for smbop.
//!
//! This crate provides the external store the reconciler converges against:
//! the `ObjectStore` trait with optimistic concurrency on `resource_version`,
//! finalizer-gated deletion and owner-reference cascades, an in-process
//! `MemoryStore` with failure injection for tests, and a durable `FileStore`
//! that keeps one checksummed JSON file per object under a `StoreLayout`.

pub mod backend;
pub mod file;
pub mod gc;
pub mod integrity;
pub mod layout;
pub mod lock;
pub mod memory;
pub mod object;
mod ops;

pub use backend::ObjectStore;
pub use file::FileStore;
pub use gc::GcReport;
pub use integrity::{verify_store_integrity, IntegrityFailure, IntegrityReport};
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use lock::StoreLock;
pub use memory::{MemoryStore, Op};
pub use object::{Object, ObjectKey, ObjectMeta, OwnerReference};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` or `unlink()` is durable.
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
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object already exists: {0}")]
    AlreadyExists(String),
    #[error("conflict on {key}: expected resource version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },
    #[error("integrity check failed for '{subject}': expected {expected}, got {actual}")]
    IntegrityFailure {
        subject: String,
        expected: String,
        actual: String,
    },
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("cannot decode {key}: {reason}")]
    Decode { key: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Errors a caller may retry as-is: the store was briefly unreachable or
    /// another writer got there first.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Conflict { .. } | StoreError::LockFailed(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
