//! Storage trait definitions for Foreman
//!
//! A single abstraction is exposed: [`KvStore`], an opaque key/value
//! interface with crash-consistent read-after-write semantics. The plan
//! tracker persists write-through snapshots and the audit logger appends
//! records through this seam; neither knows anything about the backend.
//!
//! Backends provided here:
//! - [`crate::memory::MemoryKvStore`] — mutex-guarded map, default for tests
//! - [`crate::fs::FsKvStore`] — one file per key, atomic tmp-file + rename

use async_trait::async_trait;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Opaque key/value store.
///
/// Guarantees:
/// - `put(key, value)` is durable before the call returns (write-through).
/// - `get(key)` after a completed `put(key, _)` returns the exact bytes
///   last written, even across a process restart (crash consistency).
/// - A failed `put` never corrupts a previously committed value.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store a value under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Retrieve the value for `key`. Returns `StorageError::NotFound` if absent.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Check whether `key` exists in the store.
    async fn contains(&self, key: &str) -> StorageResult<bool>;

    /// Delete `key`. No-op if absent.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}
