//! In-memory [`KvStore`] backend.
//!
//! Satisfies the trait contract without any external dependencies. Used as
//! the default backend in tests and for ephemeral daemon runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::{KvStore, StorageResult};

/// In-memory key/value store backed by a `HashMap<String, Vec<u8>>`.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn contains(&self, key: &str) -> StorageResult<bool> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.contains_key(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key);
        Ok(())
    }
}
