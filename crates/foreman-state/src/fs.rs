//! Filesystem-backed [`KvStore`] with atomic write-through.
//!
//! Layout: one file per key under `<root>/kv/`. Keys are percent-encoded so
//! that hierarchical keys like `plan/<uuid>` map to a single flat file name.
//! Writes go to a temp file in the same directory followed by a rename, so a
//! crash mid-write never corrupts the previously committed value.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use crate::error::StorageError;
use crate::storage_traits::{KvStore, StorageResult};

/// Filesystem key/value store rooted at a directory.
pub struct FsKvStore {
    kv_dir: PathBuf,
}

impl FsKvStore {
    /// Create a new `FsKvStore` rooted at `root`. Creates `root/kv/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let kv_dir = root.as_ref().join("kv");
        std::fs::create_dir_all(&kv_dir)?;
        Ok(Self { kv_dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.kv_dir.join(encode_key(key))
    }
}

/// Percent-encode a key into a safe flat file name.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02x}")),
        }
    }
    out
}

#[async_trait]
impl KvStore for FsKvStore {
    async fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.entry_path(key);
        let dir = self.kv_dir.clone();
        let value = value.to_vec();

        // Atomic write: temp file in the same directory, then rename.
        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&value)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.entry_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(tokio::fs::try_exists(self.entry_path(key)).await?)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
