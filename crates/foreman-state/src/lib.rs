//! Foreman persistence layer
//!
//! Exposes the [`KvStore`] trait plus two backends: an in-memory store for
//! tests and ephemeral runs, and a filesystem store with atomic
//! write-through for durable daemon state.

pub mod error;
pub mod fs;
pub mod memory;
pub mod storage_traits;

pub use error::StorageError;
pub use fs::FsKvStore;
pub use memory::MemoryKvStore;
pub use storage_traits::{KvStore, StorageResult};
