//! Content-addressed object storage
//!
//! Objects are keyed by the SHA-256 of their bytes, so identical artifacts
//! pulled by different records or concurrent runs share one object.

use tofu_core::utils::ContentHash;

use crate::StoreResult;

pub mod index;
pub mod store;

// Re-export main types
pub use index::{CasIndex, ObjectEntry};
pub use store::CasStore;

/// Object store contract the pipeline and server depend on
pub trait ObjectStore: Send + Sync {
    /// Store bytes and return their digest. Storing the same bytes twice is a no-op.
    fn put(&self, content: &[u8]) -> StoreResult<ContentHash>;

    /// Read the bytes stored under a digest
    fn get(&self, digest: &ContentHash) -> StoreResult<Vec<u8>>;

    fn contains(&self, digest: &ContentHash) -> bool;

    /// Size of a stored object without reading it; `None` when absent
    fn size(&self, digest: &ContentHash) -> StoreResult<Option<u64>>;

    /// Persist any buffered metadata
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}
