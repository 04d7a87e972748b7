//! Object index for metadata management
//!
//! Tracks size and timestamps of stored objects so sizes can be answered
//! without touching object files. The object files are the source of truth;
//! the index can be rebuilt and is never consulted to decide whether an
//! object exists.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use tofu_core::error::TofuError;
use tofu_core::utils::ContentHash;

use crate::StoreResult;

/// Metadata for a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub digest: ContentHash,
    /// Size in bytes
    pub size: u64,
    /// When the object was stored (unix seconds)
    pub stored_at: i64,
    /// When the object was last read (unix seconds)
    pub last_accessed: i64,
}

impl ObjectEntry {
    pub fn new(digest: ContentHash, size: u64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            digest,
            size,
            stored_at: now,
            last_accessed: now,
        }
    }

    /// Update last accessed time
    pub fn touch(&mut self) {
        self.last_accessed = Utc::now().timestamp();
    }
}

/// Index of stored objects, keyed by hex digest
#[derive(Debug)]
pub struct CasIndex {
    entries: DashMap<String, ObjectEntry>,
    index_path: PathBuf,
}

impl CasIndex {
    /// Load existing index or create new one
    pub fn load_or_create<P: AsRef<Path>>(index_path: P) -> StoreResult<Self> {
        let index_path = index_path.as_ref().to_path_buf();
        let entries = DashMap::new();

        if index_path.exists() {
            let content = fs::read_to_string(&index_path)
                .map_err(|e| TofuError::io(format!("Failed to read {}", index_path.display()), e))?;
            match serde_json::from_str::<Vec<ObjectEntry>>(&content) {
                Ok(loaded) => {
                    for entry in loaded {
                        entries.insert(entry.digest.to_hex(), entry);
                    }
                }
                // Stale or corrupt metadata only costs us sizes and timestamps
                Err(e) => warn!("Ignoring unreadable object index {}: {}", index_path.display(), e),
            }
        }

        Ok(Self { entries, index_path })
    }

    pub fn insert(&self, entry: ObjectEntry) {
        self.entries.insert(entry.digest.to_hex(), entry);
    }

    /// Get an entry, marking it accessed
    pub fn touch(&self, digest: &ContentHash) -> Option<ObjectEntry> {
        let mut entry = self.entries.get_mut(&digest.to_hex())?;
        entry.touch();
        Some(entry.value().clone())
    }

    pub fn get(&self, digest: &ContentHash) -> Option<ObjectEntry> {
        self.entries.get(&digest.to_hex()).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Save index to disk
    pub fn save(&self) -> StoreResult<()> {
        let mut entries: Vec<ObjectEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.digest.cmp(&b.digest));

        let content = serde_json::to_string_pretty(&entries).map_err(|e| TofuError::Parse {
            message: format!("object index: {}", e),
        })?;

        if let Some(parent) = self.index_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TofuError::io("Failed to create index directory".to_string(), e))?;
        }

        fs::write(&self.index_path, content)
            .map_err(|e| TofuError::io("Failed to write index file".to_string(), e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tofu_core::utils::compute_hash;

    #[test]
    fn test_index_operations() {
        let temp_dir = tempdir().unwrap();
        let index = CasIndex::load_or_create(temp_dir.path().join("index.json")).unwrap();
        assert!(index.is_empty());

        let digest = compute_hash(b"object");
        index.insert(ObjectEntry::new(digest, 6));

        assert_eq!(index.get(&digest).unwrap().size, 6);
        assert!(index.touch(&digest).is_some());
        assert!(index.get(&compute_hash(b"other")).is_none());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_index_persistence() {
        let temp_dir = tempdir().unwrap();
        let index_path = temp_dir.path().join("index.json");
        let digest = compute_hash(b"persisted");

        {
            let index = CasIndex::load_or_create(&index_path).unwrap();
            index.insert(ObjectEntry::new(digest, 1024));
            index.save().unwrap();
        }

        let index = CasIndex::load_or_create(&index_path).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&digest).unwrap().size, 1024);
    }

    #[test]
    fn test_corrupt_index_starts_empty() {
        let temp_dir = tempdir().unwrap();
        let index_path = temp_dir.path().join("index.json");
        std::fs::write(&index_path, "{ not json").unwrap();

        let index = CasIndex::load_or_create(&index_path).unwrap();
        assert!(index.is_empty());
    }
}
