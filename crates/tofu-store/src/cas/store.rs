//! CAS store implementation

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use tofu_core::error::TofuError;
use tofu_core::utils::{compute_hash, ContentHash};

use super::{CasIndex, ObjectEntry, ObjectStore};
use crate::StoreResult;

/// Content-addressable storage on the local filesystem
#[derive(Debug)]
pub struct CasStore {
    /// Root directory for objects (`<store>/objects`)
    root_path: Utf8PathBuf,
    index: CasIndex,
    /// Suffix source for temporary files
    tmp_counter: AtomicU64,
}

impl CasStore {
    /// Open (or create) a store rooted at a directory
    pub fn new<P: AsRef<Utf8Path>>(root_path: P) -> StoreResult<Self> {
        let root_path = root_path.as_ref().to_path_buf();

        fs::create_dir_all(&root_path)
            .map_err(|e| TofuError::io(format!("Failed to create store directory {}", root_path), e))?;

        let index = CasIndex::load_or_create(root_path.join("index.json"))?;

        Ok(Self {
            root_path,
            index,
            tmp_counter: AtomicU64::new(0),
        })
    }

    /// Get the storage path for a digest
    fn hash_to_path(&self, digest: &ContentHash) -> Utf8PathBuf {
        let hex = digest.to_hex();
        // Store as objects/ab/cd/abcd...
        self.root_path.join(&hex[0..2]).join(&hex[2..4]).join(&hex)
    }

    pub fn root_path(&self) -> &Utf8Path {
        &self.root_path
    }

    pub fn index(&self) -> &CasIndex {
        &self.index
    }
}

impl ObjectStore for CasStore {
    fn put(&self, content: &[u8]) -> StoreResult<ContentHash> {
        let digest = compute_hash(content);
        let path = self.hash_to_path(&digest);

        if path.exists() {
            self.index.touch(&digest);
            return Ok(digest);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TofuError::io("Failed to create object directory".to_string(), e))?;
        }

        // Readers never see a partially written object
        let tmp_path = path.with_extension(format!(
            "tmp-{}-{}",
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp_path, content)
            .map_err(|e| TofuError::io(format!("Failed to write object {}", digest), e))?;
        fs::rename(&tmp_path, &path)
            .map_err(|e| TofuError::io(format!("Failed to move object {} into place", digest), e))?;

        self.index.insert(ObjectEntry::new(digest, content.len() as u64));
        debug!("Stored object {} ({} bytes)", digest, content.len());

        Ok(digest)
    }

    fn get(&self, digest: &ContentHash) -> StoreResult<Vec<u8>> {
        let path = self.hash_to_path(digest);

        if !path.exists() {
            return Err(TofuError::NotFound {
                what: format!("Object {}", digest),
            });
        }

        let content = fs::read(&path)
            .map_err(|e| TofuError::io(format!("Failed to read object {}", digest), e))?;
        self.index.touch(digest);

        Ok(content)
    }

    fn contains(&self, digest: &ContentHash) -> bool {
        self.hash_to_path(digest).exists()
    }

    fn size(&self, digest: &ContentHash) -> StoreResult<Option<u64>> {
        if !self.contains(digest) {
            return Ok(None);
        }
        if let Some(entry) = self.index.get(digest) {
            return Ok(Some(entry.size));
        }

        // Objects written before the index was last saved
        let path = self.hash_to_path(digest);
        let size = fs::metadata(&path)
            .map_err(|e| TofuError::io(format!("Failed to stat object {}", digest), e))?
            .len();
        self.index.insert(ObjectEntry::new(*digest, size));
        Ok(Some(size))
    }

    fn flush(&self) -> StoreResult<()> {
        self.index.save()
    }
}
