//! JSON-file backed version ledger
//!
//! One file per repository under the ledger root, rewritten in full on every
//! commit. Loaded histories are cached and re-read whenever the file changes
//! on disk, so ledgers opened by other processes on the same root see each
//! other's commits. Commits always start from the file, never the cache.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, info};

use tofu_core::error::TofuError;
use tofu_core::types::ContentRecord;

use super::{validate_repository_name, ContentSet, SyncSnapshot, VersionLedger, VersionSummary};
use crate::StoreResult;

/// On-disk form of one repository's history
#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    repository: String,
    versions: Vec<StoredVersion>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredVersion {
    number: u64,
    created_at: DateTime<Utc>,
    records: Vec<ContentRecord>,
}

/// What a history file looked like when it was read; `None` when absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp(Option<(SystemTime, u64)>);

#[derive(Debug, Clone)]
struct CachedHistory {
    stamp: FileStamp,
    /// Oldest first; index == version number
    snapshots: Arc<Vec<SyncSnapshot>>,
}

/// Ledger persisting each repository's snapshots as JSON
#[derive(Debug)]
pub struct FileLedger {
    root_path: Utf8PathBuf,
    histories: DashMap<String, CachedHistory>,
    /// Serializes read-modify-write commits from this handle
    commit_lock: Mutex<()>,
}

impl FileLedger {
    /// Open (or create) a ledger rooted at a directory
    pub fn open<P: AsRef<Utf8Path>>(root_path: P) -> StoreResult<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        fs::create_dir_all(&root_path)
            .map_err(|e| TofuError::io(format!("Failed to create ledger directory {}", root_path), e))?;

        Ok(Self {
            root_path,
            histories: DashMap::new(),
            commit_lock: Mutex::new(()),
        })
    }

    pub fn root_path(&self) -> &Utf8Path {
        &self.root_path
    }

    fn history_path(&self, repository: &str) -> Utf8PathBuf {
        self.root_path.join(format!("{}.json", repository))
    }

    fn stamp(&self, path: &Utf8Path) -> StoreResult<FileStamp> {
        match fs::metadata(path) {
            Ok(metadata) => {
                let modified = metadata
                    .modified()
                    .map_err(|e| TofuError::io(format!("Failed to stat ledger {}", path), e))?;
                Ok(FileStamp(Some((modified, metadata.len()))))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileStamp(None)),
            Err(e) => Err(TofuError::io(format!("Failed to stat ledger {}", path), e)),
        }
    }

    /// Read a history from disk, or start one at version 0
    fn load_history(&self, repository: &str) -> StoreResult<CachedHistory> {
        let path = self.history_path(repository);
        let stamp = self.stamp(&path)?;

        if stamp.0.is_none() {
            debug!("No ledger for '{}', starting at version 0", repository);
            return Ok(CachedHistory {
                stamp,
                snapshots: Arc::new(vec![SyncSnapshot::committed(
                    repository,
                    0,
                    Utc::now(),
                    Arc::new(ContentSet::new()),
                )]),
            });
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| TofuError::io(format!("Failed to read ledger {}", path), e))?;
        let file: LedgerFile = serde_json::from_str(&content).map_err(|e| TofuError::Ledger {
            reason: format!("ledger {} is unreadable: {}", path, e),
        })?;

        let mut history = Vec::with_capacity(file.versions.len());
        for (expected, stored) in file.versions.into_iter().enumerate() {
            if stored.number != expected as u64 {
                return Err(TofuError::Ledger {
                    reason: format!(
                        "ledger {} has version {} where {} was expected",
                        path, stored.number, expected
                    ),
                });
            }
            history.push(SyncSnapshot::committed(
                repository,
                stored.number,
                stored.created_at,
                Arc::new(stored.records.into_iter().collect()),
            ));
        }

        if history.is_empty() {
            return Err(TofuError::Ledger {
                reason: format!("ledger {} has no versions", path),
            });
        }

        debug!("Loaded {} versions of '{}' from {}", history.len(), repository, path);
        Ok(CachedHistory {
            stamp,
            snapshots: Arc::new(history),
        })
    }

    fn write_history(&self, repository: &str, history: &[SyncSnapshot]) -> StoreResult<()> {
        let file = LedgerFile {
            repository: repository.to_string(),
            versions: history
                .iter()
                .map(|snapshot| StoredVersion {
                    number: snapshot.version.unwrap_or_default(),
                    created_at: snapshot.created_at,
                    records: snapshot.content.iter().cloned().collect(),
                })
                .collect(),
        };

        let content = serde_json::to_string_pretty(&file).map_err(|e| TofuError::Ledger {
            reason: format!("failed to serialize ledger for '{}': {}", repository, e),
        })?;

        let path = self.history_path(repository);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .map_err(|e| TofuError::io(format!("Failed to write ledger {}", tmp_path), e))?;
        fs::rename(&tmp_path, &path)
            .map_err(|e| TofuError::io(format!("Failed to move ledger {} into place", path), e))?;

        Ok(())
    }

    /// Current history of a repository, re-read if the file moved on.
    ///
    /// No map guard is held across file I/O.
    fn history(&self, repository: &str) -> StoreResult<Arc<Vec<SyncSnapshot>>> {
        validate_repository_name(repository)?;

        let stamp = self.stamp(&self.history_path(repository))?;
        let cached = self
            .histories
            .get(repository)
            .filter(|cached| cached.stamp == stamp)
            .map(|cached| cached.snapshots.clone());
        if let Some(snapshots) = cached {
            return Ok(snapshots);
        }

        let loaded = self.load_history(repository)?;
        let snapshots = loaded.snapshots.clone();
        self.histories.insert(repository.to_string(), loaded);
        Ok(snapshots)
    }
}

impl VersionLedger for FileLedger {
    fn commit(&self, repository: &str, content: ContentSet) -> StoreResult<SyncSnapshot> {
        validate_repository_name(repository)?;
        let _guard = self.commit_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = self.load_history(repository)?;
        let mut history = current.snapshots.as_ref().clone();
        let number = history.len() as u64;
        let snapshot = SyncSnapshot::committed(repository, number, Utc::now(), Arc::new(content));
        history.push(snapshot.clone());

        self.write_history(repository, &history)?;
        let stamp = self.stamp(&self.history_path(repository))?;
        self.histories.insert(
            repository.to_string(),
            CachedHistory {
                stamp,
                snapshots: Arc::new(history),
            },
        );

        info!(
            "Committed version {} of '{}' ({} records)",
            number,
            repository,
            snapshot.content.len()
        );
        Ok(snapshot)
    }

    fn latest(&self, repository: &str) -> StoreResult<SyncSnapshot> {
        self.history(repository)?
            .last()
            .cloned()
            .ok_or_else(|| TofuError::Ledger {
                reason: format!("'{}' has an empty history", repository),
            })
    }

    fn get(&self, repository: &str, number: u64) -> StoreResult<SyncSnapshot> {
        self.history(repository)?
            .get(number as usize)
            .cloned()
            .ok_or_else(|| TofuError::NotFound {
                what: format!("Version {} of repository '{}'", number, repository),
            })
    }

    fn list(&self, repository: &str) -> StoreResult<Vec<VersionSummary>> {
        Ok(self.history(repository)?.iter().filter_map(SyncSnapshot::summary).collect())
    }
}
