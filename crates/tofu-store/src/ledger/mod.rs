//! Append-only repository version ledger
//!
//! Every commit produces a new immutable snapshot with the next version
//! number. Version 0 is the empty snapshot every repository starts at.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use tofu_core::error::TofuError;

use crate::StoreResult;

pub mod content;
pub mod file;
pub mod query;

// Re-export main types
pub use content::{ContentDiff, ContentSet};
pub use file::FileLedger;
pub use query::ContentQuery;

/// The content set of one repository at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub repository: String,
    /// Ledger version; `None` while the snapshot is still being written
    pub version: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub content: Arc<ContentSet>,
}

/// One line of a repository's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSummary {
    pub number: u64,
    pub created_at: DateTime<Utc>,
    pub records: usize,
}

impl SyncSnapshot {
    /// A snapshot under construction, not yet handed to the ledger
    pub fn draft(repository: &str, content: ContentSet) -> Self {
        Self {
            repository: repository.to_string(),
            version: None,
            created_at: Utc::now(),
            content: Arc::new(content),
        }
    }

    pub(crate) fn committed(repository: &str, number: u64, created_at: DateTime<Utc>, content: Arc<ContentSet>) -> Self {
        Self {
            repository: repository.to_string(),
            version: Some(number),
            created_at,
            content,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.version.is_some()
    }

    /// Version number of a committed snapshot
    pub fn number(&self) -> StoreResult<u64> {
        self.version.ok_or_else(|| TofuError::IncompleteSnapshot {
            repository: self.repository.clone(),
        })
    }

    pub fn summary(&self) -> Option<VersionSummary> {
        self.version.map(|number| VersionSummary {
            number,
            created_at: self.created_at,
            records: self.content.len(),
        })
    }
}

/// Version ledger contract the pipeline commits to
pub trait VersionLedger: Send + Sync {
    /// Append a new version holding exactly `content`
    fn commit(&self, repository: &str, content: ContentSet) -> StoreResult<SyncSnapshot>;

    /// Newest committed snapshot; version 0 for a repository never synced
    fn latest(&self, repository: &str) -> StoreResult<SyncSnapshot>;

    fn get(&self, repository: &str, number: u64) -> StoreResult<SyncSnapshot>;

    /// Every version, oldest first
    fn list(&self, repository: &str) -> StoreResult<Vec<VersionSummary>>;

    /// Changes going from version `from` to version `to`
    fn diff(&self, repository: &str, from: u64, to: u64) -> StoreResult<ContentDiff> {
        let older = self.get(repository, from)?;
        let newer = self.get(repository, to)?;
        Ok(newer.content.diff_from(&older.content))
    }
}

/// Repository names become file names; keep them to one safe path segment
pub(crate) fn validate_repository_name(repository: &str) -> StoreResult<()> {
    let valid = !repository.is_empty()
        && repository != "."
        && repository != ".."
        && repository
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(TofuError::Ledger {
            reason: format!(
                "'{}' is not a valid repository name (use letters, digits, '-', '_' and '.')",
                repository
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_has_no_number() {
        let draft = SyncSnapshot::draft("main", ContentSet::new());
        assert!(!draft.is_committed());
        assert!(matches!(draft.number(), Err(TofuError::IncompleteSnapshot { .. })));
        assert!(draft.summary().is_none());
    }

    #[test]
    fn test_repository_names() {
        assert!(validate_repository_name("main").is_ok());
        assert!(validate_repository_name("opentofu-mirror_2.x").is_ok());
        assert!(validate_repository_name("").is_err());
        assert!(validate_repository_name("..").is_err());
        assert!(validate_repository_name("a/b").is_err());
    }
}
