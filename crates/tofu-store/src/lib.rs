//! Storage services for tofu-mirror
//!
//! This crate provides the three collaborators the sync pipeline writes to:
//! a content-addressed object store keyed by SHA-256, an append-only version
//! ledger of repository snapshots, and the artifact fetcher that stages
//! downloaded bytes into the store.

pub mod cas;
pub mod fetch;
pub mod ledger;

// Re-export main types
pub use cas::{CasIndex, CasStore, ObjectEntry, ObjectStore};
pub use fetch::{ArtifactFetcher, ArtifactRef, FetchedArtifact, StagedArtifact};
pub use ledger::{
    ContentDiff, ContentQuery, ContentSet, FileLedger, SyncSnapshot, VersionLedger, VersionSummary,
};

use tofu_core::error::TofuError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, TofuError>;
