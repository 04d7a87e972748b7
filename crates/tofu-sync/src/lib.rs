//! Synchronization pipeline for tofu-mirror
//!
//! Drives one remote's includes through discovery, version listing, download
//! resolution and artifact staging, then merges the result into the
//! repository's version ledger.

pub mod control;
pub mod pattern;
pub mod pipeline;
pub mod retry;

// Re-export main types
pub use control::{CancelFlag, Progress, ProgressUpdate};
pub use pattern::{is_excluded, PatternMatcher};
pub use pipeline::{SkippedUnit, SyncPipeline, SyncReport, SyncState};
pub use retry::RetryPolicy;

use tofu_core::error::TofuError;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, TofuError>;
