//! # tofu-core
//!
//! Core types and utilities shared across all tofu-mirror crates.
//!
//! This crate provides:
//! - Module and provider addresses for the OpenTofu registry protocols
//! - `ContentRecord`, the unit of content a repository snapshot holds
//! - `RemoteConfig` and the download policies a sync honors
//! - `TofuError` for unified error handling
//! - SHA-256 content hashing helpers
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (addresses, records, remote configuration)
//! - `error`: Error types and result aliases
//! - `utils`: Hashing and path helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{TofuError, TofuResult};
pub use types::{
    Address, ContentRecord, DownloadPolicy, ModuleAddress, Platform, ProviderAddress, RecordKey,
    RemoteConfig, SyncMode,
};
pub use utils::{compute_hash, ContentHash};
