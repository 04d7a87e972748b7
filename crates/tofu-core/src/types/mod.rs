//! Core data types for registry mirroring.
//!
//! This module provides the fundamental types used throughout tofu-mirror:
//! - Registry addresses for modules and providers
//! - Content records and their identity keys
//! - Remote configuration and sync policies

pub mod address;
pub mod record;
pub mod remote;

// Re-export all public types
pub use address::{Address, ModuleAddress, Platform, ProviderAddress};
pub use record::{ContentRecord, RecordKey, MODULE_FILENAME};
pub use remote::{
    DownloadPolicy, RemoteConfig, SyncMode, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_MAX_RETRIES,
    DEFAULT_TIMEOUT,
};
