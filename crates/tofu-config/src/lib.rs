//! Configuration parsing for tofu-mirror
//!
//! This crate handles parsing and validation of `tofu-mirror.toml`, layering
//! environment and command-line overrides on top of it, and turning remote
//! sections into the read-only `RemoteConfig` a sync run works from.

pub mod merge;
pub mod file;

// Re-export main types
pub use merge::{ConfigLayering, ConfigLoader, ConfigSource, CONFIG_ENV_VAR, CONFIG_FILENAME};
pub use file::{MirrorToml, RemoteSection, RepositorySection, ServerSection, StoreSection};

use tofu_core::error::TofuError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, TofuError>;
