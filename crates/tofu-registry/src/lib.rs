//! OpenTofu registry protocol client for tofu-mirror
//!
//! This crate speaks the read side of the module and provider registry
//! protocols: service discovery, version listing and download descriptors.
//! The wire types in `api` are shared with the protocol server, which answers
//! the same documents back out.

pub mod api;
pub mod client;

// Re-export main types
pub use api::{
    ModuleDownloadResponse, ModuleVersionsResponse, PlatformEntry, ProviderDownloadResponse,
    ProviderVersionsResponse, ServiceDiscovery, DISCOVERY_PATH,
};
pub use client::{ApiEndpoints, DownloadInfo, RegistryClient, RemoteVersion};

use tofu_core::error::TofuError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, TofuError>;
