//! Publishing and serving for tofu-mirror
//!
//! A publication binds every record of a committed snapshot to its canonical
//! relative path. Distributions expose publications under a base path, and
//! the protocol server answers the registry protocol documents for them.

pub mod distribution;
pub mod publication;
pub mod server;

// Re-export main types
pub use distribution::{Distribution, DistributionSource};
pub use publication::{sort_versions, PublishEngine, Publication, PublishedArtifact};
pub use server::RegistryProtocolServer;

use tofu_core::error::TofuError;

/// Result type for publish operations
pub type PublishResult<T> = Result<T, TofuError>;
