//! Utility functions and helpers.
//!
//! Common functionality used across multiple tofu-mirror crates.

pub mod hash;
pub mod path;

// Re-export commonly used utilities
pub use hash::{compute_hash, verify_integrity, ContentHash, StreamingHasher};
pub use path::{is_safe_relative_path, join_url};
