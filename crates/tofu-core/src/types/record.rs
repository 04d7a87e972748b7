//! Content records: one concrete artifact in a repository.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::{Address, DownloadPolicy, Platform};
use crate::utils::ContentHash;

/// Filename every module archive is stored under
pub const MODULE_FILENAME: &str = "module.tar.gz";

/// One concrete artifact: an address at a version, and for providers a platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub address: Address,
    /// Semantic version string, as advertised by the registry
    pub version: String,
    /// Target platform (providers only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub filename: String,
    /// SHA-256 of the artifact bytes, once known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<ContentHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Supported protocol versions (provider protocols, e.g. "5.0")
    #[serde(default)]
    pub protocols: BTreeSet<String>,
    /// Where the artifact was fetched (or is to be fetched) from
    pub source_url: String,
    /// Whether the bytes are already in the object store or fetched lazily
    #[serde(default)]
    pub policy: DownloadPolicy,
}

/// Identity key of a record within one repository's content set.
///
/// The full address path is part of the key so modules that differ only in
/// their system never collide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub address: String,
    pub version: String,
    pub os: String,
    pub arch: String,
}

impl ContentRecord {
    /// Create a module record (filename fixed to `module.tar.gz`)
    pub fn module(address: Address, version: &str, source_url: &str) -> Self {
        Self {
            address,
            version: version.to_string(),
            platform: None,
            filename: MODULE_FILENAME.to_string(),
            digest: None,
            size: None,
            protocols: BTreeSet::new(),
            source_url: source_url.to_string(),
            policy: DownloadPolicy::Immediate,
        }
    }

    /// Create a provider record for one platform
    pub fn provider(
        address: Address,
        version: &str,
        platform: Platform,
        filename: &str,
        source_url: &str,
    ) -> Self {
        Self {
            address,
            version: version.to_string(),
            platform: Some(platform),
            filename: filename.to_string(),
            digest: None,
            size: None,
            protocols: BTreeSet::new(),
            source_url: source_url.to_string(),
            policy: DownloadPolicy::Immediate,
        }
    }

    pub fn with_digest(mut self, digest: ContentHash) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_policy(mut self, policy: DownloadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn key(&self) -> RecordKey {
        let (os, arch) = match &self.platform {
            Some(platform) => (platform.os.clone(), platform.arch.clone()),
            None => (String::new(), String::new()),
        };
        RecordKey {
            address: self.address.path(),
            version: self.version.clone(),
            os,
            arch,
        }
    }

    /// Canonical storage path of the artifact.
    ///
    /// Modules: `namespace/name/system/version/module.tar.gz`.
    /// Providers: `namespace/type/version/os_arch/filename`.
    pub fn relative_path(&self) -> String {
        match &self.platform {
            Some(platform) => format!(
                "{}/{}/{}/{}",
                self.address, self.version, platform, self.filename
            ),
            None => format!("{}/{}/{}", self.address, self.version, self.filename),
        }
    }

    /// `address/version`, used for exclude matching at version grain
    pub fn versioned_path(&self) -> String {
        format!("{}/{}", self.address, self.version)
    }
}

impl fmt::Display for ContentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.address, self.version)?;
        if let Some(platform) = &self.platform {
            write!(f, " ({})", platform)?;
        }
        Ok(())
    }
}
