//! Remote configuration handed to a sync run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::TofuError;

/// Default number of concurrent registry requests per sync run
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 10;

/// Default timeout for a single registry request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry budget per request
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// When artifact bytes are downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPolicy {
    /// Download during the sync run
    #[default]
    Immediate,
    /// Download on first request, then keep
    OnDemand,
    /// Relay on every request, never keep
    Streamed,
}

impl DownloadPolicy {
    pub fn is_deferred(&self) -> bool {
        !matches!(self, DownloadPolicy::Immediate)
    }

    /// Whether lazily fetched bytes are kept in the object store
    pub fn stores_on_fetch(&self) -> bool {
        !matches!(self, DownloadPolicy::Streamed)
    }
}

impl fmt::Display for DownloadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DownloadPolicy::Immediate => "immediate",
            DownloadPolicy::OnDemand => "on_demand",
            DownloadPolicy::Streamed => "streamed",
        };
        f.write_str(name)
    }
}

impl FromStr for DownloadPolicy {
    type Err = TofuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(DownloadPolicy::Immediate),
            "on_demand" => Ok(DownloadPolicy::OnDemand),
            "streamed" => Ok(DownloadPolicy::Streamed),
            other => Err(TofuError::config(
                "policy",
                format!(
                    "'{}' is not one of immediate, on_demand, streamed",
                    other
                ),
            )),
        }
    }
}

/// How a sync result combines with the previous snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Union of previous and newly fetched content
    #[default]
    Additive,
    /// Exactly the newly fetched content
    Mirror,
}

impl SyncMode {
    pub fn from_mirror_flag(mirror: bool) -> Self {
        if mirror {
            SyncMode::Mirror
        } else {
            SyncMode::Additive
        }
    }
}

/// Operator-owned description of an upstream registry.
///
/// A sync run works on its own clone and never sees later edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub name: String,
    /// Discovery document URL or API base URL
    pub url: String,
    /// Fully qualified addresses to sync
    pub includes: Vec<String>,
    /// Glob patterns dropped after include resolution
    pub excludes: Vec<String>,
    pub policy: DownloadPolicy,
    pub concurrency_limit: usize,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl RemoteConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            includes: Vec::new(),
            excludes: Vec::new(),
            policy: DownloadPolicy::default(),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_includes<I, S>(mut self, includes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.includes = includes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_excludes<I, S>(mut self, excludes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes = excludes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_policy(mut self, policy: DownloadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pre-flight check run before any network call
    pub fn validate(&self) -> Result<(), TofuError> {
        if self.url.trim().is_empty() {
            return Err(TofuError::config(
                "url",
                "A remote must have a url specified to synchronize",
            ));
        }
        if self.concurrency_limit == 0 {
            return Err(TofuError::config(
                "concurrency_limit",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "on_demand".parse::<DownloadPolicy>().unwrap(),
            DownloadPolicy::OnDemand
        );
        assert!("lazy".parse::<DownloadPolicy>().is_err());
        assert!(DownloadPolicy::Streamed.is_deferred());
        assert!(!DownloadPolicy::Streamed.stores_on_fetch());
        assert!(!DownloadPolicy::Immediate.is_deferred());
    }

    #[test]
    fn test_remote_defaults() {
        let remote = RemoteConfig::new("upstream", "https://registry.opentofu.org");
        assert_eq!(remote.policy, DownloadPolicy::Immediate);
        assert_eq!(remote.concurrency_limit, 10);
        assert_eq!(remote.timeout, Duration::from_secs(30));
        assert!(remote.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        let remote = RemoteConfig::new("upstream", "  ");
        let err = remote.validate().unwrap_err();
        assert!(matches!(err, TofuError::Config { ref field, .. } if field == "url"));
    }

    #[test]
    fn test_sync_mode_from_flag() {
        assert_eq!(SyncMode::from_mirror_flag(true), SyncMode::Mirror);
        assert_eq!(SyncMode::from_mirror_flag(false), SyncMode::Additive);
    }
}
