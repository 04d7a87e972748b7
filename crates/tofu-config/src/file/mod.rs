//! tofu-mirror.toml parsing and serialization

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use tofu_core::error::TofuError;
use tofu_core::types::{
    Address, DownloadPolicy, RemoteConfig, SyncMode, DEFAULT_CONCURRENCY_LIMIT,
    DEFAULT_MAX_RETRIES,
};

use crate::ConfigResult;

/// Complete tofu-mirror.toml configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MirrorToml {
    /// Object store and ledger location
    #[serde(default)]
    pub store: StoreSection,

    /// Protocol server settings
    #[serde(default)]
    pub server: ServerSection,

    /// Upstream registries, by name
    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteSection>,

    /// Local repositories, by name
    #[serde(default)]
    pub repositories: BTreeMap<String, RepositorySection>,
}

/// Storage section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoreSection {
    /// Root directory for objects and ledger files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Utf8PathBuf>,
}

/// Server section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// URL prefix clients reach this server under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    /// Distribution base path, e.g. "registry"
    #[serde(default)]
    pub base_path: String,
}

/// An upstream registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSection {
    /// Discovery document or API base
    pub url: String,

    #[serde(default)]
    pub includes: Vec<String>,

    #[serde(default)]
    pub excludes: Vec<String>,

    #[serde(default)]
    pub policy: DownloadPolicy,

    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// A local repository fed by one remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySection {
    /// Name of the remote in `[remotes]`
    pub remote: String,

    /// Replace instead of union on sync
    #[serde(default)]
    pub mirror: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_concurrency_limit() -> usize {
    DEFAULT_CONCURRENCY_LIMIT
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
            base_path: String::new(),
        }
    }
}

impl MirrorToml {
    /// Build the read-only remote snapshot a sync run works from
    pub fn remote_config(&self, name: &str) -> ConfigResult<RemoteConfig> {
        let section = self.remotes.get(name).ok_or_else(|| {
            TofuError::config("remote", format!("No remote named '{}' in [remotes]", name))
        })?;

        let mut remote = RemoteConfig::new(name, &section.url)
            .with_includes(section.includes.iter().cloned())
            .with_excludes(section.excludes.iter().cloned())
            .with_policy(section.policy);
        remote.concurrency_limit = section.concurrency_limit;
        remote.timeout = Duration::from_secs(section.timeout_secs);
        remote.max_retries = section.max_retries;
        Ok(remote)
    }

    /// Look up a repository and its merge mode
    pub fn repository(&self, name: &str) -> ConfigResult<(&RepositorySection, SyncMode)> {
        let section = self.repositories.get(name).ok_or_else(|| {
            TofuError::config(
                "repository",
                format!("No repository named '{}' in [repositories]", name),
            )
        })?;
        Ok((section, SyncMode::from_mirror_flag(section.mirror)))
    }

    /// Store root, falling back to the platform data directory
    pub fn store_path(&self) -> ConfigResult<Utf8PathBuf> {
        if let Some(path) = &self.store.path {
            return Ok(path.clone());
        }

        let data_dir = dirs::data_dir().ok_or_else(|| {
            TofuError::config("store.path", "Could not determine a data directory; set store.path")
        })?;
        Utf8PathBuf::from_path_buf(data_dir.join("tofu-mirror")).map_err(|p| {
            TofuError::config(
                "store.path",
                format!("Data directory {} is not valid UTF-8", p.display()),
            )
        })
    }

    /// Prefix for `download_url` values in protocol responses
    pub fn public_url(&self) -> String {
        match &self.server.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.server.bind),
        }
    }
}

/// Parse a TOML string into a validated configuration
pub fn parse_mirror_toml(content: &str) -> ConfigResult<MirrorToml> {
    let config: MirrorToml = ::toml::from_str(content).map_err(|e| TofuError::Parse {
        message: format!("tofu-mirror.toml: {}", e),
    })?;

    validate_config(&config)?;

    Ok(config)
}

/// Serialize a configuration back to TOML
pub fn serialize_mirror_toml(config: &MirrorToml) -> ConfigResult<String> {
    ::toml::to_string_pretty(config).map_err(|e| TofuError::Parse {
        message: format!("TOML serialization error: {}", e),
    })
}

/// Validate configuration completeness
pub fn validate_config(config: &MirrorToml) -> ConfigResult<()> {
    for (name, remote) in &config.remotes {
        if remote.url.trim().is_empty() {
            return Err(TofuError::config(
                format!("remotes.{}.url", name),
                "A remote must have a url specified to synchronize",
            ));
        }

        if remote.concurrency_limit == 0 {
            return Err(TofuError::config(
                format!("remotes.{}.concurrency_limit", name),
                "must be at least 1",
            ));
        }

        if remote.includes.is_empty() {
            warn!("Remote '{}' has no includes; syncing it will be a no-op", name);
        }

        // Malformed entries are skipped per address at sync time
        for include in &remote.includes {
            if let Err(e) = Address::parse(include) {
                warn!("Remote '{}': {}", name, e);
            }
        }
    }

    for (name, repository) in &config.repositories {
        if !config.remotes.contains_key(&repository.remote) {
            return Err(TofuError::config(
                format!("repositories.{}.remote", name),
                format!("Unknown remote '{}'", repository.remote),
            ));
        }
    }

    if config.server.bind.parse::<std::net::SocketAddr>().is_err() {
        return Err(TofuError::config(
            "server.bind",
            format!("'{}' is not a socket address", config.server.bind),
        ));
    }

    Ok(())
}

/// Load and parse tofu-mirror.toml from file path
pub async fn load_from_file(path: &camino::Utf8Path) -> ConfigResult<MirrorToml> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| TofuError::io(format!("Failed to read {}", path), e))?;

    parse_mirror_toml(&content).map_err(|e| match e {
        TofuError::Parse { message } => TofuError::Parse {
            message: format!("in file {}: {}", path, message),
        },
        TofuError::Config { field, reason } => TofuError::Config {
            field,
            reason: format!("{} (in file {})", reason, path),
        },
        other => other,
    })
}
