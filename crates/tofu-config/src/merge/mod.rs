//! Configuration lookup and environment/CLI override layering

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use tracing::debug;

use tofu_core::error::TofuError;

use crate::file::{self, MirrorToml};
use crate::ConfigResult;

/// Default configuration file name
pub const CONFIG_FILENAME: &str = "tofu-mirror.toml";

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "TOFU_MIRROR_CONFIG";

const ENV_PREFIX: &str = "TOFU_MIRROR_";

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

/// Configuration layering and merging
pub struct ConfigLayering;

/// Where the base configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Path given with --config
    CommandLine(Utf8PathBuf),
    /// Path named by TOFU_MIRROR_CONFIG
    Environment(Utf8PathBuf),
    /// tofu-mirror.toml found from the working directory upwards
    Project(Utf8PathBuf),
    /// No file found; built-in defaults
    Defaults,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    /// Load the configuration file, explicit path first
    pub async fn load(&self, explicit: Option<&Utf8Path>) -> ConfigResult<(MirrorToml, ConfigSource)> {
        if let Some(path) = explicit {
            let config = file::load_from_file(path).await?;
            return Ok((config, ConfigSource::CommandLine(path.to_path_buf())));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = Utf8PathBuf::from(path);
            let config = file::load_from_file(&path).await?;
            return Ok((config, ConfigSource::Environment(path)));
        }

        if let Some(path) = self.resolve_config_path(CONFIG_FILENAME) {
            let config = file::load_from_file(&path).await?;
            return Ok((config, ConfigSource::Project(path)));
        }

        debug!("No {} found, using defaults", CONFIG_FILENAME);
        Ok((MirrorToml::default(), ConfigSource::Defaults))
    }

    /// Find a configuration file (walks up directory tree)
    pub fn resolve_config_path(&self, filename: &str) -> Option<Utf8PathBuf> {
        let mut current = Some(self.cwd.as_path());

        while let Some(dir) = current {
            let config_path = dir.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
            current = dir.parent();
        }

        None
    }
}

impl ConfigLayering {
    /// Apply environment overrides, then CLI overrides, then re-validate
    pub fn merge_configs(
        base: MirrorToml,
        env_overrides: HashMap<String, String>,
        cli_overrides: HashMap<String, String>,
    ) -> ConfigResult<MirrorToml> {
        let mut merged = base;

        Self::apply_env_overrides(&mut merged, &env_overrides);
        Self::apply_cli_overrides(&mut merged, &cli_overrides)?;

        file::validate_config(&merged)?;
        Ok(merged)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: &mut MirrorToml, overrides: &HashMap<String, String>) {
        for (key, value) in overrides {
            match key.as_str() {
                "TOFU_MIRROR_STORE_PATH" => {
                    config.store.path = Some(Utf8PathBuf::from(value));
                }
                "TOFU_MIRROR_SERVER_BIND" => {
                    config.server.bind = value.clone();
                }
                "TOFU_MIRROR_SERVER_PUBLIC_URL" => {
                    config.server.public_url = Some(value.clone());
                }
                "TOFU_MIRROR_SERVER_BASE_PATH" => {
                    config.server.base_path = value.clone();
                }
                _ => {}
            }
        }
    }

    /// Apply CLI flag overrides
    fn apply_cli_overrides(config: &mut MirrorToml, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "store.path" => config.store.path = Some(Utf8PathBuf::from(value)),
                "server.bind" => config.server.bind = value.clone(),
                "server.public_url" => config.server.public_url = Some(value.clone()),
                "server.base_path" => config.server.base_path = value.clone(),
                other => {
                    return Err(TofuError::config(
                        other,
                        "not a setting that can be overridden from the command line",
                    ))
                }
            }
        }

        Ok(())
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX) && key != CONFIG_ENV_VAR)
            .collect()
    }
}
