//! Command implementations and dispatch logic.
//!
//! Each command is an async function taking the shared `CommandContext`.
//! Handlers return `anyhow::Result` so they can add context on top of the
//! `TofuError` the library crates return.

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use tofu_config::{ConfigLayering, ConfigLoader, ConfigSource, MirrorToml};
use tofu_core::error::{TofuError, TofuResult};
use tofu_registry::RegistryClient;
use tofu_store::{ArtifactFetcher, CasStore, FileLedger, ObjectStore};

pub mod content;
pub mod publish;
pub mod serve;
pub mod sync;
pub mod versions;


use crate::{output::OutputHandler, Commands};

/// Objects live under `<store>/objects`, ledger files under `<store>/ledger`
const OBJECTS_DIR: &str = "objects";
const LEDGER_DIR: &str = "ledger";

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: Utf8PathBuf,
    pub config: MirrorToml,
    pub source: ConfigSource,
    pub output: OutputHandler,
}

/// Storage and network collaborators opened from the store root
pub struct Services {
    pub client: RegistryClient,
    pub ledger: Arc<FileLedger>,
    pub fetcher: Arc<ArtifactFetcher>,
}

impl CommandContext {
    /// Load the configuration and layer environment and flag overrides on it
    pub async fn new(config: Option<&Utf8Path>, store: Option<&Utf8Path>) -> TofuResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| TofuError::io("Failed to get current directory".to_string(), e))?;
        let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(|p| {
            TofuError::config(
                "cwd",
                format!("Working directory {} is not valid UTF-8", p.display()),
            )
        })?;

        let (base, source) = ConfigLoader::new(cwd.clone()).load(config).await?;

        let mut cli_overrides = HashMap::new();
        if let Some(store) = store {
            cli_overrides.insert("store.path".to_string(), store.to_string());
        }
        let config = ConfigLayering::merge_configs(
            base,
            ConfigLayering::collect_env_overrides(),
            cli_overrides,
        )?;

        Ok(Self::from_config(cwd, config, source))
    }

    pub fn from_config(cwd: Utf8PathBuf, config: MirrorToml, source: ConfigSource) -> Self {
        Self {
            cwd,
            config,
            source,
            output: OutputHandler::new(),
        }
    }

    /// Store root, resolved against the working directory when relative
    pub fn store_root(&self) -> TofuResult<Utf8PathBuf> {
        let path = self.config.store_path()?;
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.cwd.join(path))
        }
    }

    pub fn open_ledger(&self) -> TofuResult<FileLedger> {
        FileLedger::open(self.store_root()?.join(LEDGER_DIR))
    }

    pub fn services(&self, client: RegistryClient) -> TofuResult<Services> {
        Services::open(&self.store_root()?, client)
    }
}

impl Services {
    pub fn open(root: &Utf8Path, client: RegistryClient) -> TofuResult<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(CasStore::new(root.join(OBJECTS_DIR))?);
        let ledger = Arc::new(FileLedger::open(root.join(LEDGER_DIR))?);
        let fetcher = Arc::new(ArtifactFetcher::new(client.http().clone(), store.clone()));
        Ok(Self {
            client,
            ledger,
            fetcher,
        })
    }
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> anyhow::Result<()> {
    debug!("Configuration source: {:?}", ctx.source);
    match command {
        Commands::Sync { repository, mirror } => {
            info!("Syncing repository: {} (mirror: {})", repository, mirror);
            sync::execute(&repository, mirror, ctx).await
        }
        Commands::Publish { repository, at, list } => {
            info!("Publishing repository: {} (at: {:?})", repository, at);
            publish::execute(&repository, at, list, ctx).await
        }
        Commands::Serve {
            repository,
            at,
            bind,
            base_path,
            public_url,
        } => {
            info!("Serving repository: {} (at: {:?})", repository, at);
            let options = serve::ServeOptions {
                repository,
                at,
                bind,
                base_path,
                public_url,
            };
            serve::execute(options, ctx).await
        }
        Commands::Versions { repository, diff } => {
            info!("Listing versions of repository: {}", repository);
            versions::execute(&repository, diff, ctx).await
        }
        Commands::Content {
            repository,
            at,
            namespace,
            name,
            version,
            os,
            arch,
        } => {
            info!("Listing content of repository: {} (at: {:?})", repository, at);
            let filter = content::ContentFilter {
                at,
                namespace,
                name,
                version,
                os,
                arch,
            };
            content::execute(&repository, filter, ctx).await
        }
    }
}
