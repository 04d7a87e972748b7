//! `tofu-mirror serve`: run the registry protocol server

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tofu_config::ConfigLayering;
use tofu_core::error::TofuError;
use tofu_publish::{Distribution, DistributionSource, PublishEngine, RegistryProtocolServer};
use tofu_registry::RegistryClient;
use tofu_store::VersionLedger;

use super::CommandContext;

/// Flags of the serve command
#[derive(Debug, Default)]
pub struct ServeOptions {
    pub repository: String,
    pub at: Option<u64>,
    pub bind: Option<String>,
    pub base_path: Option<String>,
    pub public_url: Option<String>,
}

pub async fn execute(options: ServeOptions, ctx: &CommandContext) -> anyhow::Result<()> {
    let (server, addr) = prepare(&options, ctx)?;

    ctx.output.success(&format!(
        "Serving '{}' on http://{} (Ctrl-C to stop)",
        options.repository, addr
    ));
    server
        .start(addr, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    ctx.output.info("Server stopped");
    Ok(())
}

/// Build the server and its listen address from configuration and flags
pub fn prepare(options: &ServeOptions, ctx: &CommandContext) -> anyhow::Result<(RegistryProtocolServer, SocketAddr)> {
    ctx.config.repository(&options.repository)?;

    let mut overrides = HashMap::new();
    if let Some(bind) = &options.bind {
        overrides.insert("server.bind".to_string(), bind.clone());
    }
    if let Some(base_path) = &options.base_path {
        overrides.insert("server.base_path".to_string(), base_path.clone());
    }
    if let Some(public_url) = &options.public_url {
        overrides.insert("server.public_url".to_string(), public_url.clone());
    }
    let config = ConfigLayering::merge_configs(ctx.config.clone(), HashMap::new(), overrides)?;

    let addr: SocketAddr = config.server.bind.parse().map_err(|e| {
        TofuError::config(
            "server.bind",
            format!("'{}' is not a socket address: {}", config.server.bind, e),
        )
    })?;

    let services = ctx.services(RegistryClient::new()?)?;
    let latest = services.ledger.latest(&options.repository)?;
    if latest.number()? == 0 {
        ctx.output.warn(&format!(
            "'{}' has never been synced; listings will be empty",
            options.repository
        ));
    }

    let source = match options.at {
        Some(number) => {
            let snapshot = services.ledger.get(&options.repository, number)?;
            DistributionSource::Publication(Arc::new(PublishEngine::new().publish(&snapshot)?))
        }
        None => DistributionSource::Repository(options.repository.clone()),
    };
    let distribution = Distribution::new(&options.repository, &config.server.base_path, source)?;

    let server = RegistryProtocolServer::new(&config.public_url(), services.ledger, services.fetcher)
        .with_distribution(distribution);
    Ok((server, addr))
}
