//! # tofu-mirror
//!
//! Operator CLI for an OpenTofu module and provider registry mirror.
//!
//! This is the main entry point. It parses the command line, sets up logging,
//! loads the configuration and dispatches to the command handlers.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Crates whose logs are shown by default
const LOG_TARGETS: &[&str] = &[
    "tofu_mirror",
    "tofu_core",
    "tofu_config",
    "tofu_registry",
    "tofu_store",
    "tofu_sync",
    "tofu_publish",
];

/// Mirror OpenTofu modules and providers and serve them over the registry protocol
#[derive(Parser)]
#[command(name = "tofu-mirror", version, about = "OpenTofu registry mirror")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to $TOFU_MIRROR_CONFIG, then tofu-mirror.toml searched upwards)
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Store root, overriding store.path
    #[arg(long, global = true)]
    pub store: Option<Utf8PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize a repository from its remote
    Sync {
        /// Repository name from [repositories]
        repository: String,
        /// Remove content the remote no longer has, regardless of the repository's mirror flag
        #[arg(long)]
        mirror: bool,
    },
    /// Publish a committed repository version
    Publish {
        repository: String,
        /// Ledger version to publish (defaults to the latest)
        #[arg(long)]
        at: Option<u64>,
        /// List every published path
        #[arg(long)]
        list: bool,
    },
    /// Serve a repository over the registry protocol
    Serve {
        /// Repository to serve
        #[arg(long, default_value = "main")]
        repository: String,
        /// Pin a ledger version instead of following the latest
        #[arg(long)]
        at: Option<u64>,
        /// Listen address, overriding server.bind
        #[arg(long)]
        bind: Option<String>,
        /// Distribution base path, overriding server.base_path
        #[arg(long)]
        base_path: Option<String>,
        /// Prefix for download URLs, overriding server.public_url
        #[arg(long)]
        public_url: Option<String>,
    },
    /// Show a repository's version history
    Versions {
        repository: String,
        /// Show what changed between two versions
        #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
        diff: Option<Vec<u64>>,
    },
    /// List the records in a repository version
    Content {
        repository: String,
        /// Ledger version to inspect (defaults to the latest)
        #[arg(long)]
        at: Option<u64>,
        #[arg(long)]
        namespace: Option<String>,
        /// Module name or provider type
        #[arg(long)]
        name: Option<String>,
        /// Record version
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        os: Option<String>,
        #[arg(long)]
        arch: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.log_json);
    setup_panic_handler();

    info!("Starting tofu-mirror v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", ErrorFormatter::new().format_report(&e));
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| anyhow::anyhow!("Failed to create async runtime: {}", e))?;

    rt.block_on(async {
        let ctx = CommandContext::new(cli.config.as_deref(), cli.store.as_deref()).await?;
        commands::dispatch_command(cli.command, &ctx).await
    })
}

fn log_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = LOG_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect();
        EnvFilter::new(directives.join(","))
    })
}

fn setup_logging(verbose: bool, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("tofu-mirror encountered an unexpected error: {}", panic_info);
        eprintln!("tofu-mirror crashed! This is a bug.");
        eprintln!("Error: {}", panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync() {
        let cli = Cli::try_parse_from(["tofu-mirror", "--verbose", "sync", "main", "--mirror"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Sync { repository, mirror } => {
                assert_eq!(repository, "main");
                assert!(mirror);
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::try_parse_from(["tofu-mirror", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        match cli.command {
            Commands::Serve {
                repository,
                at,
                bind,
                base_path,
                public_url,
            } => {
                assert_eq!(repository, "main");
                assert_eq!(at, None);
                assert_eq!(bind.as_deref(), Some("0.0.0.0:9000"));
                assert!(base_path.is_none());
                assert!(public_url.is_none());
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_versions_diff() {
        let cli = Cli::try_parse_from(["tofu-mirror", "versions", "main", "--diff", "1", "3"]).unwrap();
        match cli.command {
            Commands::Versions { diff, .. } => assert_eq!(diff, Some(vec![1, 3])),
            _ => panic!("expected versions"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tofu-mirror", "content", "main", "--os", "linux", "--log-json"]).unwrap();
        assert!(cli.log_json);
    }
}
