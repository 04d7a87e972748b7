//! `tofu-mirror sync`: pull a repository's remote into the ledger

use anyhow::Context;

use tofu_core::types::SyncMode;
use tofu_registry::RegistryClient;
use tofu_sync::{SyncPipeline, SyncReport};

use super::CommandContext;
use crate::output::progress::ProgressBar;

pub async fn execute(repository: &str, mirror: bool, ctx: &CommandContext) -> anyhow::Result<()> {
    let report = run(repository, mirror, ctx).await?;
    print_report(&report, ctx);
    Ok(())
}

/// Run one sync and return its report. Ctrl-C cancels the run without committing.
pub async fn run(repository: &str, mirror: bool, ctx: &CommandContext) -> anyhow::Result<SyncReport> {
    let (section, configured_mode) = ctx.config.repository(repository)?;
    let mode = if mirror { SyncMode::Mirror } else { configured_mode };
    let remote = ctx.config.remote_config(&section.remote)?;

    let services = ctx.services(RegistryClient::with_timeout(remote.timeout)?)?;
    let pipeline = SyncPipeline::new(services.client, services.fetcher, services.ledger);

    ctx.output.info(&format!(
        "Syncing '{}' from remote '{}' ({}, {} mode)",
        repository,
        remote.name,
        remote.url,
        mode_name(mode)
    ));

    let mut updates = pipeline.progress().subscribe();
    let cancel = pipeline.cancel_flag();
    let mut bar = ProgressBar::new(0, format!("Syncing {}", repository));
    let mut drawn = false;
    let mut interrupted = false;

    let sync = pipeline.run(repository, &remote, mode);
    tokio::pin!(sync);

    let result = loop {
        tokio::select! {
            result = &mut sync => break result,
            Ok(()) = updates.changed() => {
                let update = *updates.borrow_and_update();
                bar.set_total(update.total);
                bar.update(update.completed);
                drawn = true;
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                ctx.output.warn("Interrupted; stopping after in-flight downloads");
                cancel.cancel();
            }
        }
    };

    if drawn {
        bar.finish();
    }

    result.with_context(|| format!("Sync of repository '{}' failed", repository))
}

fn mode_name(mode: SyncMode) -> &'static str {
    match mode {
        SyncMode::Additive => "additive",
        SyncMode::Mirror => "mirror",
    }
}

fn print_report(report: &SyncReport, ctx: &CommandContext) {
    for skipped in &report.skipped {
        ctx.output.warn(&format!("Skipped {}", skipped));
    }

    if report.created_version {
        ctx.output.success(&format!(
            "Committed '{}' version {}: {} added, {} removed, {} unchanged ({} records)",
            report.repository,
            report.version,
            report.added,
            report.removed,
            report.unchanged,
            report.records
        ));
    } else {
        ctx.output.info(&format!(
            "No changes; '{}' stays at version {} ({} records)",
            report.repository, report.version, report.records
        ));
    }

    ctx.output.info(&format!(
        "{} addresses processed, {} units skipped",
        report.addresses,
        report.skipped.len()
    ));
}
