//! `tofu-mirror publish`: bind a committed version to artifact paths

use tofu_publish::{PublishEngine, Publication};
use tofu_store::VersionLedger;

use super::CommandContext;

pub async fn execute(repository: &str, at: Option<u64>, list: bool, ctx: &CommandContext) -> anyhow::Result<()> {
    let publication = publish(repository, at, ctx)?;

    ctx.output.success(&format!(
        "Published '{}' version {} ({} artifacts)",
        publication.repository,
        publication.version,
        publication.len()
    ));

    if list {
        for (path, published) in publication.artifacts() {
            ctx.output
                .line(&format!("{}\t{}", path, published.record.policy));
        }
    }
    Ok(())
}

/// Publish `at`, or the latest version when unset
pub fn publish(repository: &str, at: Option<u64>, ctx: &CommandContext) -> anyhow::Result<Publication> {
    ctx.config.repository(repository)?;
    let ledger = ctx.open_ledger()?;

    let snapshot = match at {
        Some(number) => ledger.get(repository, number)?,
        None => ledger.latest(repository)?,
    };
    Ok(PublishEngine::new().publish(&snapshot)?)
}
