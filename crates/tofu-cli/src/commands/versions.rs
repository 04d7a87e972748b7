//! `tofu-mirror versions`: repository history and diffs

use tofu_core::error::TofuError;
use tofu_store::VersionLedger;

use super::CommandContext;

pub async fn execute(repository: &str, diff: Option<Vec<u64>>, ctx: &CommandContext) -> anyhow::Result<()> {
    ctx.config.repository(repository)?;
    let ledger = ctx.open_ledger()?;

    match diff.as_deref() {
        None => {
            for summary in ledger.list(repository)? {
                ctx.output.line(&format!(
                    "{:>4}  {}  {} records",
                    summary.number,
                    summary.created_at.format("%Y-%m-%d %H:%M:%S"),
                    summary.records
                ));
            }
        }
        Some(&[from, to]) => {
            let changes = ledger.diff(repository, from, to)?;
            for record in &changes.added {
                ctx.output.line(&format!("+ {}", record));
            }
            for record in &changes.removed {
                ctx.output.line(&format!("- {}", record));
            }
            ctx.output.info(&format!(
                "{} added, {} removed, {} unchanged",
                changes.added.len(),
                changes.removed.len(),
                changes.unchanged
            ));
        }
        Some(_) => return Err(TofuError::config("diff", "expects exactly two versions").into()),
    }
    Ok(())
}
