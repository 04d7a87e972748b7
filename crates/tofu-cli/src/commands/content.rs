//! `tofu-mirror content`: filtered listing of one version's records

use tofu_core::types::ContentRecord;
use tofu_store::{ContentQuery, VersionLedger};

use super::CommandContext;

/// Flags of the content command
#[derive(Debug, Default)]
pub struct ContentFilter {
    pub at: Option<u64>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub os: Option<String>,
    pub arch: Option<String>,
}

impl ContentFilter {
    fn query(&self) -> ContentQuery {
        let mut query = ContentQuery::new();
        if let Some(namespace) = &self.namespace {
            query = query.namespace(namespace.as_str());
        }
        if let Some(name) = &self.name {
            query = query.name(name.as_str());
        }
        if let Some(version) = &self.version {
            query = query.version(version.as_str());
        }
        if let Some(os) = &self.os {
            query = query.os(os.as_str());
        }
        if let Some(arch) = &self.arch {
            query = query.arch(arch.as_str());
        }
        query
    }
}

pub async fn execute(repository: &str, filter: ContentFilter, ctx: &CommandContext) -> anyhow::Result<()> {
    let records = matching_records(repository, &filter, ctx)?;
    for record in &records {
        let digest = record
            .digest
            .map(|digest| digest.to_hex())
            .unwrap_or_else(|| "-".to_string());
        ctx.output
            .line(&format!("{}\t{}\t{}", record, record.policy, digest));
    }
    ctx.output.info(&format!("{} records", records.len()));
    Ok(())
}

pub fn matching_records(
    repository: &str,
    filter: &ContentFilter,
    ctx: &CommandContext,
) -> anyhow::Result<Vec<ContentRecord>> {
    ctx.config.repository(repository)?;
    let ledger = ctx.open_ledger()?;

    let snapshot = match filter.at {
        Some(number) => ledger.get(repository, number)?,
        None => ledger.latest(repository)?,
    };
    let query = filter.query();
    Ok(snapshot.content.query(&query).cloned().collect())
}
