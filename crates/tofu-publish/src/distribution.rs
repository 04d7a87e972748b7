//! Distributions: a base path bound to what it serves

use std::sync::{Arc, Mutex};
use tracing::debug;

use tofu_core::error::TofuError;
use tofu_store::VersionLedger;

use crate::publication::{PublishEngine, Publication};
use crate::PublishResult;

/// What a distribution serves
#[derive(Debug, Clone)]
pub enum DistributionSource {
    /// A fixed publication
    Publication(Arc<Publication>),
    /// The latest committed version of a repository, published on first use
    Repository(String),
}

/// A base path under which one publication is served
#[derive(Debug)]
pub struct Distribution {
    pub name: String,
    base_path: String,
    source: DistributionSource,
    /// Last publication made for a repository source
    latest: Mutex<Option<Arc<Publication>>>,
}

impl Distribution {
    pub fn new(name: &str, base_path: &str, source: DistributionSource) -> PublishResult<Self> {
        let base_path = normalize_base_path(base_path)?;
        Ok(Self {
            name: name.to_string(),
            base_path,
            source,
            latest: Mutex::new(None),
        })
    }

    /// Base path without leading or trailing slashes; empty for the root
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn source(&self) -> &DistributionSource {
        &self.source
    }

    /// The part of a request path below this distribution, if it is one of ours
    pub fn strip_base<'a>(&self, path: &'a str) -> Option<&'a str> {
        let path = path.trim_start_matches('/');
        if self.base_path.is_empty() {
            return Some(path);
        }

        let rest = path.strip_prefix(self.base_path.as_str())?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }

    /// Publication currently served.
    ///
    /// A repository source is republished only when the ledger has moved on.
    pub fn resolve(&self, ledger: &dyn VersionLedger, engine: &PublishEngine) -> PublishResult<Arc<Publication>> {
        let repository = match &self.source {
            DistributionSource::Publication(publication) => return Ok(publication.clone()),
            DistributionSource::Repository(repository) => repository,
        };

        let snapshot = ledger.latest(repository)?;
        let number = snapshot.number()?;

        let mut latest = self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(publication) = latest.as_ref() {
            if publication.version == number {
                return Ok(publication.clone());
            }
        }

        debug!(
            "Distribution '{}' publishing '{}' version {}",
            self.name, repository, number
        );
        let publication = Arc::new(engine.publish(&snapshot)?);
        *latest = Some(publication.clone());
        Ok(publication)
    }
}

fn normalize_base_path(base_path: &str) -> PublishResult<String> {
    let trimmed = base_path.trim().trim_matches('/');
    if trimmed.split('/').any(|segment| segment == "." || segment == "..")
        || trimmed.contains("//")
        || trimmed.contains(['?', '#', '\\'])
    {
        return Err(TofuError::config(
            "base_path",
            format!("'{}' is not a valid distribution base path", base_path),
        ));
    }
    Ok(trimmed.to_string())
}
