//! Publications: committed snapshots laid out by relative path
//!
//! Publishing is a pure transformation. No bytes move; each record is bound to
//! the artifact reference its bytes are served from.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use tofu_core::types::{ContentRecord, DownloadPolicy, Platform, RecordKey};
use tofu_registry::api::{PlatformEntry, ProviderVersionEntry};
use tofu_store::{ArtifactRef, ContentSet, SyncSnapshot};

use crate::PublishResult;

/// One record and where its bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    pub record: ContentRecord,
    pub artifact: ArtifactRef,
}

/// Immutable view of one committed snapshot, keyed by relative path
#[derive(Debug, Clone)]
pub struct Publication {
    pub repository: String,
    /// Ledger version the publication was made from
    pub version: u64,
    pub created_at: DateTime<Utc>,
    content: Arc<ContentSet>,
    artifacts: BTreeMap<String, PublishedArtifact>,
}

impl Publication {
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn content(&self) -> &ContentSet {
        &self.content
    }

    /// Artifact published at a relative path
    pub fn artifact(&self, relative_path: &str) -> Option<&PublishedArtifact> {
        self.artifacts.get(relative_path)
    }

    /// Every published artifact, by relative path
    pub fn artifacts(&self) -> impl Iterator<Item = (&str, &PublishedArtifact)> {
        self.artifacts.iter().map(|(path, artifact)| (path.as_str(), artifact))
    }

    /// Exact lookup by address, version and (for providers) platform
    pub fn find(&self, address: &str, version: &str, platform: Option<&Platform>) -> Option<&PublishedArtifact> {
        let (os, arch) = platform
            .map(|p| (p.os.clone(), p.arch.clone()))
            .unwrap_or_default();
        let key = RecordKey {
            address: address.to_string(),
            version: version.to_string(),
            os,
            arch,
        };

        self.content
            .get(&key)
            .and_then(|record| self.artifacts.get(&record.relative_path()))
    }

    /// Distinct versions of a module, in semver order
    pub fn module_versions(&self, address: &str) -> Vec<String> {
        let versions = self
            .content
            .versions_of(address)
            .into_iter()
            .map(str::to_string)
            .collect();
        sort_versions(versions)
    }

    /// Versions of a provider with their protocols and platforms, in semver order
    pub fn provider_versions(&self, address: &str) -> Vec<ProviderVersionEntry> {
        let mut grouped: BTreeMap<&str, (Vec<String>, Vec<PlatformEntry>)> = BTreeMap::new();

        for record in self.content.iter().filter(|r| r.address.path() == address) {
            let Some(platform) = &record.platform else {
                continue;
            };
            let (protocols, platforms) = grouped.entry(record.version.as_str()).or_default();
            for protocol in &record.protocols {
                if !protocols.contains(protocol) {
                    protocols.push(protocol.clone());
                }
            }
            platforms.push(PlatformEntry {
                os: platform.os.clone(),
                arch: platform.arch.clone(),
            });
        }

        let order = sort_versions(grouped.keys().map(|v| v.to_string()).collect());
        order
            .into_iter()
            .filter_map(|version| {
                grouped.remove(version.as_str()).map(|(mut protocols, platforms)| {
                    protocols.sort();
                    ProviderVersionEntry {
                        version,
                        protocols,
                        platforms,
                    }
                })
            })
            .collect()
    }
}

/// Sort version strings by semver precedence; unparseable versions go last,
/// in lexical order
pub fn sort_versions(mut versions: Vec<String>) -> Vec<String> {
    versions.sort_by(|a, b| {
        match (semver::Version::parse(a), semver::Version::parse(b)) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(b),
        }
    });
    versions
}

/// Builds publications from committed snapshots
#[derive(Debug, Clone, Default)]
pub struct PublishEngine;

impl PublishEngine {
    pub fn new() -> Self {
        Self
    }

    /// Bind every record of a committed snapshot to its relative path.
    ///
    /// Fails with `IncompleteSnapshot` for a draft.
    pub fn publish(&self, snapshot: &SyncSnapshot) -> PublishResult<Publication> {
        let version = snapshot.number()?;

        let mut artifacts = BTreeMap::new();
        for record in snapshot.content.iter() {
            let artifact = ArtifactRef::from_record(record);
            if record.policy == DownloadPolicy::Immediate && record.digest.is_none() {
                warn!("No stored artifact for {}; it will be fetched from {}", record, record.source_url);
            }

            let relative_path = record.relative_path();
            debug!("Published {} at {}", record, relative_path);
            artifacts.insert(
                relative_path,
                PublishedArtifact {
                    record: record.clone(),
                    artifact,
                },
            );
        }

        info!(
            "Published '{}' version {} ({} artifacts)",
            snapshot.repository,
            version,
            artifacts.len()
        );

        Ok(Publication {
            repository: snapshot.repository.clone(),
            version,
            created_at: Utc::now(),
            content: snapshot.content.clone(),
            artifacts,
        })
    }
}
