//! Artifact download and staging
//!
//! Immediate downloads hash the body as it streams in, verify it against the
//! registry-advertised digest when there is one, and land in the object
//! store. Deferred artifacts are only declared; their bytes are fetched the
//! first time a consumer asks for them.
//!
//! Every download is held in memory until its digest has been checked, so a
//! corrupted body is never stored or relayed. Artifact size is bounded by
//! available memory.

use dashmap::DashMap;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use tofu_core::error::TofuError;
use tofu_core::types::{ContentRecord, DownloadPolicy};
use tofu_core::utils::{ContentHash, StreamingHasher};

use crate::cas::ObjectStore;
use crate::StoreResult;

/// Dedup key: the same URL with a different expected digest is a different artifact
type FetchKey = (String, Option<ContentHash>);

/// An artifact whose bytes are in the object store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub digest: ContentHash,
    pub size: u64,
}

/// Outcome of staging one artifact under a download policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedArtifact {
    Stored(FetchedArtifact),
    Deferred {
        url: String,
        expected: Option<ContentHash>,
    },
}

/// Where a published artifact's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub url: String,
    pub digest: Option<ContentHash>,
    pub size: Option<u64>,
    pub policy: DownloadPolicy,
}

impl StagedArtifact {
    pub fn digest(&self) -> Option<ContentHash> {
        match self {
            StagedArtifact::Stored(artifact) => Some(artifact.digest),
            StagedArtifact::Deferred { expected, .. } => *expected,
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            StagedArtifact::Stored(artifact) => Some(artifact.size),
            StagedArtifact::Deferred { .. } => None,
        }
    }
}

impl ArtifactRef {
    pub fn from_record(record: &ContentRecord) -> Self {
        Self {
            url: record.source_url.clone(),
            digest: record.digest,
            size: record.size,
            policy: record.policy,
        }
    }

    /// Whether the bytes were stored during sync
    pub fn is_stored(&self) -> bool {
        !self.policy.is_deferred() && self.digest.is_some()
    }
}

/// Downloads artifacts into an object store
pub struct ArtifactFetcher {
    client: Client,
    store: Arc<dyn ObjectStore>,
    /// Downloads in flight, one per distinct (url, digest)
    in_flight: DashMap<FetchKey, Arc<OnceCell<FetchedArtifact>>>,
}

impl ArtifactFetcher {
    pub fn new(client: Client, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            client,
            store,
            in_flight: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Stage an artifact according to the download policy
    pub async fn stage(
        &self,
        url: &str,
        expected: Option<&ContentHash>,
        policy: DownloadPolicy,
    ) -> StoreResult<StagedArtifact> {
        if policy.is_deferred() {
            debug!("Deferring download of {} ({})", url, policy);
            return Ok(StagedArtifact::Deferred {
                url: url.to_string(),
                expected: expected.copied(),
            });
        }

        self.fetch(url, expected).await.map(StagedArtifact::Stored)
    }

    /// Download an artifact into the store.
    ///
    /// Callers asking for the same (url, digest) while a download is in flight
    /// wait for it and reuse its result. Once it settles the next call goes
    /// back to the remote, unless the expected digest is already stored.
    pub async fn fetch(&self, url: &str, expected: Option<&ContentHash>) -> StoreResult<FetchedArtifact> {
        let key: FetchKey = (url.to_string(), expected.copied());
        let cell = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        let result = cell
            .get_or_try_init(|| async {
                if let Some(digest) = expected {
                    if let Some(size) = self.store.size(digest)? {
                        debug!("{} already stored as {}", url, digest);
                        return Ok(FetchedArtifact {
                            digest: *digest,
                            size,
                        });
                    }
                }

                let content = self.download(url, expected).await?;
                let digest = self.store.put(&content)?;
                Ok::<_, TofuError>(FetchedArtifact {
                    digest,
                    size: content.len() as u64,
                })
            })
            .await
            .copied();

        self.in_flight.remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
        result
    }

    /// Download and verify without storing; the whole body is buffered
    pub async fn fetch_bytes(&self, url: &str, expected: Option<&ContentHash>) -> StoreResult<Vec<u8>> {
        self.download(url, expected).await
    }

    /// Bytes of a published artifact, fetching lazily when it was deferred
    pub async fn open(&self, artifact: &ArtifactRef) -> StoreResult<Vec<u8>> {
        if let Some(digest) = &artifact.digest {
            if self.store.contains(digest) {
                return self.store.get(digest);
            }
        }

        match artifact.policy {
            DownloadPolicy::Streamed => self.fetch_bytes(&artifact.url, artifact.digest.as_ref()).await,
            DownloadPolicy::OnDemand | DownloadPolicy::Immediate => {
                if artifact.policy == DownloadPolicy::Immediate {
                    warn!("Stored artifact {} is missing from the object store, refetching", artifact.url);
                }
                let fetched = self.fetch(&artifact.url, artifact.digest.as_ref()).await?;
                self.store.flush()?;
                self.store.get(&fetched.digest)
            }
        }
    }

    async fn download(&self, url: &str, expected: Option<&ContentHash>) -> StoreResult<Vec<u8>> {
        debug!("Downloading {}", url);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TofuError::network(format!("Failed to download {}: {}", url, e), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TofuError::Fetch {
                url: url.to_string(),
                reason: format!("server returned status {}", status),
                status: Some(status.as_u16()),
            });
        }

        let mut hasher = StreamingHasher::new();
        let mut content = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TofuError::network(format!("Failed to read body of {}: {}", url, e), e))?
        {
            hasher.update(&chunk);
            content.extend_from_slice(&chunk);
        }

        let actual = hasher.finalize();
        if let Some(expected) = expected {
            if actual != *expected {
                return Err(TofuError::DigestMismatch {
                    url: url.to_string(),
                    expected: expected.to_hex(),
                    actual: actual.to_hex(),
                });
            }
        }

        debug!("Downloaded {} ({} bytes, sha256 {})", url, content.len(), actual);
        Ok(content)
    }
}
