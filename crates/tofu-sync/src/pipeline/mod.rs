//! The sync state machine
//!
//! `DISCOVERING -> ENUMERATING -> (per address: FILTERING -> LISTING ->
//! FETCHING)* -> MERGING -> COMMITTED`, with `FAILED` reachable from any step
//! for errors that abort the run. Per-address, per-version and per-platform
//! failures are recorded as skips and the run carries on.
//!
//! Address workers run concurrently and emit declarations onto a bounded
//! channel; the driver is the only consumer and owns the content set being
//! built. Every registry and artifact request holds a permit from a shared
//! semaphore sized by the remote's concurrency limit.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use tofu_core::error::TofuError;
use tofu_core::types::{Address, ContentRecord, DownloadPolicy, Platform, RemoteConfig, SyncMode};
use tofu_registry::{ApiEndpoints, RegistryClient, RemoteVersion};
use tofu_store::{ArtifactFetcher, ContentSet, StagedArtifact, SyncSnapshot, VersionLedger};

use crate::control::{CancelFlag, Progress};
use crate::pattern::PatternMatcher;
use crate::retry::RetryPolicy;
use crate::SyncResult;

/// Depth of the declaration queue between workers and the driver
const DECLARATION_QUEUE_DEPTH: usize = 100;

/// Where a sync run is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    Discovering,
    Enumerating,
    Filtering,
    Listing,
    Fetching,
    Merging,
    Committed,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Pending => "PENDING",
            SyncState::Discovering => "DISCOVERING",
            SyncState::Enumerating => "ENUMERATING",
            SyncState::Filtering => "FILTERING",
            SyncState::Listing => "LISTING",
            SyncState::Fetching => "FETCHING",
            SyncState::Merging => "MERGING",
            SyncState::Committed => "COMMITTED",
            SyncState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A unit left out of the snapshot, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUnit {
    /// Address, `address@version` or `address@version (os_arch)`
    pub unit: String,
    pub reason: String,
}

impl fmt::Display for SkippedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.unit, self.reason)
    }
}

/// Outcome of a run that reached COMMITTED
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub repository: String,
    /// Ledger version now holding the repository's content
    pub version: u64,
    /// False when the run reused the previous version
    pub created_version: bool,
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Records in the resulting snapshot
    pub records: usize,
    /// Addresses processed, including skipped ones
    pub addresses: u64,
    pub skipped: Vec<SkippedUnit>,
    pub state: SyncState,
}

/// Messages from address workers to the driver
#[derive(Debug)]
enum Declaration {
    Record(ContentRecord),
    Skipped(SkippedUnit),
    /// A worker hit an error that aborts the whole run
    Aborted(TofuError),
    AddressDone,
}

/// State shared by every worker of one run
struct WorkerContext {
    client: RegistryClient,
    fetcher: Arc<ArtifactFetcher>,
    endpoints: ApiEndpoints,
    excludes: PatternMatcher,
    retry: RetryPolicy,
    policy: DownloadPolicy,
    limiter: Arc<Semaphore>,
    cancel: CancelFlag,
    declarations: mpsc::Sender<Declaration>,
}

/// Synchronizes a remote into a repository
pub struct SyncPipeline {
    client: RegistryClient,
    fetcher: Arc<ArtifactFetcher>,
    ledger: Arc<dyn VersionLedger>,
    progress: Progress,
    cancel: CancelFlag,
    state: watch::Sender<SyncState>,
}

impl SyncPipeline {
    pub fn new(client: RegistryClient, fetcher: Arc<ArtifactFetcher>, ledger: Arc<dyn VersionLedger>) -> Self {
        let (state, _) = watch::channel(SyncState::Pending);
        Self {
            client,
            fetcher,
            ledger,
            progress: Progress::new(),
            cancel: CancelFlag::new(),
            state,
        }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Handle that cancels the run between address-level steps
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    fn transition(&self, state: SyncState) {
        debug!("Sync state -> {}", state);
        self.state.send_replace(state);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancel.is_cancelled() {
            Err(TofuError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run one sync of `remote` into `repository`.
    ///
    /// Errors returned here are fatal and leave the ledger untouched; anything
    /// recoverable ends up in the report's skip list instead.
    pub async fn run(&self, repository: &str, remote: &RemoteConfig, mode: SyncMode) -> SyncResult<SyncReport> {
        // The run works from its own copy of the remote
        let remote = remote.clone();

        match self.drive(repository, &remote, mode).await {
            Ok(report) => {
                self.transition(SyncState::Committed);
                Ok(report)
            }
            Err(e) => {
                self.transition(SyncState::Failed);
                error!("Sync of '{}' from remote '{}' failed: {}", repository, remote.name, e);
                Err(e)
            }
        }
    }

    async fn drive(&self, repository: &str, remote: &RemoteConfig, mode: SyncMode) -> SyncResult<SyncReport> {
        remote.validate()?;
        info!(
            "Syncing '{}' from {} ({} includes, {} excludes, policy {}, {:?} mode)",
            repository,
            remote.url,
            remote.includes.len(),
            remote.excludes.len(),
            remote.policy,
            mode
        );

        let previous = self.ledger.latest(repository)?;
        let previous_number = previous.number()?;

        if remote.includes.is_empty() {
            warn!("Remote '{}' has no includes; nothing to sync", remote.name);
            self.progress.start(0);
            return Ok(SyncReport {
                repository: repository.to_string(),
                version: previous_number,
                created_version: false,
                added: 0,
                removed: 0,
                unchanged: previous.content.len(),
                records: previous.content.len(),
                addresses: 0,
                skipped: Vec::new(),
                state: SyncState::Committed,
            });
        }

        let retry = RetryPolicy::with_max_retries(remote.max_retries);

        self.transition(SyncState::Discovering);
        self.check_cancelled()?;
        let endpoints = retry
            .run("service discovery", || self.client.discover(&remote.url))
            .await
            .map_err(|e| match e {
                TofuError::Discovery { .. } => e,
                other => TofuError::Discovery {
                    url: remote.url.clone(),
                    reason: other.to_string(),
                },
            })?;

        self.transition(SyncState::Enumerating);
        self.progress.start(remote.includes.len() as u64);
        let mut skipped = Vec::new();
        let mut addresses = Vec::new();
        for include in &remote.includes {
            match Address::parse(include) {
                Ok(address) => {
                    endpoints.base_for(&address)?;
                    addresses.push(address);
                }
                Err(e) => {
                    error!("Skipping include '{}': {}", include, e);
                    skipped.push(SkippedUnit {
                        unit: include.clone(),
                        reason: e.to_string(),
                    });
                    self.progress.increment();
                }
            }
        }

        self.transition(SyncState::Filtering);
        let excludes = PatternMatcher::new(&remote.excludes);
        addresses.retain(|address| {
            if excludes.is_excluded(&[address.path()]) {
                info!("Excluding {}", address);
                self.progress.increment();
                false
            } else {
                true
            }
        });

        self.check_cancelled()?;
        self.transition(SyncState::Listing);
        let (fetched, mut worker_skips) = self
            .resolve_addresses(addresses, endpoints, excludes, retry, remote)
            .await?;
        skipped.append(&mut worker_skips);

        // Nothing is committed for a run cancelled before MERGING
        self.check_cancelled()?;

        self.transition(SyncState::Merging);
        let content = match mode {
            SyncMode::Additive => previous.content.union(&fetched),
            SyncMode::Mirror => fetched,
        };
        let diff = content.diff_from(&previous.content);
        let records = content.len();

        let (version, created_version) = if mode == SyncMode::Mirror && content == *previous.content {
            info!("Content of '{}' is unchanged, keeping version {}", repository, previous_number);
            (previous_number, false)
        } else {
            let snapshot = self.commit(repository, content).await?;
            (snapshot.number()?, true)
        };

        self.fetcher.store().flush()?;

        info!(
            "Synced '{}' to version {}: {} added, {} removed, {} unchanged, {} skipped",
            repository,
            version,
            diff.added.len(),
            diff.removed.len(),
            diff.unchanged,
            skipped.len()
        );

        Ok(SyncReport {
            repository: repository.to_string(),
            version,
            created_version,
            added: diff.added.len(),
            removed: diff.removed.len(),
            unchanged: diff.unchanged,
            records,
            addresses: self.progress.current().completed,
            skipped,
            state: SyncState::Committed,
        })
    }

    /// Ledger writes touch the filesystem, so they run off the async workers
    async fn commit(&self, repository: &str, content: ContentSet) -> SyncResult<SyncSnapshot> {
        let ledger = self.ledger.clone();
        let repository = repository.to_string();
        tokio::task::spawn_blocking(move || ledger.commit(&repository, content))
            .await
            .map_err(|e| TofuError::Ledger {
                reason: format!("commit task failed: {}", e),
            })?
    }

    /// Fan addresses out to workers and collect their declarations
    async fn resolve_addresses(
        &self,
        addresses: Vec<Address>,
        endpoints: ApiEndpoints,
        excludes: PatternMatcher,
        retry: RetryPolicy,
        remote: &RemoteConfig,
    ) -> SyncResult<(ContentSet, Vec<SkippedUnit>)> {
        let (sender, mut receiver) = mpsc::channel(DECLARATION_QUEUE_DEPTH);
        let context = Arc::new(WorkerContext {
            client: self.client.clone(),
            fetcher: self.fetcher.clone(),
            endpoints,
            excludes,
            retry,
            policy: remote.policy,
            limiter: Arc::new(Semaphore::new(remote.concurrency_limit)),
            cancel: self.cancel.clone(),
            declarations: sender,
        });

        let mut workers = JoinSet::new();
        for address in addresses {
            workers.spawn(sync_address(context.clone(), address));
        }
        // Workers hold the remaining senders; the queue closes when they finish
        drop(context);

        let mut content = ContentSet::new();
        let mut skipped = Vec::new();
        let mut aborted = None;
        while let Some(declaration) = receiver.recv().await {
            match declaration {
                Declaration::Record(record) => {
                    if !content.insert(record) {
                        debug!("Duplicate declaration ignored");
                    }
                }
                Declaration::Skipped(unit) => skipped.push(unit),
                Declaration::Aborted(e) => {
                    error!("Aborting sync: {}", e);
                    aborted.get_or_insert(e);
                }
                Declaration::AddressDone => {
                    let completed = self.progress.increment();
                    debug!("Address {}/{} done", completed, self.progress.current().total);
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Sync worker failed: {}", e);
            }
        }

        match aborted {
            Some(e) => Err(e),
            None => Ok((content, skipped)),
        }
    }
}

/// The driver drains the queue until every worker is gone, so a failed send
/// can only happen after the run was abandoned
async fn declare(context: &WorkerContext, declaration: Declaration) {
    let _ = context.declarations.send(declaration).await;
}

async fn skip(context: &WorkerContext, unit: String, error: TofuError) {
    declare(context, failure(unit, error)).await;
}

/// Recoverable failures leave `unit` out of the snapshot; fatal ones end the run
fn failure(unit: String, error: TofuError) -> Declaration {
    if error.is_fatal() {
        Declaration::Aborted(error)
    } else {
        Declaration::Skipped(SkippedUnit {
            unit,
            reason: error.to_string(),
        })
    }
}

/// Run a registry or artifact request under retry, one permit per attempt
async fn limited<T, F, Fut>(context: &WorkerContext, what: &str, operation: F) -> SyncResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = SyncResult<T>>,
{
    context
        .retry
        .run(what, || async {
            let _permit = context
                .limiter
                .acquire()
                .await
                .map_err(|_| TofuError::Cancelled)?;
            operation().await
        })
        .await
}

/// LISTING and FETCHING for one address
async fn sync_address(context: Arc<WorkerContext>, address: Address) {
    if !context.cancel.is_cancelled() {
        resolve_address(&context, &address).await;
    }
    declare(&context, Declaration::AddressDone).await;
}

async fn resolve_address(context: &Arc<WorkerContext>, address: &Address) {
    let base = match context.endpoints.base_for(address) {
        Ok(base) => base.to_string(),
        Err(e) => return skip(context, address.path(), e).await,
    };

    debug!("{}: {}", address, SyncState::Listing);
    let versions = match limited(context, &format!("versions of {}", address), || {
        context.client.list_versions(&base, address)
    })
    .await
    {
        Ok(versions) => versions,
        Err(e) => {
            warn!("Skipping {}: {}", address, e);
            return skip(context, address.path(), e).await;
        }
    };

    debug!("{}: {} ({} versions)", address, SyncState::Fetching, versions.len());
    for version in versions {
        if context.cancel.is_cancelled() {
            debug!("Sync cancelled, leaving {} unfinished", address);
            return;
        }

        let versioned_path = format!("{}/{}", address, version.version);
        if context.excludes.is_excluded(&[versioned_path.as_str()]) {
            info!("Excluding {}@{}", address, version.version);
            continue;
        }

        match address {
            Address::Module(_) => resolve_module_version(context, &base, address, &version).await,
            Address::Provider(_) => resolve_provider_version(context, &base, address, version).await,
        }
    }
}

async fn resolve_module_version(context: &WorkerContext, base: &str, address: &Address, version: &RemoteVersion) {
    let unit = format!("{}@{}", address, version.version);

    let info = match limited(context, &format!("download info of {}", unit), || {
        context.client.fetch_download_info(base, address, &version.version, None)
    })
    .await
    {
        Ok(info) => info,
        Err(e) => {
            error!("Skipping {}: {}", unit, e);
            return skip(context, unit, e).await;
        }
    };

    let staged = match stage(context, &info.download_url, None).await {
        Ok(staged) => staged,
        Err(e) => {
            error!("Skipping {}: {}", unit, e);
            return skip(context, unit, e).await;
        }
    };

    let record = build_record(
        ContentRecord::module(address.clone(), &version.version, &info.download_url),
        &staged,
        context.policy,
    );
    declare(context, Declaration::Record(record)).await;
}

async fn resolve_provider_version(
    context: &Arc<WorkerContext>,
    base: &str,
    address: &Address,
    version: RemoteVersion,
) {
    let version = Arc::new(version);
    let mut platforms = JoinSet::new();

    for platform in version.platforms.iter().cloned() {
        let platform_path = format!("{}/{}/{}", address, version.version, platform);
        if context.excludes.is_excluded(&[platform_path.as_str()]) {
            info!("Excluding {}@{} ({})", address, version.version, platform);
            continue;
        }

        platforms.spawn(resolve_provider_platform(
            context.clone(),
            base.to_string(),
            address.clone(),
            version.clone(),
            platform,
        ));
    }

    while platforms.join_next().await.is_some() {}
}

async fn resolve_provider_platform(
    context: Arc<WorkerContext>,
    base: String,
    address: Address,
    version: Arc<RemoteVersion>,
    platform: Platform,
) {
    let unit = format!("{}@{} ({})", address, version.version, platform);

    let info = match limited(&context, &format!("download info of {}", unit), || {
        context
            .client
            .fetch_download_info(&base, &address, &version.version, Some(&platform))
    })
    .await
    {
        Ok(info) => info,
        Err(e) => {
            error!("Skipping {}: {}", unit, e);
            return skip(&context, unit, e).await;
        }
    };

    let staged = match stage(&context, &info.download_url, info.shasum.as_ref()).await {
        Ok(staged) => staged,
        Err(e) => {
            error!("Skipping {}: {}", unit, e);
            return skip(&context, unit, e).await;
        }
    };

    let filename = info
        .filename
        .clone()
        .unwrap_or_else(|| default_provider_filename(&address, &version.version, &platform, &info.download_url));
    let protocols = if info.protocols.is_empty() {
        version.protocols.clone()
    } else {
        info.protocols.clone()
    };

    let record = build_record(
        ContentRecord::provider(address.clone(), &version.version, platform, &filename, &info.download_url)
            .with_protocols(protocols),
        &staged,
        context.policy,
    );
    declare(&context, Declaration::Record(record)).await;
}

async fn stage(
    context: &WorkerContext,
    url: &str,
    expected: Option<&tofu_core::utils::ContentHash>,
) -> SyncResult<StagedArtifact> {
    limited(context, &format!("download of {}", url), || {
        context.fetcher.stage(url, expected, context.policy)
    })
    .await
}

fn build_record(record: ContentRecord, staged: &StagedArtifact, policy: DownloadPolicy) -> ContentRecord {
    let mut record = record.with_policy(policy);
    record.digest = staged.digest();
    record.size = staged.size();
    record
}

/// Last URL segment, or the conventional provider package name
fn default_provider_filename(address: &Address, version: &str, platform: &Platform, url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|segment| !segment.is_empty() && segment.contains('.'))
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "terraform-provider-{}_{}_{}_{}.zip",
                address.name_or_type(),
                version,
                platform.os,
                platform.arch
            )
        })
}

#[cfg(test)]
mod tests;
