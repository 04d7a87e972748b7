//! HTTP client for the registry protocols
//!
//! Every call carries the configured timeout and maps the response into the
//! shared error taxonomy. The client never retries; callers decide that.

use reqwest::{Client, ClientBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use tofu_core::error::TofuError;
use tofu_core::types::{Address, ModuleAddress, Platform, ProviderAddress, DEFAULT_TIMEOUT};
use tofu_core::utils::{join_url, ContentHash};

use crate::api::{
    ModuleDownloadResponse, ModuleVersionsResponse, ProviderDownloadResponse,
    ProviderVersionsResponse, ServiceDiscovery, DISCOVERY_PATH, MODULES_V1, PROVIDERS_V1,
};
use crate::RegistryResult;

/// Header some registries use instead of a JSON `location`
const TERRAFORM_GET_HEADER: &str = "x-terraform-get";

/// API base URLs resolved from a remote's URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    /// URL the endpoints were resolved from
    pub source: String,
    pub modules: Option<String>,
    pub providers: Option<String>,
}

/// One version advertised by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVersion {
    pub version: String,
    /// Supported protocol versions (providers only)
    pub protocols: Vec<String>,
    /// Available platforms (providers only)
    pub platforms: Vec<Platform>,
}

/// Download descriptor for one version (and platform)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadInfo {
    pub download_url: String,
    pub shasum: Option<ContentHash>,
    pub protocols: Vec<String>,
    pub filename: Option<String>,
}

impl ApiEndpoints {
    /// Use one URL as the base for both protocols
    pub fn direct(url: &str) -> Self {
        Self {
            source: url.to_string(),
            modules: Some(url.to_string()),
            providers: Some(url.to_string()),
        }
    }

    /// API base serving the given address's protocol
    pub fn base_for(&self, address: &Address) -> RegistryResult<&str> {
        let (base, key) = match address {
            Address::Module(_) => (self.modules.as_deref(), MODULES_V1),
            Address::Provider(_) => (self.providers.as_deref(), PROVIDERS_V1),
        };
        base.ok_or_else(|| TofuError::Discovery {
            url: self.source.clone(),
            reason: format!("Service discovery did not return a '{}' endpoint", key),
        })
    }
}

/// Registry protocol client
#[derive(Debug, Clone)]
pub struct RegistryClient {
    /// Underlying HTTP client with connection pooling
    client: Client,
    timeout: Duration,
}

impl RegistryClient {
    /// Create a client with the default request timeout
    pub fn new() -> RegistryResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> RegistryResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .gzip(true)
            .user_agent(concat!("tofu-mirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TofuError::network("Failed to create HTTP client".to_string(), e))?;

        Ok(Self { client, timeout })
    }

    /// Underlying HTTP client, shared with artifact downloads
    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve the API base URLs for a remote URL.
    ///
    /// A URL ending in the well-known discovery path is fetched and its
    /// protocol keys resolved against the document's origin; any other URL is
    /// taken as the API base for both protocols.
    ///
    /// Transport failures come back unchanged so the caller can retry them;
    /// an unusable document is a `Discovery` error.
    pub async fn discover(&self, url: &str) -> RegistryResult<ApiEndpoints> {
        if !url.trim_end_matches('/').ends_with(DISCOVERY_PATH) {
            debug!("{} is not a discovery document, using it as the API base", url);
            return Ok(ApiEndpoints::direct(url));
        }

        let discovery_error = |reason: String| TofuError::Discovery {
            url: url.to_string(),
            reason,
        };

        let document: ServiceDiscovery = self
            .get_json(url, "service discovery document")
            .await
            .map_err(|e| match e {
                TofuError::Fetch { .. } | TofuError::Network { .. } => e,
                other => discovery_error(other.to_string()),
            })?;

        if document.modules_v1.is_none() && document.providers_v1.is_none() {
            return Err(discovery_error(format!(
                "document advertises neither '{}' nor '{}'",
                MODULES_V1, PROVIDERS_V1
            )));
        }

        let resolve = |endpoint: Option<String>| -> RegistryResult<Option<String>> {
            endpoint
                .map(|value| resolve_endpoint(url, &value).map_err(discovery_error))
                .transpose()
        };

        let endpoints = ApiEndpoints {
            source: url.to_string(),
            modules: resolve(document.modules_v1)?,
            providers: resolve(document.providers_v1)?,
        };
        debug!(
            "Discovered endpoints for {}: modules={:?} providers={:?}",
            url, endpoints.modules, endpoints.providers
        );
        Ok(endpoints)
    }

    /// List every version the registry advertises for an address
    pub async fn list_versions(&self, base_url: &str, address: &Address) -> RegistryResult<Vec<RemoteVersion>> {
        let url = join_url(base_url, &format!("{}/versions", address));
        debug!("Fetching versions for {} from {}", address, url);

        let versions = match address {
            Address::Module(_) => {
                let response: ModuleVersionsResponse = self.get_json(&url, &address.path()).await?;
                response
                    .modules
                    .into_iter()
                    .next()
                    .map(|module| {
                        module
                            .versions
                            .into_iter()
                            .map(|entry| RemoteVersion {
                                version: entry.version,
                                protocols: Vec::new(),
                                platforms: Vec::new(),
                            })
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            }
            Address::Provider(_) => {
                let response: ProviderVersionsResponse = self.get_json(&url, &address.path()).await?;
                response
                    .versions
                    .into_iter()
                    .map(|entry| RemoteVersion {
                        version: entry.version,
                        protocols: entry.protocols,
                        platforms: entry
                            .platforms
                            .into_iter()
                            .map(|p| Platform { os: p.os, arch: p.arch })
                            .collect(),
                    })
                    .collect()
            }
        };

        if versions.is_empty() {
            return Err(TofuError::NotFound {
                what: format!("Versions for {}", address),
            });
        }

        Ok(versions)
    }

    /// Fetch the download descriptor for one version (and platform)
    pub async fn fetch_download_info(
        &self,
        base_url: &str,
        address: &Address,
        version: &str,
        platform: Option<&Platform>,
    ) -> RegistryResult<DownloadInfo> {
        match (address, platform) {
            (Address::Module(module), _) => self.fetch_module_download(base_url, module, version).await,
            (Address::Provider(provider), Some(platform)) => {
                self.fetch_provider_download(base_url, provider, version, platform).await
            }
            (Address::Provider(provider), None) => Err(TofuError::config(
                "platform",
                format!("Provider {} needs a platform to resolve a download", provider),
            )),
        }
    }

    async fn fetch_module_download(
        &self,
        base_url: &str,
        module: &ModuleAddress,
        version: &str,
    ) -> RegistryResult<DownloadInfo> {
        let url = join_url(base_url, &format!("{}/{}/download", module, version));
        let what = format!("{}@{}", module, version);
        debug!("Fetching download info for {}", what);

        let response = self.send(&url, &what).await?;
        let header_location = response
            .headers()
            .get(TERRAFORM_GET_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let location = match header_location {
            Some(location) => Some(location),
            None if response.status() == StatusCode::NO_CONTENT => None,
            None => {
                let body: ModuleDownloadResponse = parse_body(response, &url).await?;
                body.location
            }
        };

        let location = location.filter(|l| !l.trim().is_empty()).ok_or_else(|| {
            TofuError::MissingLocation {
                address: module.to_string(),
                version: version.to_string(),
            }
        })?;

        Ok(DownloadInfo {
            download_url: resolve_location(&url, &location),
            shasum: None,
            protocols: Vec::new(),
            filename: None,
        })
    }

    async fn fetch_provider_download(
        &self,
        base_url: &str,
        provider: &ProviderAddress,
        version: &str,
        platform: &Platform,
    ) -> RegistryResult<DownloadInfo> {
        let url = join_url(
            base_url,
            &format!("{}/{}/download/{}/{}", provider, version, platform.os, platform.arch),
        );
        let what = format!("{}@{} ({})", provider, version, platform);
        debug!("Fetching download info for {}", what);

        let body: ProviderDownloadResponse = self.get_json(&url, &what).await?;

        let download_url = body
            .download_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| TofuError::MissingLocation {
                address: provider.to_string(),
                version: format!("{} ({})", version, platform),
            })?;

        let shasum = body
            .shasum
            .filter(|s| !s.trim().is_empty())
            .map(|s| ContentHash::from_hex(&s))
            .transpose()?;

        Ok(DownloadInfo {
            download_url: resolve_location(&url, &download_url),
            shasum,
            protocols: body.protocols,
            filename: body.filename,
        })
    }

    /// GET a URL and classify the status
    async fn send(&self, url: &str, what: &str) -> RegistryResult<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| TofuError::network(format!("Failed to fetch {}: {}", url, e), e))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(TofuError::NotFound {
                what: what.to_string(),
            }),
            status => Err(TofuError::Fetch {
                url: url.to_string(),
                reason: format!("registry returned status {}", status),
                status: Some(status.as_u16()),
            }),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> RegistryResult<T> {
        let response = self.send(url, what).await?;
        parse_body(response, url).await
    }
}

async fn parse_body<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> RegistryResult<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| TofuError::network(format!("Failed to read response from {}", url), e))?;
    serde_json::from_slice(&bytes).map_err(|e| TofuError::Parse {
        message: format!("response from {}: {}", url, e),
    })
}

/// Resolve a discovery endpoint against the document's origin
fn resolve_endpoint(discovery_url: &str, endpoint: &str) -> Result<String, String> {
    if let Ok(absolute) = Url::parse(endpoint) {
        return Ok(absolute.to_string());
    }

    let parsed = Url::parse(discovery_url).map_err(|e| format!("invalid discovery url: {}", e))?;
    let origin = parsed.origin().ascii_serialization();
    let origin = Url::parse(&format!("{}/", origin)).map_err(|e| format!("invalid origin: {}", e))?;
    origin
        .join(endpoint)
        .map(|u| u.to_string())
        .map_err(|e| format!("invalid endpoint '{}': {}", endpoint, e))
}

/// Resolve a possibly relative download location against the descriptor URL
fn resolve_location(descriptor_url: &str, location: &str) -> String {
    // go-getter style forced-getter prefixes ("git::https://...") are kept verbatim
    if location.contains("::") || Url::parse(location).is_ok() {
        return location.to_string();
    }
    Url::parse(descriptor_url)
        .and_then(|base| base.join(location))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| location.to_string())
}
