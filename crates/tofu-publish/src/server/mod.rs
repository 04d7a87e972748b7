//! Registry protocol server
//!
//! Serves the read side of the module and provider registry protocols for
//! each distribution, plus the artifact bytes its download documents point
//! at. Requests outside any distribution's base path get a 404.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use tofu_core::error::TofuError;
use tofu_core::types::Platform;
use tofu_core::utils::join_url;
use tofu_registry::api::{
    ModuleDownloadResponse, ModuleVersionEntry, ModuleVersionList, ModuleVersionsResponse,
    ProviderDownloadResponse, ProviderVersionsResponse, ServiceDiscovery,
};
use tofu_store::{ArtifactFetcher, VersionLedger};

use crate::distribution::Distribution;
use crate::publication::{PublishEngine, Publication};
use crate::PublishResult;

pub mod routes;

use routes::{Route, ARTIFACTS_PREFIX, MODULES_PREFIX, PROVIDERS_PREFIX};

/// Header module clients read the download location from
const TERRAFORM_GET: &str = "x-terraform-get";

type HttpResponse = Response<Full<Bytes>>;

/// Read-only registry protocol server over a set of distributions
pub struct RegistryProtocolServer {
    /// Externally visible origin, prefixed to every download URL
    public_url: String,
    distributions: Vec<Arc<Distribution>>,
    ledger: Arc<dyn VersionLedger>,
    fetcher: Arc<ArtifactFetcher>,
    engine: PublishEngine,
}

impl RegistryProtocolServer {
    pub fn new(public_url: &str, ledger: Arc<dyn VersionLedger>, fetcher: Arc<ArtifactFetcher>) -> Self {
        Self {
            public_url: public_url.trim_end_matches('/').to_string(),
            distributions: Vec::new(),
            ledger,
            fetcher,
            engine: PublishEngine::new(),
        }
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distributions.push(Arc::new(distribution));
        self
    }

    pub fn distributions(&self) -> &[Arc<Distribution>] {
        &self.distributions
    }

    /// Bind `addr` and serve until `shutdown` resolves
    pub async fn start(self, addr: SocketAddr, shutdown: impl Future<Output = ()>) -> PublishResult<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TofuError::io(format!("Failed to bind {}", addr), e))?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from a bound listener until `shutdown` resolves
    pub async fn serve(self, listener: TcpListener, shutdown: impl Future<Output = ()>) -> PublishResult<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| TofuError::io("Failed to read listener address".to_string(), e))?;
        info!(
            "Registry server listening on {} ({} distributions, public url {})",
            local_addr,
            self.distributions.len(),
            self.public_url
        );

        let server = Arc::new(self);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("New connection from {}", peer);
                        let server = Arc::clone(&server);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| Self::handle_request(server.clone(), req));
                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                debug!("Connection error from {}: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
                _ = &mut shutdown => {
                    info!("Registry server on {} shutting down", local_addr);
                    return Ok(());
                }
            }
        }
    }

    async fn handle_request(server: Arc<Self>, req: Request<Incoming>) -> Result<HttpResponse, Infallible> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let response = server.respond(&method, &path).await;
        debug!("{} {} -> {}", method, path, response.status().as_u16());
        Ok(response)
    }

    async fn respond(&self, method: &Method, path: &str) -> HttpResponse {
        if method != Method::GET && method != Method::HEAD {
            return error_response(StatusCode::METHOD_NOT_ALLOWED, &format!("{} is not supported", method));
        }

        // The longest matching base path wins
        let Some((distribution, rest)) = self
            .distributions
            .iter()
            .filter_map(|d| d.strip_base(path).map(|rest| (d, rest)))
            .max_by_key(|(d, _)| d.base_path().len())
        else {
            return error_response(StatusCode::NOT_FOUND, &format!("No distribution serves {}", path));
        };

        let Some(route) = Route::parse(rest) else {
            return error_response(StatusCode::NOT_FOUND, &format!("Unknown registry path {}", path));
        };

        let publication = match distribution.resolve(self.ledger.as_ref(), &self.engine) {
            Ok(publication) => publication,
            Err(e) => {
                error!("Distribution '{}' has nothing to serve: {}", distribution.name, e);
                return error_for(&e);
            }
        };

        match route {
            Route::Discovery => json_response(StatusCode::OK, &self.discovery(distribution)),
            Route::ModuleVersions { address } => module_versions(&publication, &address),
            Route::ModuleDownload { address, version } => {
                self.module_download(distribution, &publication, &address, &version)
            }
            Route::ProviderVersions { address } => provider_versions(&publication, &address),
            Route::ProviderDownload {
                address,
                version,
                platform,
            } => self.provider_download(distribution, &publication, &address, &version, &platform),
            Route::Artifact { relative_path } => self.artifact(&publication, &relative_path).await,
        }
    }

    fn discovery(&self, distribution: &Distribution) -> ServiceDiscovery {
        let prefix = base_prefix(distribution);
        ServiceDiscovery {
            modules_v1: Some(format!("{}/{}/", prefix, MODULES_PREFIX)),
            providers_v1: Some(format!("{}/{}/", prefix, PROVIDERS_PREFIX)),
        }
    }

    /// Public URL of an artifact route
    fn artifact_url(&self, distribution: &Distribution, relative_path: &str) -> String {
        let route = format!("{}/{}/{}", base_prefix(distribution), ARTIFACTS_PREFIX, relative_path);
        join_url(&self.public_url, &route)
    }

    fn module_download(
        &self,
        distribution: &Distribution,
        publication: &Publication,
        address: &str,
        version: &str,
    ) -> HttpResponse {
        let Some(published) = publication.find(address, version, None) else {
            return not_found(&format!("{}@{}", address, version));
        };

        let location = self.artifact_url(distribution, &published.record.relative_path());
        let mut response = json_response(
            StatusCode::OK,
            &ModuleDownloadResponse {
                location: Some(location.clone()),
            },
        );
        match HeaderValue::from_str(&location) {
            Ok(value) => {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(TERRAFORM_GET), value);
            }
            Err(e) => warn!("Location {} cannot be sent as a header: {}", location, e),
        }
        response
    }

    fn provider_download(
        &self,
        distribution: &Distribution,
        publication: &Publication,
        address: &str,
        version: &str,
        platform: &Platform,
    ) -> HttpResponse {
        let Some(published) = publication.find(address, version, Some(platform)) else {
            return not_found(&format!("{}@{} ({})", address, version, platform));
        };

        let record = &published.record;
        json_response(
            StatusCode::OK,
            &ProviderDownloadResponse {
                protocols: record.protocols.iter().cloned().collect(),
                os: platform.os.clone(),
                arch: platform.arch.clone(),
                filename: Some(record.filename.clone()),
                download_url: Some(self.artifact_url(distribution, &record.relative_path())),
                shasum: record.digest.map(|digest| digest.to_hex()),
            },
        )
    }

    /// Artifact bytes in one body. Relayed artifacts are buffered and verified
    /// before the response starts, so a corrupt upstream body becomes a 502.
    async fn artifact(&self, publication: &Publication, relative_path: &str) -> HttpResponse {
        let Some(published) = publication.artifact(relative_path) else {
            return not_found(relative_path);
        };

        match self.fetcher.open(&published.artifact).await {
            Ok(content) => bytes_response(StatusCode::OK, "application/octet-stream", content),
            Err(e) => {
                error!("Failed to serve {}: {}", relative_path, e);
                error_for(&e)
            }
        }
    }
}

fn module_versions(publication: &Publication, address: &str) -> HttpResponse {
    let versions = publication.module_versions(address);
    if versions.is_empty() {
        return not_found(address);
    }

    json_response(
        StatusCode::OK,
        &ModuleVersionsResponse {
            modules: vec![ModuleVersionList {
                versions: versions
                    .into_iter()
                    .map(|version| ModuleVersionEntry { version })
                    .collect(),
            }],
        },
    )
}

fn provider_versions(publication: &Publication, address: &str) -> HttpResponse {
    let versions = publication.provider_versions(address);
    if versions.is_empty() {
        return not_found(address);
    }
    json_response(StatusCode::OK, &ProviderVersionsResponse { versions })
}

/// `/base` for a distribution, or nothing at the root
fn base_prefix(distribution: &Distribution) -> String {
    if distribution.base_path().is_empty() {
        String::new()
    } else {
        format!("/{}", distribution.base_path())
    }
}

fn status_for(error: &TofuError) -> StatusCode {
    match error {
        TofuError::NotFound { .. } => StatusCode::NOT_FOUND,
        TofuError::Fetch { .. } | TofuError::DigestMismatch { .. } | TofuError::Network { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_for(error: &TofuError) -> HttpResponse {
    error_response(status_for(error), &error.to_string())
}

fn not_found(what: &str) -> HttpResponse {
    error_response(StatusCode::NOT_FOUND, &format!("{} not found", what))
}

fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    let body = serde_json::json!({ "errors": [message] }).to_string();
    bytes_response(status, "application/json", body.into_bytes())
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(content) => bytes_response(status, "application/json", content),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn bytes_response(status: StatusCode, content_type: &'static str, content: Vec<u8>) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from(content)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
