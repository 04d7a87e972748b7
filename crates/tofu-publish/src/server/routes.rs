//! Request paths recognized below a distribution's base path

use tofu_core::types::Platform;
use tofu_core::utils::is_safe_relative_path;

/// Prefix of the module registry API below a base path
pub const MODULES_PREFIX: &str = "v1/modules";

/// Prefix of the provider registry API below a base path
pub const PROVIDERS_PREFIX: &str = "v1/providers";

/// Prefix of the artifact route below a base path
pub const ARTIFACTS_PREFIX: &str = "artifacts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Discovery,
    ModuleVersions { address: String },
    ModuleDownload { address: String, version: String },
    ProviderVersions { address: String },
    ProviderDownload {
        address: String,
        version: String,
        platform: Platform,
    },
    Artifact { relative_path: String },
}

impl Route {
    /// Parse a path relative to the base path
    pub fn parse(path: &str) -> Option<Route> {
        if let Some(relative_path) = path.strip_prefix(ARTIFACTS_PREFIX).and_then(|p| p.strip_prefix('/')) {
            return is_safe_relative_path(relative_path).then(|| Route::Artifact {
                relative_path: relative_path.to_string(),
            });
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let route = match segments.as_slice() {
            [".well-known", "terraform.json"] => Route::Discovery,
            ["v1", "modules", namespace, name, system, "versions"] => Route::ModuleVersions {
                address: format!("{}/{}/{}", namespace, name, system),
            },
            ["v1", "modules", namespace, name, system, version, "download"] => Route::ModuleDownload {
                address: format!("{}/{}/{}", namespace, name, system),
                version: version.to_string(),
            },
            ["v1", "providers", namespace, provider_type, "versions"] => Route::ProviderVersions {
                address: format!("{}/{}", namespace, provider_type),
            },
            ["v1", "providers", namespace, provider_type, version, "download", os, arch] => {
                Route::ProviderDownload {
                    address: format!("{}/{}", namespace, provider_type),
                    version: version.to_string(),
                    platform: Platform::new(os, arch),
                }
            }
            _ => return None,
        };
        Some(route)
    }
}
