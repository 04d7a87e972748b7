//! Registry protocol wire types
//!
//! Field names follow the documents registries actually serve; unknown fields
//! are ignored on the way in.

use serde::{Deserialize, Serialize};

/// Well-known path of the service discovery document
pub const DISCOVERY_PATH: &str = ".well-known/terraform.json";

/// Protocol key for the module registry API
pub const MODULES_V1: &str = "modules.v1";

/// Protocol key for the provider registry API
pub const PROVIDERS_V1: &str = "providers.v1";

/// Service discovery document
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ServiceDiscovery {
    #[serde(rename = "modules.v1", default, skip_serializing_if = "Option::is_none")]
    pub modules_v1: Option<String>,
    #[serde(rename = "providers.v1", default, skip_serializing_if = "Option::is_none")]
    pub providers_v1: Option<String>,
}

/// `GET {modules.v1}/:namespace/:name/:system/versions`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ModuleVersionsResponse {
    #[serde(default)]
    pub modules: Vec<ModuleVersionList>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ModuleVersionList {
    #[serde(default)]
    pub versions: Vec<ModuleVersionEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModuleVersionEntry {
    pub version: String,
}

/// `GET {modules.v1}/:namespace/:name/:system/:version/download`
///
/// Registries answer either `204` with an `X-Terraform-Get` header or `200`
/// with this body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ModuleDownloadResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// `GET {providers.v1}/:namespace/:type/versions`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProviderVersionsResponse {
    #[serde(default)]
    pub versions: Vec<ProviderVersionEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProviderVersionEntry {
    pub version: String,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<PlatformEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlatformEntry {
    pub os: String,
    pub arch: String,
}

/// `GET {providers.v1}/:namespace/:type/:version/download/:os/:arch`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProviderDownloadResponse {
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_keys() {
        let doc: ServiceDiscovery = serde_json::from_str(
            r#"{"modules.v1": "/v1/modules/", "login.v1": {"client": "x"}}"#,
        )
        .unwrap();
        assert_eq!(doc.modules_v1.as_deref(), Some("/v1/modules/"));
        assert!(doc.providers_v1.is_none());

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json, serde_json::json!({"modules.v1": "/v1/modules/"}));
    }

    #[test]
    fn test_provider_versions_tolerates_missing_fields() {
        let doc: ProviderVersionsResponse = serde_json::from_str(
            r#"{"id": "opentofu/random", "versions": [{"version": "3.7.2"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.versions.len(), 1);
        assert!(doc.versions[0].platforms.is_empty());
    }
}
