//! Module and provider addresses.
//!
//! A module is addressed as `namespace/name/system`, a provider as
//! `namespace/type`. The `/`-joined form is what include and exclude patterns
//! are matched against.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TofuError;

/// Address of a module family in the module registry protocol
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleAddress {
    /// Organization or user owning the module
    pub namespace: String,
    /// Module name
    pub name: String,
    /// Target system (aws, azurerm, ...)
    pub system: String,
}

/// Address of a provider family in the provider registry protocol
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProviderAddress {
    /// Organization or user publishing the provider
    pub namespace: String,
    /// Provider type (aws, random, ...)
    #[serde(rename = "type")]
    pub provider_type: String,
}

/// Either kind of registry address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Address {
    Module(ModuleAddress),
    Provider(ProviderAddress),
}

/// Target platform of a provider package
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl ModuleAddress {
    pub fn new(namespace: &str, name: &str, system: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            system: system.to_string(),
        }
    }
}

impl ProviderAddress {
    pub fn new(namespace: &str, provider_type: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            provider_type: provider_type.to_string(),
        }
    }
}

impl Platform {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }
}

impl Address {
    /// Parse an include entry into an address.
    ///
    /// Three segments make a module, two a provider. Glob metacharacters are
    /// refused: the registry protocols have no catalog endpoint to expand them
    /// against.
    pub fn parse(spec: &str) -> Result<Self, TofuError> {
        if spec.contains(['*', '?', '[', ']']) {
            return Err(TofuError::config(
                "includes",
                format!(
                    "'{}' is a pattern; the registry has no listing endpoint, so includes must be explicit addresses",
                    spec
                ),
            ));
        }

        let segments: Vec<&str> = spec.split('/').collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(TofuError::config(
                "includes",
                format!("'{}' has an empty segment", spec),
            ));
        }

        match segments.as_slice() {
            [namespace, name, system] => {
                Ok(Address::Module(ModuleAddress::new(namespace, name, system)))
            }
            [namespace, provider_type] => {
                Ok(Address::Provider(ProviderAddress::new(namespace, provider_type)))
            }
            _ => Err(TofuError::config(
                "includes",
                format!(
                    "'{}' is neither namespace/name/system nor namespace/type",
                    spec
                ),
            )),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Address::Module(m) => &m.namespace,
            Address::Provider(p) => &p.namespace,
        }
    }

    /// Module name or provider type
    pub fn name_or_type(&self) -> &str {
        match self {
            Address::Module(m) => &m.name,
            Address::Provider(p) => &p.provider_type,
        }
    }

    pub fn is_provider(&self) -> bool {
        matches!(self, Address::Provider(_))
    }

    /// `/`-joined address path
    pub fn path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ModuleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.name, self.system)
    }
}

impl fmt::Display for ProviderAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.provider_type)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Module(m) => m.fmt(f),
            Address::Provider(p) => p.fmt(f),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

impl FromStr for Address {
    type Err = TofuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl From<ModuleAddress> for Address {
    fn from(address: ModuleAddress) -> Self {
        Address::Module(address)
    }
}

impl From<ProviderAddress> for Address {
    fn from(address: ProviderAddress) -> Self {
        Address::Provider(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module_address() {
        let address = Address::parse("hashicorp/consul/aws").unwrap();
        assert_eq!(
            address,
            Address::Module(ModuleAddress::new("hashicorp", "consul", "aws"))
        );
        assert_eq!(address.path(), "hashicorp/consul/aws");
        assert!(!address.is_provider());
    }

    #[test]
    fn test_parse_provider_address() {
        let address: Address = "opentofu/random".parse().unwrap();
        assert_eq!(address.namespace(), "opentofu");
        assert_eq!(address.name_or_type(), "random");
        assert!(address.is_provider());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Address::parse("hashicorp").is_err());
        assert!(Address::parse("a/b/c/d").is_err());
        assert!(Address::parse("hashicorp//aws").is_err());
        assert!(Address::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_wildcards() {
        let err = Address::parse("hashicorp/*/aws").unwrap_err();
        assert!(err.to_string().contains("listing endpoint"));
    }

    #[test]
    fn test_platform_display() {
        assert_eq!(Platform::new("linux", "arm64").to_string(), "linux_arm64");
    }

    #[test]
    fn test_address_serde_tagging() {
        let address = Address::parse("opentofu/random").unwrap();
        let json = serde_json::to_value(&address).unwrap();
        assert_eq!(json["kind"], "provider");
        assert_eq!(json["type"], "random");

        let back: Address = serde_json::from_value(json).unwrap();
        assert_eq!(back, address);
    }
}
