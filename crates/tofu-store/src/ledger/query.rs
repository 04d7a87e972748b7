//! Filtered content listing

use tofu_core::types::ContentRecord;

/// Filter over a snapshot's records. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentQuery {
    pub namespace: Option<String>,
    /// Module name or provider type
    pub name: Option<String>,
    pub version: Option<String>,
    pub os: Option<String>,
    pub arch: Option<String>,
}

impl ContentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }

    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self
    }

    pub fn matches(&self, record: &ContentRecord) -> bool {
        let platform_os = record.platform.as_ref().map(|p| p.os.as_str());
        let platform_arch = record.platform.as_ref().map(|p| p.arch.as_str());

        field_matches(&self.namespace, Some(record.address.namespace()))
            && field_matches(&self.name, Some(record.address.name_or_type()))
            && field_matches(&self.version, Some(record.version.as_str()))
            && field_matches(&self.os, platform_os)
            && field_matches(&self.arch, platform_arch)
    }
}

fn field_matches(filter: &Option<String>, value: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(expected) => value == Some(expected.as_str()),
    }
}
