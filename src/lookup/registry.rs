// src/lookup/registry.rs

//! Public registry lookups
//!
//! One blocking GET per package against the ecosystem's public index:
//! PyPI JSON API, the npm registry, Maven Central metadata, the Go module
//! proxy and the RubyGems API. Offline mode never touches the network.

use super::VersionLookup;
use crate::claim::PackageIdentity;
use crate::ecosystem::Ecosystem;
use crate::error::{Error, Result};
use crate::version::PackageVersion;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

/// Default timeout for registry requests (2 seconds)
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

static MAVEN_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<version>\s*([^<\s]+)\s*</version>").expect("valid regex"));

/// Base URLs of the registries
#[derive(Debug, Clone)]
pub struct RegistryEndpoints {
    pub pypi: String,
    pub npm: String,
    pub maven: String,
    pub go_proxy: String,
    pub rubygems: String,
}

impl Default for RegistryEndpoints {
    fn default() -> Self {
        Self {
            pypi: "https://pypi.org".to_string(),
            npm: "https://registry.npmjs.org".to_string(),
            maven: "https://repo1.maven.org/maven2".to_string(),
            go_proxy: "https://proxy.golang.org".to_string(),
            rubygems: "https://rubygems.org".to_string(),
        }
    }
}

/// Version lookup against the public registries
pub struct RegistryLookup {
    client: Option<Client>,
    endpoints: RegistryEndpoints,
}

impl RegistryLookup {
    /// Create a lookup; `offline` disables all network access
    pub fn new(timeout: Duration, offline: bool) -> Result<Self> {
        let client = if offline {
            None
        } else {
            Some(
                Client::builder()
                    .timeout(timeout)
                    .user_agent(concat!("envforge/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .map_err(|e| Error::LookupError(format!("Failed to create HTTP client: {e}")))?,
            )
        };
        Ok(Self {
            client,
            endpoints: RegistryEndpoints::default(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: RegistryEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn is_offline(&self) -> bool {
        self.client.is_none()
    }

    /// URL listing the versions of a package
    pub fn versions_url(&self, identity: &PackageIdentity) -> Option<String> {
        let name = identity.name();
        let e = &self.endpoints;
        match identity.ecosystem() {
            Ecosystem::PythonPip => Some(format!("{}/pypi/{}/json", e.pypi, name)),
            Ecosystem::NodeNpm => Some(format!("{}/{}", e.npm, name.replace('/', "%2F"))),
            Ecosystem::RubyGems => Some(format!("{}/api/v1/versions/{}.json", e.rubygems, name)),
            Ecosystem::GoModules => Some(format!("{}/{}/@v/list", e.go_proxy, escape_module_path(name))),
            Ecosystem::JavaMaven => {
                let (group, artifact) = name.split_once(':')?;
                Some(format!(
                    "{}/{}/{}/maven-metadata.xml",
                    e.maven,
                    group.replace('.', "/"),
                    artifact
                ))
            }
        }
    }

    fn fetch(&self, client: &Client, url: &str) -> Result<Option<String>> {
        let response = client
            .get(url)
            .send()
            .map_err(|e| Error::LookupError(format!("Failed to fetch {}: {}", url, e)))?;

        if response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::GONE {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::LookupError(format!("HTTP {} from {}", response.status(), url)));
        }

        let body = response
            .text()
            .map_err(|e| Error::LookupError(format!("Failed to read response: {}", e)))?;
        Ok(Some(body))
    }
}

impl VersionLookup for RegistryLookup {
    fn versions(&self, identity: &PackageIdentity) -> Result<Option<Vec<PackageVersion>>> {
        let Some(client) = &self.client else {
            return Ok(None);
        };
        let Some(url) = self.versions_url(identity) else {
            return Ok(None);
        };

        debug!("Looking up versions of {} at {}", identity, url);
        let Some(body) = self.fetch(client, &url)? else {
            return Ok(Some(Vec::new()));
        };

        let raw = parse_version_listing(identity.ecosystem(), &body)?;
        Ok(Some(
            raw.iter()
                .filter_map(|v| PackageVersion::parse(v).ok())
                .collect(),
        ))
    }
}

/// Extract version strings from a registry response body
pub fn parse_version_listing(ecosystem: Ecosystem, body: &str) -> Result<Vec<String>> {
    match ecosystem {
        Ecosystem::PythonPip => {
            let json: Value = serde_json::from_str(body)?;
            Ok(json
                .get("releases")
                .and_then(Value::as_object)
                .map(|releases| {
                    releases
                        .iter()
                        // Releases without files were deleted or never uploaded
                        .filter(|(_, files)| files.as_array().is_none_or(|f| !f.is_empty()))
                        .map(|(v, _)| v.clone())
                        .collect()
                })
                .unwrap_or_default())
        }
        Ecosystem::NodeNpm => {
            let json: Value = serde_json::from_str(body)?;
            Ok(json
                .get("versions")
                .and_then(Value::as_object)
                .map(|versions| versions.keys().cloned().collect())
                .unwrap_or_default())
        }
        Ecosystem::RubyGems => {
            let json: Value = serde_json::from_str(body)?;
            Ok(json
                .as_array()
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|e| e.get("platform").and_then(Value::as_str).is_none_or(|p| p == "ruby"))
                        .filter_map(|e| e.get("number").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default())
        }
        Ecosystem::GoModules => Ok(body
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Ecosystem::JavaMaven => Ok(MAVEN_VERSION_RE
            .captures_iter(body)
            .map(|c| c[1].to_string())
            .collect()),
    }
}

/// Go proxy case encoding: uppercase letters become `!` + lowercase
fn escape_module_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
