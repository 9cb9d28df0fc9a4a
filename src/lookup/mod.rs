// src/lookup/mod.rs

//! Version lookup
//!
//! The resolver asks a [`VersionLookup`] which versions of a package exist
//! so it can choose the highest one in range, or "latest known stable" for
//! unconstrained packages. A lookup may be unavailable (offline, registry
//! down); callers fall back to range or `latest` tags in that case.

mod cache;
mod registry;

pub use cache::{CachedLookup, VersionCache, global_cache};
pub use registry::{RegistryEndpoints, RegistryLookup};

use crate::claim::PackageIdentity;
use crate::error::Result;
use crate::version::PackageVersion;
use std::collections::HashMap;

/// Source of published versions for a package
pub trait VersionLookup: Send + Sync {
    /// Published versions of a package
    ///
    /// `Ok(None)` means the lookup is unavailable for this package (offline,
    /// unsupported registry); `Ok(Some(vec![]))` means the registry knows of
    /// no versions at all.
    fn versions(&self, identity: &PackageIdentity) -> Result<Option<Vec<PackageVersion>>>;

    /// Highest stable version, if one is known
    fn latest_stable(&self, identity: &PackageIdentity) -> Option<PackageVersion> {
        match self.versions(identity) {
            Ok(Some(versions)) => versions.into_iter().filter(|v| !v.is_prerelease()).max(),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("Version lookup for {} failed: {}", identity, e);
                None
            }
        }
    }
}

/// Lookup that never knows anything (offline mode)
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineLookup;

impl VersionLookup for OfflineLookup {
    fn versions(&self, _identity: &PackageIdentity) -> Result<Option<Vec<PackageVersion>>> {
        Ok(None)
    }
}

/// Fixed in-memory catalog
///
/// Packages missing from the catalog are reported as unavailable, the same
/// as an offline registry.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    packages: HashMap<PackageIdentity, Vec<PackageVersion>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package with its published versions
    pub fn with_versions(mut self, identity: PackageIdentity, versions: &[&str]) -> Result<Self> {
        let parsed = versions
            .iter()
            .map(|v| PackageVersion::parse(v))
            .collect::<Result<Vec<_>>>()?;
        self.packages.insert(identity, parsed);
        Ok(self)
    }

    pub fn insert(&mut self, identity: PackageIdentity, versions: Vec<PackageVersion>) {
        self.packages.insert(identity, versions);
    }
}

impl VersionLookup for StaticCatalog {
    fn versions(&self, identity: &PackageIdentity) -> Result<Option<Vec<PackageVersion>>> {
        Ok(self.packages.get(identity).cloned())
    }
}
