// src/resolver/plan.rs

//! Resolution result data structures
//!
//! Contains the per-attempt output of the resolver: one chosen version per
//! package together with the claims that justified it.

use crate::claim::{DependencyClaim, PackageIdentity};
use crate::ecosystem::Ecosystem;
use crate::version::{PackageVersion, VersionConstraint};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The version chosen for a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResolvedVersion {
    /// A concrete version
    Version(PackageVersion),
    /// No catalog was available; the installer picks within this range
    Range(VersionConstraint),
    /// Unconstrained and no catalog: whatever the registry calls latest
    Latest,
}

impl ResolvedVersion {
    pub fn version(&self) -> Option<&PackageVersion> {
        match self {
            ResolvedVersion::Version(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedVersion::Version(v) => write!(f, "{}", v),
            ResolvedVersion::Range(c) => write!(f, "{}", c),
            ResolvedVersion::Latest => write!(f, "latest"),
        }
    }
}

/// How the resolver arrived at a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionBasis {
    /// An exact pin claim
    Pinned,
    /// Highest catalog version inside the intersected range
    HighestInRange,
    /// Latest stable catalog version of an unconstrained package
    LatestStable,
    /// Range handed to the installer unchanged
    DeferredRange,
    /// Literal `latest` tag
    LatestTag,
}

/// One package in a resolved assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    pub identity: PackageIdentity,
    pub version: ResolvedVersion,
    pub basis: ResolutionBasis,
    /// Intersection of all constraints that applied
    pub constraint: VersionConstraint,
    /// Claims that justified the choice, in aggregation order
    pub justification: Vec<DependencyClaim>,
    /// Only low-confidence claims back this package
    pub tentative: bool,
    /// Constraint was loosened after a failed validation
    pub auto_fixed: bool,
}

/// One version per package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAssignment {
    entries: BTreeMap<PackageIdentity, ResolvedEntry>,
}

impl ResolvedAssignment {
    pub fn from_entries<I: IntoIterator<Item = ResolvedEntry>>(entries: I) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.identity.clone(), e))
                .collect(),
        }
    }

    pub fn get(&self, identity: &PackageIdentity) -> Option<&ResolvedEntry> {
        self.entries.get(identity)
    }

    pub fn get_mut(&mut self, identity: &PackageIdentity) -> Option<&mut ResolvedEntry> {
        self.entries.get_mut(identity)
    }

    pub fn contains(&self, identity: &PackageIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in identity order
    pub fn entries(&self) -> impl Iterator<Item = &ResolvedEntry> {
        self.entries.values()
    }

    pub fn identities(&self) -> impl Iterator<Item = &PackageIdentity> {
        self.entries.keys()
    }

    /// Ecosystems present in the assignment
    pub fn ecosystems(&self) -> BTreeSet<Ecosystem> {
        self.entries.keys().map(PackageIdentity::ecosystem).collect()
    }

    /// Entries belonging to one ecosystem
    pub fn for_ecosystem(&self, ecosystem: Ecosystem) -> Vec<&ResolvedEntry> {
        self.entries
            .values()
            .filter(|e| e.identity.ecosystem() == ecosystem)
            .collect()
    }

    pub fn tentative(&self) -> impl Iterator<Item = &ResolvedEntry> {
        self.entries.values().filter(|e| e.tentative)
    }

    pub fn auto_fixed(&self) -> impl Iterator<Item = &ResolvedEntry> {
        self.entries.values().filter(|e| e.auto_fixed)
    }
}

/// Constraint replacements applied by the resolution loop after a failure
///
/// An override replaces every claim constraint of its package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    constraints: BTreeMap<PackageIdentity, VersionConstraint>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identity: &PackageIdentity) -> Option<&VersionConstraint> {
        self.constraints.get(identity)
    }

    /// Set a package's constraint, returning the one it replaced
    pub fn set(&mut self, identity: PackageIdentity, constraint: VersionConstraint) -> Option<VersionConstraint> {
        self.constraints.insert(identity, constraint)
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PackageIdentity, &VersionConstraint)> {
        self.constraints.iter()
    }
}
