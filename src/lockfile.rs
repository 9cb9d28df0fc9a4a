// src/lockfile.rs

//! Environment lockfile
//!
//! `envforge.lock` records the accepted assignment of a project so the same
//! environment can be recreated and drift can be detected on the next run.
//!
//! # Format
//!
//! ```toml
//! [metadata]
//! version = 1
//! generated = "2024-01-15T10:30:00Z"
//! generator = "envforge 0.1.0"
//! project = "services/api (python-pip)"
//! content_hash = "sha256:9f2c..."
//!
//! [[packages]]
//! id = "python-pip:numpy"
//! version = "1.26.4"
//! basis = "highest_in_range"
//! sources = ["import-scan", "manifest-file"]
//! ```
//!
//! The content hash covers package ids and versions only, so regenerating an
//! unchanged environment yields the same hash with a new timestamp.

use crate::claim::PackageIdentity;
use crate::error::{Error, Result};
use crate::manifest::ManifestFile;
use crate::resolver::{ResolutionBasis, ResolvedAssignment};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

/// Current lockfile format version
pub const LOCKFILE_VERSION: u32 = 1;

/// Default lockfile name
pub const LOCKFILE_NAME: &str = "envforge.lock";

/// Lockfile root structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
    pub metadata: LockfileMetadata,

    #[serde(default)]
    pub packages: Vec<LockedPackage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockfileMetadata {
    /// Lockfile format version
    pub version: u32,

    /// When the lockfile was generated (RFC 3339)
    pub generated: String,

    /// Tool that generated the lockfile
    pub generator: String,

    /// Project label
    pub project: String,

    /// Hash of the locked package set (`sha256:...`)
    pub content_hash: String,
}

/// A locked package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    pub id: PackageIdentity,

    /// Exact version, a deferred range, or `latest`
    pub version: String,

    pub basis: ResolutionBasis,

    /// Evidence sources behind the package, deduplicated
    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tentative: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_fixed: bool,
}

/// A difference between a lockfile and a new assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockDrift {
    Changed {
        package: PackageIdentity,
        locked: String,
        resolved: String,
    },
    /// Locked but no longer resolved
    Removed(PackageIdentity),
    /// Resolved but not locked
    Added(PackageIdentity),
}

impl fmt::Display for LockDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Changed {
                package,
                locked,
                resolved,
            } => write!(f, "{}: locked {}, resolved {}", package, locked, resolved),
            Self::Removed(package) => write!(f, "{}: locked but no longer required", package),
            Self::Added(package) => write!(f, "{}: new, not in lockfile", package),
        }
    }
}

impl Lockfile {
    /// Lock an accepted assignment
    pub fn from_assignment(project: &str, assignment: &ResolvedAssignment) -> Self {
        let packages: Vec<LockedPackage> = assignment
            .entries()
            .map(|entry| {
                let sources: BTreeSet<&str> = entry.justification.iter().map(|c| c.source_kind.as_str()).collect();
                LockedPackage {
                    id: entry.identity.clone(),
                    version: entry.version.to_string(),
                    basis: entry.basis,
                    sources: sources.into_iter().map(str::to_string).collect(),
                    tentative: entry.tentative,
                    auto_fixed: entry.auto_fixed,
                }
            })
            .collect();

        Self {
            metadata: LockfileMetadata {
                version: LOCKFILE_VERSION,
                generated: Utc::now().to_rfc3339(),
                generator: format!("envforge {}", env!("CARGO_PKG_VERSION")),
                project: project.to_string(),
                content_hash: content_hash(&packages),
            },
            packages,
        }
    }

    /// Load lockfile from a path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse lockfile from TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let lockfile: Lockfile = toml::from_str(content)?;

        if lockfile.metadata.version > LOCKFILE_VERSION {
            return Err(Error::LockfileError(format!(
                "unsupported lockfile version {} (expected at most {})",
                lockfile.metadata.version, LOCKFILE_VERSION
            )));
        }
        if !lockfile.verify_hash() {
            return Err(Error::LockfileError(format!(
                "content hash mismatch for {}; the package list was edited by hand",
                lockfile.metadata.project
            )));
        }

        Ok(lockfile)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write lockfile to a path
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// The lockfile as a generated project file
    pub fn to_manifest_file(&self) -> Result<ManifestFile> {
        Ok(ManifestFile::new(LOCKFILE_NAME, self.to_toml()?))
    }

    pub fn get(&self, identity: &PackageIdentity) -> Option<&LockedPackage> {
        self.packages.iter().find(|p| p.id == *identity)
    }

    /// Whether the recorded hash matches the package list
    pub fn verify_hash(&self) -> bool {
        self.metadata.content_hash == content_hash(&self.packages)
    }

    /// Compare against a new assignment
    pub fn validate_against(&self, assignment: &ResolvedAssignment) -> std::result::Result<(), Vec<LockDrift>> {
        let mut drift = Vec::new();

        for locked in &self.packages {
            match assignment.get(&locked.id) {
                Some(entry) => {
                    let resolved = entry.version.to_string();
                    if resolved != locked.version {
                        drift.push(LockDrift::Changed {
                            package: locked.id.clone(),
                            locked: locked.version.clone(),
                            resolved,
                        });
                    }
                }
                None => drift.push(LockDrift::Removed(locked.id.clone())),
            }
        }
        for identity in assignment.identities() {
            if self.get(identity).is_none() {
                drift.push(LockDrift::Added(identity.clone()));
            }
        }

        if drift.is_empty() { Ok(()) } else { Err(drift) }
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// `sha256:` hash over `id=version` lines
fn content_hash(packages: &[LockedPackage]) -> String {
    let mut hasher = Sha256::new();
    for package in packages {
        hasher.update(package.id.to_string().as_bytes());
        hasher.update(b"=");
        hasher.update(package.version.as_bytes());
        hasher.update(b"\n");
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
