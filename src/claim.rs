// src/claim.rs

//! Dependency claims produced by evidence sources
//!
//! A claim says "this project needs package X", optionally with a version
//! constraint, tagged with where the assertion came from and how much it
//! should be trusted. Claims are immutable once built.

use crate::ecosystem::Ecosystem;
use crate::error::{Error, Result};
use crate::version::VersionConstraint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Normalized `(ecosystem, name)` pair
///
/// Construct through [`PackageIdentity::new`] so the name is always
/// normalized with the ecosystem's case rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageIdentity {
    ecosystem: Ecosystem,
    name: String,
}

impl PackageIdentity {
    pub fn new(ecosystem: Ecosystem, name: &str) -> Self {
        Self {
            ecosystem,
            name: ecosystem.normalize_name(name),
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ecosystem, self.name)
    }
}

impl FromStr for PackageIdentity {
    type Err = Error;

    /// Parse `ecosystem:name`; the name may itself contain `:` (Maven)
    fn from_str(s: &str) -> Result<Self> {
        let (eco, name) = s
            .split_once(':')
            .ok_or_else(|| Error::ParseError(format!("package identity without ecosystem: {}", s)))?;
        if name.trim().is_empty() {
            return Err(Error::ParseError(format!("package identity without name: {}", s)));
        }
        Ok(Self::new(eco.parse()?, name))
    }
}

// Serialized as a string so identities can key JSON and TOML maps
impl Serialize for PackageIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Where a claim came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Import/require statements found in source files
    ImportScan,
    /// Declared in a manifest (requirements.txt, package.json, ...)
    ManifestFile,
    /// Suggested by an inference model
    AiInference,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImportScan => "import-scan",
            Self::ManifestFile => "manifest-file",
            Self::AiInference => "ai-inference",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An assertion that a package is needed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyClaim {
    pub identity: PackageIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_constraint: Option<VersionConstraint>,
    pub source_kind: SourceKind,
    /// Always within 0.0..=1.0
    pub confidence: f64,
    pub rationale: String,
}

impl DependencyClaim {
    /// Create an unconstrained claim; confidence is clamped to [0, 1]
    pub fn new(
        identity: PackageIdentity,
        source_kind: SourceKind,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            identity,
            version_constraint: None,
            source_kind,
            confidence,
            rationale: rationale.into(),
        }
    }

    /// Attach a constraint; `Any` is stored as no constraint
    pub fn with_constraint(mut self, constraint: VersionConstraint) -> Self {
        self.version_constraint = if constraint.is_any() {
            None
        } else {
            Some(constraint)
        };
        self
    }

    /// True when the claim narrows the version at all
    pub fn is_constrained(&self) -> bool {
        self.version_constraint.is_some()
    }
}
