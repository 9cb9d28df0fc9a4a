// src/resolver/conflict.rs

//! Conflict types for dependency resolution
//!
//! A package whose claims cannot all hold at once is reported with every
//! claim involved so the report can show who asked for what.

use crate::claim::{DependencyClaim, PackageIdentity};
use serde::{Deserialize, Serialize};

/// Why a package's constraints could not be satisfied together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two or more different exact pins
    ConflictingPins,
    /// Ranges with no version in common
    DisjointRanges,
    /// A single pin that falls outside the other claims' ranges
    PinOutsideRange,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::ConflictingPins => "conflicting pins",
            ConflictKind::DisjointRanges => "disjoint ranges",
            ConflictKind::PinOutsideRange => "pin outside range",
        }
    }
}

/// A package left out of the assignment because its claims are mutually
/// exclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedConflict {
    pub package: PackageIdentity,
    pub kind: ConflictKind,
    /// Every constrained claim for the package, in aggregation order
    pub conflicting_claims: Vec<DependencyClaim>,
}

impl std::fmt::Display for UnresolvedConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Conflicting version requirements for package {} ({}):",
            self.package,
            self.kind.as_str()
        )?;
        for claim in &self.conflicting_claims {
            let constraint = claim
                .version_constraint
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "*".to_string());
            write!(f, "  - {} requires {}", claim.source_kind, constraint)?;
            if !claim.rationale.is_empty() {
                write!(f, " ({})", claim.rationale)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
