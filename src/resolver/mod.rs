// src/resolver/mod.rs

//! Dependency resolution and conflict detection
//!
//! For every package in a candidate set the resolver intersects the
//! constraints of all its claims and picks one version:
//!
//! 1. Two different exact pins are a conflict.
//! 2. An empty intersection is a conflict; the package is left out.
//! 3. A single pin wins when it lies inside the other claims' ranges.
//! 4. Otherwise the highest stable catalog version inside the range.
//! 5. Unconstrained packages get the latest stable catalog version, or the
//!    literal `latest` tag when no catalog is available.
//!
//! Packages backed only by claims below the confidence threshold are
//! flagged tentative but still resolved. Iteration is over a `BTreeMap`,
//! so the same candidate set always yields the same output.

mod conflict;
mod plan;

pub use conflict::{ConflictKind, UnresolvedConflict};
pub use plan::{Overrides, ResolutionBasis, ResolvedAssignment, ResolvedEntry, ResolvedVersion};

use crate::aggregator::CandidateSet;
use crate::claim::{DependencyClaim, PackageIdentity};
use crate::lookup::VersionLookup;
use crate::version::{PackageVersion, VersionConstraint, VersionRange};
use tracing::{debug, warn};

/// Default confidence below which a package is tentative
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Picks one version per package from a candidate set
pub struct Resolver<'a> {
    lookup: &'a dyn VersionLookup,
    confidence_threshold: f64,
}

enum Outcome {
    Resolved(ResolvedEntry),
    Conflict(UnresolvedConflict),
}

impl<'a> Resolver<'a> {
    pub fn new(lookup: &'a dyn VersionLookup, confidence_threshold: f64) -> Self {
        Self {
            lookup,
            confidence_threshold,
        }
    }

    /// Resolve a candidate set
    pub fn resolve(&self, candidates: &CandidateSet) -> (ResolvedAssignment, Vec<UnresolvedConflict>) {
        self.resolve_with(candidates, &Overrides::new())
    }

    /// Resolve with some packages' constraints replaced
    ///
    /// Packages with an override are marked auto-fixed.
    pub fn resolve_with(
        &self,
        candidates: &CandidateSet,
        overrides: &Overrides,
    ) -> (ResolvedAssignment, Vec<UnresolvedConflict>) {
        let mut entries = Vec::with_capacity(candidates.len());
        let mut conflicts = Vec::new();

        for (identity, claims) in candidates {
            match self.resolve_package(identity, claims, overrides.get(identity)) {
                Outcome::Resolved(entry) => {
                    debug!("Resolved {} to {} ({:?})", identity, entry.version, entry.basis);
                    entries.push(entry);
                }
                Outcome::Conflict(conflict) => {
                    warn!("Unresolved conflict for {}: {}", identity, conflict.kind.as_str());
                    conflicts.push(conflict);
                }
            }
        }

        (ResolvedAssignment::from_entries(entries), conflicts)
    }

    fn resolve_package(
        &self,
        identity: &PackageIdentity,
        claims: &[DependencyClaim],
        override_constraint: Option<&VersionConstraint>,
    ) -> Outcome {
        let tentative = claims.iter().all(|c| c.confidence < self.confidence_threshold);
        let auto_fixed = override_constraint.is_some();

        let constraints: Vec<VersionConstraint> = match override_constraint {
            Some(c) => vec![c.clone()],
            None => claims
                .iter()
                .filter_map(|c| c.version_constraint.clone())
                .collect(),
        };

        let mut pins: Vec<&PackageVersion> = constraints.iter().filter_map(VersionConstraint::exact).collect();
        pins.sort();
        pins.dedup();

        let conflict = |kind| {
            Outcome::Conflict(UnresolvedConflict {
                package: identity.clone(),
                kind,
                conflicting_claims: claims.iter().filter(|c| c.is_constrained()).cloned().collect(),
            })
        };

        if pins.len() > 1 {
            return conflict(ConflictKind::ConflictingPins);
        }

        let range = constraints
            .iter()
            .fold(VersionRange::any(), |acc, c| acc.intersect(&c.to_range()));
        if range.is_empty() {
            return conflict(if pins.is_empty() {
                ConflictKind::DisjointRanges
            } else {
                ConflictKind::PinOutsideRange
            });
        }

        let constraint = VersionConstraint::from_range(range.clone());
        let (version, basis) = match pins.first() {
            Some(pin) => (ResolvedVersion::Version((*pin).clone()), ResolutionBasis::Pinned),
            None if range.is_unbounded() => match self.lookup.latest_stable(identity) {
                Some(latest) => (ResolvedVersion::Version(latest), ResolutionBasis::LatestStable),
                None => (ResolvedVersion::Latest, ResolutionBasis::LatestTag),
            },
            None => match self.highest_in_range(identity, &range) {
                Some(best) => (ResolvedVersion::Version(best), ResolutionBasis::HighestInRange),
                None => (ResolvedVersion::Range(constraint.clone()), ResolutionBasis::DeferredRange),
            },
        };

        Outcome::Resolved(ResolvedEntry {
            identity: identity.clone(),
            version,
            basis,
            constraint,
            justification: claims.to_vec(),
            tentative,
            auto_fixed,
        })
    }

    fn highest_in_range(&self, identity: &PackageIdentity, range: &VersionRange) -> Option<PackageVersion> {
        match self.lookup.versions(identity) {
            Ok(Some(versions)) => range.highest(&versions).cloned(),
            Ok(None) => None,
            Err(e) => {
                debug!("Version lookup for {} failed: {}", identity, e);
                None
            }
        }
    }
}
