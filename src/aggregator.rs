// src/aggregator.rs

//! Claim aggregation
//!
//! Merges the claims of every evidence source into one candidate set keyed
//! by package identity. Nothing is dropped here; conflicting claims sit
//! side by side for the resolver to judge.

use crate::claim::{DependencyClaim, PackageIdentity};
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map;

/// All claims grouped by package, read-only once built
///
/// Identities iterate in sorted order; claims for one identity keep the
/// order in which they were aggregated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandidateSet {
    entries: BTreeMap<PackageIdentity, Vec<DependencyClaim>>,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Claims recorded for a package
    pub fn claims(&self, identity: &PackageIdentity) -> Option<&[DependencyClaim]> {
        self.entries.get(identity).map(Vec::as_slice)
    }

    pub fn contains(&self, identity: &PackageIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn identities(&self) -> impl Iterator<Item = &PackageIdentity> {
        self.entries.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, PackageIdentity, Vec<DependencyClaim>> {
        self.entries.iter()
    }

    /// Total number of claims across all packages
    pub fn claim_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = (&'a PackageIdentity, &'a Vec<DependencyClaim>);
    type IntoIter = btree_map::Iter<'a, PackageIdentity, Vec<DependencyClaim>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Group claims by package identity
///
/// Pure and order-preserving: the claims of one identity appear in input
/// order. Identities are already normalized, so `Flask` and `flask` from
/// different sources land in the same group.
pub fn aggregate<I>(claims: I) -> CandidateSet
where
    I: IntoIterator<Item = DependencyClaim>,
{
    let mut entries: BTreeMap<PackageIdentity, Vec<DependencyClaim>> = BTreeMap::new();
    for claim in claims {
        entries.entry(claim.identity.clone()).or_default().push(claim);
    }
    CandidateSet { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::SourceKind;
    use crate::ecosystem::Ecosystem;
    use crate::version::VersionConstraint;

    fn claim(name: &str, source: SourceKind, constraint: Option<&str>) -> DependencyClaim {
        let c = DependencyClaim::new(
            PackageIdentity::new(Ecosystem::PythonPip, name),
            source,
            0.8,
            format!("{} from {}", name, source),
        );
        match constraint {
            Some(s) => c.with_constraint(VersionConstraint::parse(s).unwrap()),
            None => c,
        }
    }

    #[test]
    fn test_groups_by_normalized_identity() {
        let set = aggregate(vec![
            claim("Flask", SourceKind::ImportScan, None),
            claim("numpy", SourceKind::ManifestFile, Some(">=1.20")),
            claim("flask", SourceKind::ManifestFile, Some("==2.3.0")),
        ]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.claim_count(), 3);
        let flask = set.claims(&PackageIdentity::new(Ecosystem::PythonPip, "FLASK")).unwrap();
        assert_eq!(flask.len(), 2);
        assert_eq!(flask[0].source_kind, SourceKind::ImportScan);
        assert_eq!(flask[1].source_kind, SourceKind::ManifestFile);
    }

    #[test]
    fn test_conflicting_claims_kept() {
        let set = aggregate(vec![
            claim("foo", SourceKind::ManifestFile, Some("==1.0")),
            claim("foo", SourceKind::ManifestFile, Some("==2.0")),
        ]);
        let foo = PackageIdentity::new(Ecosystem::PythonPip, "foo");
        assert_eq!(set.claims(&foo).map(<[_]>::len), Some(2));
    }

    #[test]
    fn test_identity_order_independent_of_input_order() {
        let a = aggregate(vec![
            claim("zlib", SourceKind::ImportScan, None),
            claim("attrs", SourceKind::ImportScan, None),
        ]);
        let b = aggregate(vec![
            claim("attrs", SourceKind::ImportScan, None),
            claim("zlib", SourceKind::ImportScan, None),
        ]);
        assert_eq!(a, b);
        let names: Vec<&str> = a.identities().map(|i| i.name()).collect();
        assert_eq!(names, vec!["attrs", "zlib"]);
    }

    #[test]
    fn test_empty_input() {
        let set = aggregate(Vec::new());
        assert!(set.is_empty());
    }
}
