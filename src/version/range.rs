// src/version/range.rs

//! Version ranges as a lower bound, an upper bound and a set of exclusions
//!
//! Every constraint in the grammar reduces to this shape, which keeps
//! intersection a matter of picking the tighter bound on each side.

use super::PackageVersion;
use std::cmp::Ordering;
use std::fmt;

/// One end of a range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub version: PackageVersion,
    pub inclusive: bool,
}

/// A single comparator, used when rendering a range in an ecosystem's syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator<'a> {
    Ge(&'a PackageVersion),
    Gt(&'a PackageVersion),
    Le(&'a PackageVersion),
    Lt(&'a PackageVersion),
    Ne(&'a PackageVersion),
}

impl<'a> Comparator<'a> {
    pub fn operator(&self) -> &'static str {
        match self {
            Comparator::Ge(_) => ">=",
            Comparator::Gt(_) => ">",
            Comparator::Le(_) => "<=",
            Comparator::Lt(_) => "<",
            Comparator::Ne(_) => "!=",
        }
    }

    pub fn version(&self) -> &'a PackageVersion {
        match self {
            Comparator::Ge(v)
            | Comparator::Gt(v)
            | Comparator::Le(v)
            | Comparator::Lt(v)
            | Comparator::Ne(v) => v,
        }
    }
}

impl fmt::Display for Comparator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator(), self.version())
    }
}

/// Conjunction of a lower bound, an upper bound and excluded versions
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRange {
    lower: Option<Bound>,
    upper: Option<Bound>,
    /// Sorted, deduplicated
    excluded: Vec<PackageVersion>,
}

impl VersionRange {
    /// The range containing every version
    pub fn any() -> Self {
        Self::default()
    }

    pub fn exactly(version: PackageVersion) -> Self {
        Self {
            lower: Some(Bound {
                version: version.clone(),
                inclusive: true,
            }),
            upper: Some(Bound {
                version,
                inclusive: true,
            }),
            excluded: Vec::new(),
        }
    }

    pub fn at_least(version: PackageVersion) -> Self {
        Self {
            lower: Some(Bound {
                version,
                inclusive: true,
            }),
            ..Self::default()
        }
    }

    pub fn greater_than(version: PackageVersion) -> Self {
        Self {
            lower: Some(Bound {
                version,
                inclusive: false,
            }),
            ..Self::default()
        }
    }

    pub fn at_most(version: PackageVersion) -> Self {
        Self {
            upper: Some(Bound {
                version,
                inclusive: true,
            }),
            ..Self::default()
        }
    }

    pub fn less_than(version: PackageVersion) -> Self {
        Self {
            upper: Some(Bound {
                version,
                inclusive: false,
            }),
            ..Self::default()
        }
    }

    pub fn excluding(version: PackageVersion) -> Self {
        Self {
            excluded: vec![version],
            ..Self::default()
        }
    }

    /// `[lower, upper)`
    pub fn between(lower: PackageVersion, upper: PackageVersion) -> Self {
        Self::at_least(lower).intersect(&Self::less_than(upper))
    }

    pub fn lower(&self) -> Option<&Bound> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Option<&Bound> {
        self.upper.as_ref()
    }

    pub fn excluded(&self) -> &[PackageVersion] {
        &self.excluded
    }

    /// True when the range places no restriction at all
    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none() && self.excluded.is_empty()
    }

    /// Check whether a version lies inside the range
    pub fn contains(&self, version: &PackageVersion) -> bool {
        if let Some(lower) = &self.lower {
            match version.cmp(&lower.version) {
                Ordering::Less => return false,
                Ordering::Equal if !lower.inclusive => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match version.cmp(&upper.version) {
                Ordering::Greater => return false,
                Ordering::Equal if !upper.inclusive => return false,
                _ => {}
            }
        }
        !self.excluded.contains(version)
    }

    /// Intersection of two ranges
    pub fn intersect(&self, other: &VersionRange) -> VersionRange {
        let lower = tighter(self.lower.as_ref(), other.lower.as_ref(), Ordering::Greater);
        let upper = tighter(self.upper.as_ref(), other.upper.as_ref(), Ordering::Less);

        let mut excluded: Vec<PackageVersion> = self
            .excluded
            .iter()
            .chain(other.excluded.iter())
            .cloned()
            .collect();
        excluded.sort();
        excluded.dedup();

        let mut range = VersionRange {
            lower,
            upper,
            excluded,
        };
        // Exclusions outside the bounds carry no information
        let bounds = VersionRange {
            lower: range.lower.clone(),
            upper: range.upper.clone(),
            excluded: Vec::new(),
        };
        range.excluded.retain(|v| bounds.contains(v));
        range
    }

    /// True when no version can satisfy the range
    ///
    /// Exclusions only empty a range that has collapsed to a single point;
    /// any wider interval always has room between excluded versions.
    pub fn is_empty(&self) -> bool {
        let (Some(lower), Some(upper)) = (&self.lower, &self.upper) else {
            return false;
        };
        match lower.version.cmp(&upper.version) {
            Ordering::Greater => true,
            Ordering::Equal => {
                !(lower.inclusive && upper.inclusive) || self.excluded.contains(&lower.version)
            }
            Ordering::Less => false,
        }
    }

    /// The only version in the range, if it is a single point
    pub fn single_point(&self) -> Option<&PackageVersion> {
        match (&self.lower, &self.upper) {
            (Some(lower), Some(upper))
                if lower.inclusive && upper.inclusive && lower.version == upper.version =>
            {
                if self.excluded.contains(&lower.version) {
                    None
                } else {
                    Some(&lower.version)
                }
            }
            _ => None,
        }
    }

    /// Whether a bound names a pre-release, opting the range into them
    pub fn mentions_prerelease(&self) -> bool {
        self.lower.iter().chain(self.upper.iter()).any(|b| b.version.is_prerelease())
    }

    /// Highest version from `candidates` inside the range
    ///
    /// Pre-releases are skipped unless a bound names one.
    pub fn highest<'a, I>(&self, candidates: I) -> Option<&'a PackageVersion>
    where
        I: IntoIterator<Item = &'a PackageVersion>,
    {
        let allow_pre = self.mentions_prerelease();
        candidates
            .into_iter()
            .filter(|v| allow_pre || !v.is_prerelease())
            .filter(|v| self.contains(v))
            .max()
    }

    /// The range as an ordered list of comparators
    pub fn comparators(&self) -> Vec<Comparator<'_>> {
        let mut out = Vec::new();
        if let Some(lower) = &self.lower {
            out.push(if lower.inclusive {
                Comparator::Ge(&lower.version)
            } else {
                Comparator::Gt(&lower.version)
            });
        }
        out.extend(self.excluded.iter().map(Comparator::Ne));
        if let Some(upper) = &self.upper {
            out.push(if upper.inclusive {
                Comparator::Le(&upper.version)
            } else {
                Comparator::Lt(&upper.version)
            });
        }
        out
    }
}

/// Pick the tighter of two optional bounds
///
/// `prefer` is the ordering that makes a version tighter: `Greater` for
/// lower bounds, `Less` for upper bounds. On equal versions the exclusive
/// bound wins.
fn tighter(a: Option<&Bound>, b: Option<&Bound>, prefer: Ordering) -> Option<Bound> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (Some(x), Some(y)) => {
            let ord = x.version.cmp(&y.version);
            if ord == prefer {
                Some(x.clone())
            } else if ord == Ordering::Equal {
                Some(Bound {
                    version: x.version.clone(),
                    inclusive: x.inclusive && y.inclusive,
                })
            } else {
                Some(y.clone())
            }
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.comparators().iter().map(|c| c.to_string()).collect();
        if parts.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    #[test]
    fn test_intersect_overlapping() {
        let a = VersionRange::between(v("1.20"), v("2.0"));
        let b = VersionRange::at_least(v("1.21"));
        let both = a.intersect(&b);
        assert!(!both.is_empty());
        assert!(both.contains(&v("1.21")));
        assert!(!both.contains(&v("1.20.5")));
        assert!(!both.contains(&v("2.0")));
        assert_eq!(both.to_string(), ">=1.21, <2.0");
    }

    #[test]
    fn test_intersect_disjoint_is_empty() {
        let a = VersionRange::less_than(v("1.0"));
        let b = VersionRange::at_least(v("2.0"));
        assert!(a.intersect(&b).is_empty());

        // Touching bounds: [1.0, 1.0) is empty
        let c = VersionRange::at_least(v("1.0")).intersect(&VersionRange::less_than(v("1.0")));
        assert!(c.is_empty());
    }

    #[test]
    fn test_equal_bounds_exclusive_wins() {
        let a = VersionRange::at_least(v("1.5"));
        let b = VersionRange::greater_than(v("1.5"));
        let both = a.intersect(&b);
        assert!(!both.contains(&v("1.5")));
        assert!(both.contains(&v("1.5.1")));
    }

    #[test]
    fn test_exclusion_empties_single_point() {
        let point = VersionRange::exactly(v("1.0"));
        assert_eq!(point.single_point(), Some(&v("1.0")));
        let gone = point.intersect(&VersionRange::excluding(v("1.0")));
        assert!(gone.is_empty());
        assert_eq!(gone.single_point(), None);
    }

    #[test]
    fn test_exclusion_outside_bounds_dropped() {
        let r = VersionRange::at_least(v("2.0")).intersect(&VersionRange::excluding(v("1.0")));
        assert!(r.excluded().is_empty());
        assert_eq!(r.to_string(), ">=2.0");
    }

    #[test]
    fn test_highest_skips_prereleases() {
        let catalog = vec![v("1.0.0"), v("1.1.0"), v("1.2.0rc1"), v("2.0.0")];
        let r = VersionRange::less_than(v("2.0"));
        assert_eq!(r.highest(&catalog), Some(&v("1.1.0")));

        let opt_in = VersionRange::at_least(v("1.2.0rc1"));
        assert_eq!(opt_in.highest(&catalog), Some(&v("2.0.0")));
        let only_pre = VersionRange::between(v("1.2.0rc1"), v("1.2.0"));
        assert_eq!(only_pre.highest(&catalog), Some(&v("1.2.0rc1")));
    }

    #[test]
    fn test_unbounded_display() {
        assert!(VersionRange::any().is_unbounded());
        assert_eq!(VersionRange::any().to_string(), "*");
    }
}
