// src/deprecation.rs

//! Known-deprecated releases
//!
//! After each resolution the loop checks concrete versions against a table
//! of release lines that are end of life or known to be unsafe. A hit is
//! reported; when upgrading is enabled and the catalog knows a newer,
//! non-deprecated stable release, the entry is moved to it and marked
//! auto-fixed so the run ends in review.

use crate::claim::PackageIdentity;
use crate::ecosystem::Ecosystem;
use crate::lookup::VersionLookup;
use crate::resolver::{Overrides, ResolvedAssignment, ResolvedVersion};
use crate::version::{PackageVersion, VersionConstraint};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Built-in table: package, deprecated range, reason
const BUILTIN: &[(Ecosystem, &str, &str, &str)] = &[
    (Ecosystem::PythonPip, "tensorflow", "<2.0", "TensorFlow 1.x is end of life"),
    (Ecosystem::PythonPip, "pyyaml", "<5.4", "unsafe default loader (CVE-2020-14343)"),
    (Ecosystem::PythonPip, "django", "<3.2", "unsupported Django release"),
    (Ecosystem::PythonPip, "urllib3", "<1.26.5", "ReDoS in URL authority parsing (CVE-2021-33503)"),
    (Ecosystem::NodeNpm, "lodash", "<4.17.21", "prototype pollution (CVE-2021-23337)"),
    (Ecosystem::NodeNpm, "minimist", "<1.2.6", "prototype pollution (CVE-2021-44906)"),
    (Ecosystem::RubyGems, "rails", "<6.1", "unsupported Rails release"),
    (Ecosystem::RubyGems, "nokogiri", "<1.13.6", "bundled libxml2 vulnerabilities"),
    (Ecosystem::JavaMaven, "org.apache.logging.log4j:log4j-core", "<2.17.1", "Log4Shell (CVE-2021-44228)"),
];

/// A deprecated version found in an assignment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeprecationNotice {
    pub package: PackageIdentity,
    pub version: PackageVersion,
    pub reason: String,
    /// Release the entry was moved to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgraded_to: Option<PackageVersion>,
}

impl fmt::Display for DeprecationNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} is deprecated: {}", self.package, self.version, self.reason)?;
        match &self.upgraded_to {
            Some(target) => write!(f, "; upgraded to {}", target),
            None => write!(f, "; suggest upgrade"),
        }
    }
}

#[derive(Debug, Clone)]
struct DeprecatedRange {
    package: PackageIdentity,
    range: VersionConstraint,
    reason: String,
}

/// Deprecated release lines to check assignments against
#[derive(Debug, Clone, Default)]
pub struct DeprecationTable {
    ranges: Vec<DeprecatedRange>,
}

impl DeprecationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table of well-known deprecated releases
    pub fn builtin() -> Self {
        BUILTIN
            .iter()
            .fold(Self::new(), |table, (ecosystem, name, range, reason)| {
                match VersionConstraint::parse(range) {
                    Ok(range) => table.with_range(PackageIdentity::new(*ecosystem, name), range, *reason),
                    Err(e) => {
                        warn!("Skipping deprecation entry for {}: {}", name, e);
                        table
                    }
                }
            })
    }

    pub fn with_range(mut self, package: PackageIdentity, range: VersionConstraint, reason: impl Into<String>) -> Self {
        self.ranges.push(DeprecatedRange {
            package,
            range,
            reason: reason.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    fn find(&self, package: &PackageIdentity, version: &PackageVersion) -> Option<&DeprecatedRange> {
        self.ranges
            .iter()
            .find(|r| r.package == *package && r.range.satisfies(version))
    }

    fn is_deprecated(&self, package: &PackageIdentity, version: &PackageVersion) -> bool {
        self.find(package, version).is_some()
    }

    /// Report deprecated concrete versions, upgrading them when allowed
    ///
    /// Packages with a loop override are only reported: the loop moved
    /// them on purpose after a failed install.
    pub fn review(
        &self,
        assignment: &mut ResolvedAssignment,
        lookup: &dyn VersionLookup,
        overrides: &Overrides,
        upgrade: bool,
    ) -> Vec<DeprecationNotice> {
        let hits: Vec<(PackageIdentity, PackageVersion, String)> = assignment
            .entries()
            .filter_map(|entry| {
                let version = entry.version.version()?;
                let hit = self.find(&entry.identity, version)?;
                Some((entry.identity.clone(), version.clone(), hit.reason.clone()))
            })
            .collect();

        let mut notices = Vec::with_capacity(hits.len());
        for (package, version, reason) in hits {
            let target = if upgrade && overrides.get(&package).is_none() {
                self.upgrade_target(&package, &version, lookup)
            } else {
                None
            };

            match (&target, assignment.get_mut(&package)) {
                (Some(target), Some(entry)) => {
                    info!("Auto-upgraded deprecated {} from {} to {}", package, version, target);
                    entry.version = ResolvedVersion::Version(target.clone());
                    entry.auto_fixed = true;
                }
                _ => warn!("Deprecated: {}@{} ({})", package, version, reason),
            }
            notices.push(DeprecationNotice {
                package,
                version,
                reason,
                upgraded_to: target,
            });
        }
        notices
    }

    /// Newest stable release above `current` that is not deprecated itself
    fn upgrade_target(
        &self,
        package: &PackageIdentity,
        current: &PackageVersion,
        lookup: &dyn VersionLookup,
    ) -> Option<PackageVersion> {
        let versions = lookup.versions(package).ok().flatten()?;
        versions
            .into_iter()
            .filter(|v| !v.is_prerelease() && v > current && !self.is_deprecated(package, v))
            .max()
    }
}
