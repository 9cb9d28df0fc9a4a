// src/orchestrator.rs

//! The resolution loop
//!
//! Drives resolve → validate → adjust until an assignment installs, the
//! retry budget runs out, or something makes retrying pointless:
//!
//! ```text
//! AGGREGATED → RESOLVING → VALIDATING → ACCEPTED
//!                  ↑            │ fail
//!      budget left │            ↓
//!                  └──────── ADJUSTING → FAILED (budget exhausted)
//! ```
//!
//! RESOLVING fails immediately on a conflict over a required package, and
//! any stage fails immediately on sandbox infrastructure errors or
//! cancellation. Adjustment loosens the constraints of the packages the
//! validator blamed (or of every package when nobody was blamed) through
//! resolver overrides, so the candidate set itself is never modified.

use crate::aggregator::CandidateSet;
use crate::cancel::CancelToken;
use crate::claim::{DependencyClaim, PackageIdentity, SourceKind};
use crate::deprecation::{DeprecationNotice, DeprecationTable};
use crate::error::Error;
use crate::lookup::VersionLookup;
use crate::progress::{Phase, ProgressTracker, SILENT};
use crate::resolver::{
    DEFAULT_CONFIDENCE_THRESHOLD, Overrides, ResolvedAssignment, ResolvedEntry, ResolvedVersion, Resolver,
    UnresolvedConflict,
};
use crate::validator::{ValidationResult, Validator};
use crate::version::{VersionConstraint, VersionRange};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Default number of resolve/validate attempts
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Loop states, recorded in order as the loop moves through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    Aggregated,
    Resolving,
    Validating,
    Adjusting,
    Accepted,
    Failed,
}

/// Why a run ended in FAILED
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// A required package has no consistent version
    UnresolvedConflicts,
    /// Every attempt failed validation
    RetryBudgetExhausted,
    /// The isolated context could not be used
    SandboxUnavailable(String),
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedConflicts => write!(f, "unresolved conflicts on required packages"),
            Self::RetryBudgetExhausted => write!(f, "retry budget exhausted"),
            Self::SandboxUnavailable(msg) => write!(f, "sandbox unavailable: {}", msg),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum LoopOutcome {
    Accepted,
    Failed(FailureReason),
}

/// How a failing package was loosened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoosenStrategy {
    /// Step below the failing version's release line
    BelowLine,
    /// Exclude just the failing version
    ExcludeVersion,
    /// Drop the constraint of an unpinnable range
    Unconstrain,
    /// Already unconstrained; nothing to loosen
    Nothing,
}

/// One package adjustment after a failed validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adjustment {
    pub package: PackageIdentity,
    pub previous: ResolvedVersion,
    pub strategy: LoosenStrategy,
    /// Override for the next attempt; `None` when nothing changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<VersionConstraint>,
}

/// One resolve + validate cycle, immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionAttempt {
    /// 1-based
    pub number: u32,
    pub assignment: ResolvedAssignment,
    pub conflicts: Vec<UnresolvedConflict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infrastructure_error: Option<String>,
    /// Adjustments made because this attempt failed
    pub adjustments: Vec<Adjustment>,
    /// Deprecated releases found in the assignment
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deprecations: Vec<DeprecationNotice>,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct LoopResult {
    pub outcome: LoopOutcome,
    pub history: Vec<ResolutionAttempt>,
    pub states: Vec<LoopState>,
    /// Conflicts over optional packages, which were dropped
    pub optional_conflicts: Vec<UnresolvedConflict>,
}

impl LoopResult {
    pub fn is_accepted(&self) -> bool {
        self.outcome == LoopOutcome::Accepted
    }

    /// The validated assignment of an accepted run
    pub fn accepted_assignment(&self) -> Option<&ResolvedAssignment> {
        if self.is_accepted() {
            self.history.last().map(|a| &a.assignment)
        } else {
            None
        }
    }

    /// Conflicts of the last attempt that made the run fail
    pub fn blocking_conflicts(&self) -> &[UnresolvedConflict] {
        match (&self.outcome, self.history.last()) {
            (LoopOutcome::Failed(FailureReason::UnresolvedConflicts), Some(last)) => &last.conflicts,
            _ => &[],
        }
    }
}

/// Loop settings
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub confidence_threshold: f64,
    /// Maximum number of attempts, at least 1
    pub retry_budget: u32,
    /// Packages allowed to stay unresolved (`name` or `ecosystem:name`)
    pub optional: Vec<String>,
    /// Move deprecated releases to the newest good one
    pub upgrade_deprecated: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            retry_budget: DEFAULT_RETRY_BUDGET,
            optional: Vec::new(),
            upgrade_deprecated: true,
        }
    }
}

impl LoopConfig {
    /// Whether a package may be dropped on conflict
    ///
    /// Optional when listed in the configuration or when every claim for it
    /// comes from inference.
    pub fn is_optional(&self, identity: &PackageIdentity, claims: &[DependencyClaim]) -> bool {
        let listed = self.optional.iter().any(|entry| match entry.parse::<PackageIdentity>() {
            Ok(listed) => listed == *identity,
            Err(_) => identity.ecosystem().normalize_name(entry) == identity.name(),
        });
        listed || (!claims.is_empty() && claims.iter().all(|c| c.source_kind == SourceKind::AiInference))
    }
}

/// Drives resolution and validation for one project
pub struct ResolutionLoop<'a> {
    lookup: &'a dyn VersionLookup,
    validator: &'a dyn Validator,
    config: LoopConfig,
    deprecations: DeprecationTable,
    cancel: CancelToken,
    progress: &'a dyn ProgressTracker,
    label: String,
}

impl<'a> ResolutionLoop<'a> {
    pub fn new(lookup: &'a dyn VersionLookup, validator: &'a dyn Validator, config: LoopConfig) -> Self {
        Self {
            lookup,
            validator,
            config,
            deprecations: DeprecationTable::builtin(),
            cancel: CancelToken::new(),
            progress: &SILENT,
            label: String::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deprecations(mut self, deprecations: DeprecationTable) -> Self {
        self.deprecations = deprecations;
        self
    }

    /// Report each attempt's phases under `label`
    pub fn with_progress(mut self, progress: &'a dyn ProgressTracker, label: impl Into<String>) -> Self {
        self.progress = progress;
        self.label = label.into();
        self
    }

    /// Run the loop over an aggregated candidate set
    pub fn run(&self, candidates: &CandidateSet, project_root: &Path) -> LoopResult {
        let resolver = Resolver::new(self.lookup, self.config.confidence_threshold);
        let budget = self.config.retry_budget.max(1);
        let mut overrides = Overrides::new();
        let mut result = LoopResult {
            outcome: LoopOutcome::Accepted,
            history: Vec::new(),
            states: vec![LoopState::Aggregated],
            optional_conflicts: Vec::new(),
        };

        let finish = |mut result: LoopResult, outcome: LoopOutcome| {
            result.states.push(match outcome {
                LoopOutcome::Accepted => LoopState::Accepted,
                LoopOutcome::Failed(_) => LoopState::Failed,
            });
            match &outcome {
                LoopOutcome::Accepted => info!("{}: accepted after {} attempt(s)", project_root.display(), result.history.len()),
                LoopOutcome::Failed(reason) => warn!("{}: failed: {}", project_root.display(), reason),
            }
            result.outcome = outcome;
            result
        };

        for number in 1..=budget {
            if self.cancel.is_cancelled() {
                return finish(result, LoopOutcome::Failed(FailureReason::Cancelled));
            }

            result.states.push(LoopState::Resolving);
            self.progress.set_phase(&self.label, Phase::Resolving { attempt: number, budget });
            info!("{}: attempt {}/{}", project_root.display(), number, budget);
            let (mut assignment, conflicts) = resolver.resolve_with(candidates, &overrides);

            let (optional, required): (Vec<&UnresolvedConflict>, Vec<&UnresolvedConflict>) = conflicts
                .iter()
                .partition(|c| self.config.is_optional(&c.package, candidates.claims(&c.package).unwrap_or(&[])));
            for conflict in optional {
                if !result.optional_conflicts.iter().any(|c| c.package == conflict.package) {
                    info!("Dropping optional package {}: {}", conflict.package, conflict.kind.as_str());
                    result.optional_conflicts.push(conflict.clone());
                }
            }
            if !required.is_empty() {
                result.history.push(ResolutionAttempt {
                    number,
                    assignment,
                    conflicts,
                    validation: None,
                    infrastructure_error: None,
                    adjustments: Vec::new(),
                    deprecations: Vec::new(),
                });
                return finish(result, LoopOutcome::Failed(FailureReason::UnresolvedConflicts));
            }

            let deprecations = self.deprecations.review(
                &mut assignment,
                self.lookup,
                &overrides,
                self.config.upgrade_deprecated,
            );

            result.states.push(LoopState::Validating);
            self.progress.set_phase(&self.label, Phase::Validating { attempt: number, budget });
            let validation = match self.validator.validate(&assignment, project_root) {
                Ok(validation) => validation,
                Err(e) => {
                    let reason = if matches!(e, Error::Cancelled) {
                        FailureReason::Cancelled
                    } else {
                        FailureReason::SandboxUnavailable(e.to_string())
                    };
                    result.history.push(ResolutionAttempt {
                        number,
                        assignment,
                        conflicts,
                        validation: None,
                        infrastructure_error: Some(e.to_string()),
                        adjustments: Vec::new(),
                        deprecations,
                    });
                    return finish(result, LoopOutcome::Failed(reason));
                }
            };

            if validation.is_pass() {
                result.history.push(ResolutionAttempt {
                    number,
                    assignment,
                    conflicts,
                    validation: Some(validation),
                    infrastructure_error: None,
                    adjustments: Vec::new(),
                    deprecations,
                });
                return finish(result, LoopOutcome::Accepted);
            }

            // Every failure goes through ADJUSTING; loosening only while budget remains
            result.states.push(LoopState::Adjusting);
            self.progress.set_phase(&self.label, Phase::Adjusting { attempt: number, budget });
            let adjustments = if number < budget {
                self.adjust(&assignment, &validation, &mut overrides)
            } else {
                Vec::new()
            };
            result.history.push(ResolutionAttempt {
                number,
                assignment,
                conflicts,
                validation: Some(validation),
                infrastructure_error: None,
                adjustments,
                deprecations,
            });
        }

        finish(result, LoopOutcome::Failed(FailureReason::RetryBudgetExhausted))
    }

    /// Loosen the blamed packages, or all of them when nobody was blamed
    fn adjust(
        &self,
        assignment: &ResolvedAssignment,
        validation: &ValidationResult,
        overrides: &mut Overrides,
    ) -> Vec<Adjustment> {
        let blamed: BTreeSet<&PackageIdentity> = validation
            .failing_packages
            .iter()
            .filter(|id| assignment.contains(id))
            .collect();
        let targets: Vec<&ResolvedEntry> = if blamed.is_empty() {
            debug!("Failure not attributed; loosening every package");
            assignment.entries().collect()
        } else {
            assignment.entries().filter(|e| blamed.contains(&e.identity)).collect()
        };

        targets
            .into_iter()
            .map(|entry| {
                let adjustment = self.loosen(entry);
                match &adjustment.constraint {
                    Some(constraint) => {
                        info!("Loosening {} from {} to {}", entry.identity, entry.version, constraint);
                        overrides.set(entry.identity.clone(), constraint.clone());
                    }
                    None => debug!("Nothing to loosen for {}", entry.identity),
                }
                adjustment
            })
            .collect()
    }

    /// Deterministic loosening of one entry
    fn loosen(&self, entry: &ResolvedEntry) -> Adjustment {
        let (strategy, constraint) = match &entry.version {
            ResolvedVersion::Version(version) => {
                let base = loosen_base(entry);
                let below = base.intersect(&VersionRange::less_than(version.line_floor()));
                let catalog = self.lookup.versions(&entry.identity).ok().flatten();
                let usable = !below.is_empty() && catalog.as_ref().is_none_or(|versions| below.highest(versions).is_some());

                if usable {
                    (LoosenStrategy::BelowLine, Some(VersionConstraint::from_range(below)))
                } else {
                    let excluded = base.intersect(&VersionRange::excluding(version.clone()));
                    let range = if excluded.is_empty() {
                        VersionRange::excluding(version.clone())
                    } else {
                        excluded
                    };
                    (LoosenStrategy::ExcludeVersion, Some(VersionConstraint::from_range(range)))
                }
            }
            ResolvedVersion::Range(_) => (LoosenStrategy::Unconstrain, Some(VersionConstraint::Any)),
            ResolvedVersion::Latest => (LoosenStrategy::Nothing, None),
        };
        Adjustment {
            package: entry.identity.clone(),
            previous: entry.version.clone(),
            strategy,
            constraint,
        }
    }
}

/// Range to narrow when loosening: the applied constraint, minus any pin
fn loosen_base(entry: &ResolvedEntry) -> VersionRange {
    if entry.constraint.exact().is_none() {
        return entry.constraint.to_range();
    }
    entry
        .justification
        .iter()
        .filter_map(|c| c.version_constraint.as_ref())
        .filter(|c| c.exact().is_none())
        .fold(VersionRange::any(), |acc, c| acc.intersect(&c.to_range()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregate;
    use crate::ecosystem::Ecosystem;
    use crate::error::Result;
    use crate::lookup::{OfflineLookup, StaticCatalog};
    use crate::validator::FailureKind;
    use crate::version::PackageVersion;
    use std::sync::Mutex;
    use std::time::Duration;

    fn id(name: &str) -> PackageIdentity {
        PackageIdentity::new(Ecosystem::PythonPip, name)
    }

    fn claim(name: &str, constraint: Option<&str>, source: SourceKind, confidence: f64) -> DependencyClaim {
        let c = DependencyClaim::new(id(name), source, confidence, "test");
        match constraint {
            Some(s) => c.with_constraint(VersionConstraint::parse(s).unwrap()),
            None => c,
        }
    }

    /// Fails while a rule says so, blaming named packages
    struct ScriptedValidator {
        rule: Box<dyn Fn(&ResolvedAssignment) -> Result<Option<Vec<PackageIdentity>>> + Send + Sync>,
        seen: Mutex<Vec<ResolvedAssignment>>,
    }

    impl ScriptedValidator {
        fn new(rule: impl Fn(&ResolvedAssignment) -> Result<Option<Vec<PackageIdentity>>> + Send + Sync + 'static) -> Self {
            Self {
                rule: Box::new(rule),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Validator for ScriptedValidator {
        fn validate(&self, assignment: &ResolvedAssignment, _root: &Path) -> Result<ValidationResult> {
            self.seen.lock().unwrap().push(assignment.clone());
            Ok(match (self.rule)(assignment)? {
                None => ValidationResult::passed("ok", Duration::ZERO),
                Some(blamed) => ValidationResult::failed(
                    FailureKind::InstallFailed { exit_code: Some(1) },
                    blamed.into_iter().collect(),
                    "failed",
                    Duration::ZERO,
                ),
            })
        }
    }

    fn version_of(assignment: &ResolvedAssignment, name: &str) -> String {
        assignment.get(&id(name)).unwrap().version.to_string()
    }

    #[test]
    fn test_accept_first_attempt() {
        let set = aggregate(vec![claim("foo", Some("==1.0"), SourceKind::ManifestFile, 1.0)]);
        let validator = ScriptedValidator::new(|_| Ok(None));
        let result = ResolutionLoop::new(&OfflineLookup, &validator, LoopConfig::default()).run(&set, Path::new("."));
        assert!(result.is_accepted());
        assert_eq!(result.history.len(), 1);
        assert_eq!(
            result.states,
            vec![LoopState::Aggregated, LoopState::Resolving, LoopState::Validating, LoopState::Accepted]
        );
    }

    #[test]
    fn test_loosen_below_line_then_accept() {
        let catalog = StaticCatalog::new()
            .with_versions(id("bar"), &["1.0.0", "1.1.0", "1.2.0"])
            .unwrap();
        let set = aggregate(vec![claim("bar", Some("==1.2.0"), SourceKind::ManifestFile, 1.0)]);
        let validator = ScriptedValidator::new(|a| {
            Ok((version_of(a, "bar") == "1.2.0").then(|| vec![id("bar")]))
        });

        let result = ResolutionLoop::new(&catalog, &validator, LoopConfig::default()).run(&set, Path::new("."));
        assert!(result.is_accepted());
        assert_eq!(result.history.len(), 2);
        assert_eq!(result.history[0].adjustments[0].strategy, LoosenStrategy::BelowLine);
        assert_eq!(result.history[0].adjustments[0].constraint.as_ref().unwrap().to_string(), "<1.2.0");

        let accepted = result.accepted_assignment().unwrap();
        let bar = accepted.get(&id("bar")).unwrap();
        assert_eq!(bar.version.to_string(), "1.1.0");
        assert!(bar.auto_fixed);
    }

    #[test]
    fn test_exclude_when_nothing_below_line() {
        let catalog = StaticCatalog::new()
            .with_versions(id("baz"), &["2.0.0", "2.0.1", "2.0.2"])
            .unwrap();
        let set = aggregate(vec![claim("baz", None, SourceKind::ImportScan, 0.8)]);
        let validator = ScriptedValidator::new(|a| {
            Ok((version_of(a, "baz") == "2.0.2").then(|| vec![id("baz")]))
        });

        let result = ResolutionLoop::new(&catalog, &validator, LoopConfig::default()).run(&set, Path::new("."));
        assert!(result.is_accepted());
        let adjustment = &result.history[0].adjustments[0];
        assert_eq!(adjustment.strategy, LoosenStrategy::ExcludeVersion);
        assert_eq!(adjustment.constraint.as_ref().unwrap().to_string(), "!=2.0.2");
        assert_eq!(version_of(result.accepted_assignment().unwrap(), "baz"), "2.0.1");
    }

    #[test]
    fn test_budget_bounds_attempts() {
        let catalog = StaticCatalog::new()
            .with_versions(id("qux"), &["1.0.0", "2.0.0", "3.0.0", "4.0.0"])
            .unwrap();
        let set = aggregate(vec![claim("qux", None, SourceKind::ImportScan, 0.8)]);
        let validator = ScriptedValidator::new(|_| Ok(Some(vec![id("qux")])));

        let config = LoopConfig {
            retry_budget: 3,
            ..Default::default()
        };
        let result = ResolutionLoop::new(&catalog, &validator, config).run(&set, Path::new("."));
        assert_eq!(result.outcome, LoopOutcome::Failed(FailureReason::RetryBudgetExhausted));
        assert_eq!(result.history.len(), 3);
        assert_eq!(result.states.iter().filter(|s| **s == LoopState::Adjusting).count(), 3);
        assert_eq!(&result.states[result.states.len() - 2..], &[LoopState::Adjusting, LoopState::Failed]);
        // Each attempt stepped one major line down; the last one is not adjusted
        let tried: Vec<String> = result.history.iter().map(|a| version_of(&a.assignment, "qux")).collect();
        assert_eq!(tried, vec!["4.0.0", "3.0.0", "2.0.0"]);
        assert!(result.history[2].adjustments.is_empty());
    }

    #[test]
    fn test_single_attempt_failure_passes_through_adjusting() {
        let set = aggregate(vec![claim("qux", None, SourceKind::ImportScan, 0.8)]);
        let validator = ScriptedValidator::new(|_| Ok(Some(vec![id("qux")])));
        let config = LoopConfig {
            retry_budget: 1,
            ..Default::default()
        };

        let result = ResolutionLoop::new(&OfflineLookup, &validator, config).run(&set, Path::new("."));
        assert_eq!(
            result.states,
            vec![
                LoopState::Aggregated,
                LoopState::Resolving,
                LoopState::Validating,
                LoopState::Adjusting,
                LoopState::Failed,
            ]
        );
        assert!(result.history[0].adjustments.is_empty());
    }

    #[test]
    fn test_unattributed_failure_loosens_everything() {
        let set = aggregate(vec![
            claim("a", Some(">=1.0,<2.0"), SourceKind::ManifestFile, 1.0),
            claim("b", None, SourceKind::ManifestFile, 1.0),
        ]);
        let validator = ScriptedValidator::new(|_| Ok(Some(Vec::new())));
        let config = LoopConfig {
            retry_budget: 2,
            ..Default::default()
        };
        let result = ResolutionLoop::new(&OfflineLookup, &validator, config).run(&set, Path::new("."));

        let adjustments = &result.history[0].adjustments;
        assert_eq!(adjustments.len(), 2);
        assert_eq!(adjustments[0].strategy, LoosenStrategy::Unconstrain);
        assert_eq!(adjustments[1].strategy, LoosenStrategy::Nothing);
        assert!(adjustments[1].constraint.is_none());
        // The offline range became unconstrained on the second attempt
        assert_eq!(result.history[1].assignment.get(&id("a")).unwrap().version, ResolvedVersion::Latest);
    }

    #[test]
    fn test_required_conflict_fails_without_validation() {
        let set = aggregate(vec![
            claim("foo", Some("==1.0"), SourceKind::ManifestFile, 1.0),
            claim("foo", Some("==2.0"), SourceKind::ImportScan, 0.9),
        ]);
        let validator = ScriptedValidator::new(|_| Ok(None));
        let result = ResolutionLoop::new(&OfflineLookup, &validator, LoopConfig::default()).run(&set, Path::new("."));

        assert_eq!(result.outcome, LoopOutcome::Failed(FailureReason::UnresolvedConflicts));
        assert_eq!(result.history.len(), 1);
        assert!(!result.history[0].assignment.contains(&id("foo")));
        assert_eq!(result.blocking_conflicts().len(), 1);
        assert!(validator.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_optional_conflict_is_dropped() {
        let set = aggregate(vec![
            claim("foo", Some("==1.0"), SourceKind::AiInference, 0.4),
            claim("foo", Some("==2.0"), SourceKind::AiInference, 0.4),
            claim("bar", Some(">=1,<2"), SourceKind::ManifestFile, 1.0),
            claim("bar", Some(">=3"), SourceKind::ManifestFile, 1.0),
            claim("ok", None, SourceKind::ManifestFile, 1.0),
        ]);
        let validator = ScriptedValidator::new(|_| Ok(None));
        let config = LoopConfig {
            optional: vec!["python-pip:bar".to_string()],
            ..Default::default()
        };
        let result = ResolutionLoop::new(&OfflineLookup, &validator, config).run(&set, Path::new("."));

        assert!(result.is_accepted());
        let dropped: Vec<&str> = result.optional_conflicts.iter().map(|c| c.package.name()).collect();
        assert_eq!(dropped, vec!["bar", "foo"]);
        assert_eq!(result.accepted_assignment().unwrap().len(), 1);
    }

    #[test]
    fn test_infrastructure_error_not_retried() {
        let set = aggregate(vec![claim("foo", None, SourceKind::ManifestFile, 1.0)]);
        let validator = ScriptedValidator::new(|_| Err(Error::ToolNotFound("pip".to_string())));
        let result = ResolutionLoop::new(&OfflineLookup, &validator, LoopConfig::default()).run(&set, Path::new("."));

        assert!(matches!(result.outcome, LoopOutcome::Failed(FailureReason::SandboxUnavailable(_))));
        assert_eq!(result.history.len(), 1);
        assert!(result.history[0].infrastructure_error.as_ref().unwrap().contains("pip"));
    }

    #[test]
    fn test_cancel_before_attempt() {
        let set = aggregate(vec![claim("foo", None, SourceKind::ManifestFile, 1.0)]);
        let validator = ScriptedValidator::new(|_| Ok(None));
        let token = CancelToken::new();
        token.cancel();
        let result = ResolutionLoop::new(&OfflineLookup, &validator, LoopConfig::default())
            .with_cancel_token(token)
            .run(&set, Path::new("."));
        assert_eq!(result.outcome, LoopOutcome::Failed(FailureReason::Cancelled));
        assert!(result.history.is_empty());
    }

    #[test]
    fn test_loosen_keeps_lower_bound() {
        let catalog = StaticCatalog::new()
            .with_versions(id("numpy"), &["1.19.5", "1.21.0", "1.24.4", "1.26.4"])
            .unwrap();
        let set = aggregate(vec![claim("numpy", Some(">=1.21,<2.0"), SourceKind::ManifestFile, 1.0)]);
        let validator = ScriptedValidator::new(|a| {
            let v = PackageVersion::parse(&version_of(a, "numpy")).unwrap();
            Ok((v > PackageVersion::new(1, 24, 4)).then(|| vec![id("numpy")]))
        });
        let result = ResolutionLoop::new(&catalog, &validator, LoopConfig::default()).run(&set, Path::new("."));
        assert!(result.is_accepted());
        assert_eq!(
            result.history[0].adjustments[0].constraint.as_ref().unwrap().to_string(),
            ">=1.21, <1.26.0"
        );
        assert_eq!(version_of(result.accepted_assignment().unwrap(), "numpy"), "1.24.4");
    }

    #[test]
    fn test_deprecated_pin_upgraded_before_validation() {
        let catalog = StaticCatalog::new()
            .with_versions(id("tensorflow"), &["1.15.0", "2.16.1"])
            .unwrap();
        let set = aggregate(vec![claim("tensorflow", Some("==1.15.0"), SourceKind::ManifestFile, 1.0)]);
        let validator = ScriptedValidator::new(|_| Ok(None));

        let result = ResolutionLoop::new(&catalog, &validator, LoopConfig::default()).run(&set, Path::new("."));
        assert!(result.is_accepted());
        assert_eq!(version_of(&validator.seen.lock().unwrap()[0], "tensorflow"), "2.16.1");
        let notice = &result.history[0].deprecations[0];
        assert_eq!(notice.version.to_string(), "1.15.0");
        assert_eq!(notice.upgraded_to.as_ref().map(ToString::to_string).as_deref(), Some("2.16.1"));
        assert!(result.accepted_assignment().unwrap().get(&id("tensorflow")).unwrap().auto_fixed);

        let config = LoopConfig {
            upgrade_deprecated: false,
            ..Default::default()
        };
        let kept = ResolutionLoop::new(&catalog, &validator, config).run(&set, Path::new("."));
        assert_eq!(version_of(kept.accepted_assignment().unwrap(), "tensorflow"), "1.15.0");
        assert!(kept.history[0].deprecations[0].upgraded_to.is_none());
    }

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<(String, Phase)>>,
    }

    impl ProgressTracker for RecordingProgress {
        fn set_phase(&self, project: &str, phase: Phase) {
            self.phases.lock().unwrap().push((project.to_string(), phase));
        }

        fn finish_project(&self, _project: &str, _accepted: bool, _summary: &str) {}
    }

    #[test]
    fn test_progress_follows_attempts() {
        let catalog = StaticCatalog::new()
            .with_versions(id("bar"), &["1.0.0", "1.1.0", "1.2.0"])
            .unwrap();
        let set = aggregate(vec![claim("bar", Some("==1.2.0"), SourceKind::ManifestFile, 1.0)]);
        let validator = ScriptedValidator::new(|a| Ok((version_of(a, "bar") == "1.2.0").then(|| vec![id("bar")])));
        let progress = RecordingProgress::default();

        ResolutionLoop::new(&catalog, &validator, LoopConfig::default())
            .with_progress(&progress, "app")
            .run(&set, Path::new("."));

        let phases: Vec<Phase> = progress.phases.lock().unwrap().iter().map(|(_, p)| *p).collect();
        assert_eq!(
            phases,
            vec![
                Phase::Resolving { attempt: 1, budget: 3 },
                Phase::Validating { attempt: 1, budget: 3 },
                Phase::Adjusting { attempt: 1, budget: 3 },
                Phase::Resolving { attempt: 2, budget: 3 },
                Phase::Validating { attempt: 2, budget: 3 },
            ]
        );
        assert!(progress.phases.lock().unwrap().iter().all(|(label, _)| label == "app"));
    }
}
