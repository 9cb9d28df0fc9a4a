// src/report.rs

//! Resolution reports
//!
//! A [`ResolutionReport`] describes one project's run: what was accepted,
//! what is tentative or auto-fixed, which conflicts stayed unresolved,
//! deprecated releases, audit findings, the evidence warnings and the full
//! attempt history. [`WorkspaceReport`]
//! collects the reports of every project found in a workspace and maps them
//! to the process exit status.

use crate::aggregator::CandidateSet;
use crate::claim::PackageIdentity;
use crate::deprecation::DeprecationNotice;
use crate::ecosystem::Ecosystem;
use crate::error::Result;
use crate::evidence::{Evidence, EvidenceWarning};
use crate::manifest::FileChange;
use crate::orchestrator::{LoopOutcome, LoopResult, ResolutionAttempt};
use crate::resolver::{ResolvedAssignment, ResolvedEntry, UnresolvedConflict};
use crate::validator::FailureKind;
use crate::workspace::Project;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Process exit status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Accepted with nothing to review
    Clean,
    /// Accepted with something to review: tentative, auto-fixed or dropped
    /// optional packages, deprecated releases, audit findings
    NeedsReview,
    Failed,
}

impl ExitStatus {
    pub fn code(&self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::NeedsReview => 2,
            Self::Failed => 1,
        }
    }
}

/// Report for one project
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub project: String,
    pub root: PathBuf,
    pub ecosystem: Ecosystem,
    pub claim_count: usize,
    pub package_count: usize,
    pub evidence_warnings: Vec<EvidenceWarning>,
    #[serde(flatten)]
    pub result: LoopResult,
    /// Generated files and what applying them does
    pub outputs: Vec<(PathBuf, FileChange)>,
    /// Files actually written into the project
    pub applied: Vec<PathBuf>,
    /// Differences from an existing lockfile
    pub lock_drift: Vec<String>,
}

impl ResolutionReport {
    pub fn new(project: &Project, evidence: &Evidence, candidates: &CandidateSet, result: LoopResult) -> Self {
        Self {
            project: project.label(),
            root: project.root.clone(),
            ecosystem: project.ecosystem,
            claim_count: evidence.claims.len(),
            package_count: candidates.len(),
            evidence_warnings: evidence.warnings.clone(),
            result,
            outputs: Vec::new(),
            applied: Vec::new(),
            lock_drift: Vec::new(),
        }
    }

    pub fn accepted(&self) -> Option<&ResolvedAssignment> {
        self.result.accepted_assignment()
    }

    pub fn tentative(&self) -> Vec<&PackageIdentity> {
        self.accepted()
            .map(|a| a.tentative().map(|e| &e.identity).collect())
            .unwrap_or_default()
    }

    pub fn auto_fixed(&self) -> Vec<&PackageIdentity> {
        self.accepted()
            .map(|a| a.auto_fixed().map(|e| &e.identity).collect())
            .unwrap_or_default()
    }

    /// Blocking conflicts followed by dropped optional ones
    pub fn unresolved(&self) -> impl Iterator<Item = &UnresolvedConflict> {
        self.result
            .blocking_conflicts()
            .iter()
            .chain(self.result.optional_conflicts.iter())
    }

    pub fn history(&self) -> &[ResolutionAttempt] {
        &self.result.history
    }

    /// Deprecated releases found in the last attempt
    pub fn deprecations(&self) -> &[DeprecationNotice] {
        self.result
            .history
            .last()
            .map(|a| a.deprecations.as_slice())
            .unwrap_or_default()
    }

    /// Vulnerability audit findings of the accepted install
    pub fn audit_findings(&self) -> &[String] {
        match (self.result.is_accepted(), self.result.history.last()) {
            (true, Some(attempt)) => attempt
                .validation
                .as_ref()
                .map(|v| v.audit_findings.as_slice())
                .unwrap_or_default(),
            _ => &[],
        }
    }

    pub fn exit_status(&self) -> ExitStatus {
        match self.accepted() {
            None => ExitStatus::Failed,
            Some(assignment) => {
                let review = assignment.tentative().next().is_some()
                    || assignment.auto_fixed().next().is_some()
                    || !self.result.optional_conflicts.is_empty()
                    || !self.audit_findings().is_empty()
                    || self.deprecations().iter().any(|d| d.upgraded_to.is_none());
                if review { ExitStatus::NeedsReview } else { ExitStatus::Clean }
            }
        }
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        let attempts = self.result.history.len();
        match &self.result.outcome {
            LoopOutcome::Accepted => format!(
                "{}: accepted {} package(s) after {} attempt(s) ({} tentative, {} auto-fixed)",
                self.project,
                self.accepted().map(ResolvedAssignment::len).unwrap_or(0),
                attempts,
                self.tentative().len(),
                self.auto_fixed().len()
            ),
            LoopOutcome::Failed(reason) => {
                format!("{}: failed after {} attempt(s): {}", self.project, attempts, reason)
            }
        }
    }
}

fn entry_line(entry: &ResolvedEntry) -> String {
    let mut line = format!("  {} {}", entry.identity, entry.version);
    if entry.tentative {
        line.push_str(" (tentative)");
    }
    if entry.auto_fixed {
        line.push_str(" (auto-fixed)");
    }
    line
}

fn attempt_line(attempt: &ResolutionAttempt) -> String {
    let status = match (&attempt.validation, &attempt.infrastructure_error) {
        (_, Some(error)) => format!("error: {}", error),
        (None, None) => format!("{} unresolved conflict(s)", attempt.conflicts.len()),
        (Some(v), None) if v.is_pass() => format!("pass in {:.1}s", v.duration.as_secs_f64()),
        (Some(v), None) => {
            let kind = match v.failure {
                Some(FailureKind::TimedOut) => "timed out".to_string(),
                Some(FailureKind::InstallFailed { exit_code: Some(code) }) => format!("install failed (exit {})", code),
                _ => "install failed".to_string(),
            };
            if v.failing_packages.is_empty() {
                kind
            } else {
                let blamed: Vec<String> = v.failing_packages.iter().map(ToString::to_string).collect();
                format!("{}, blamed {}", kind, blamed.join(", "))
            }
        }
    };

    let mut line = format!("  #{} {}", attempt.number, status);
    for adjustment in &attempt.adjustments {
        match &adjustment.constraint {
            Some(constraint) => line.push_str(&format!(
                "\n      loosened {} from {} to {}",
                adjustment.package, adjustment.previous, constraint
            )),
            None => line.push_str(&format!("\n      nothing left to loosen for {}", adjustment.package)),
        }
    }
    line
}

impl fmt::Display for ResolutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.project)?;
        writeln!(f, "{}", self.summary())?;
        writeln!(
            f,
            "Evidence: {} claim(s) for {} package(s)",
            self.claim_count, self.package_count
        )?;

        if let Some(assignment) = self.accepted() {
            writeln!(f, "Packages:")?;
            for entry in assignment.entries() {
                writeln!(f, "{}", entry_line(entry))?;
            }
        }

        if !self.deprecations().is_empty() {
            writeln!(f, "Deprecated:")?;
            for notice in self.deprecations() {
                writeln!(f, "  {}", notice)?;
            }
        }

        if !self.audit_findings().is_empty() {
            writeln!(f, "Audit findings:")?;
            for finding in self.audit_findings() {
                writeln!(f, "  {}", finding)?;
            }
        }

        let unresolved: Vec<&UnresolvedConflict> = self.unresolved().collect();
        if !unresolved.is_empty() {
            writeln!(f, "Unresolved:")?;
            for conflict in unresolved {
                write!(f, "{}", conflict)?;
            }
        }

        if !self.evidence_warnings.is_empty() {
            writeln!(f, "Warnings:")?;
            for warning in &self.evidence_warnings {
                writeln!(f, "  {}: {}", warning.source, warning.message)?;
            }
        }

        writeln!(f, "History:")?;
        for attempt in &self.result.history {
            writeln!(f, "{}", attempt_line(attempt))?;
        }

        if !self.lock_drift.is_empty() {
            writeln!(f, "Lockfile drift:")?;
            for drift in &self.lock_drift {
                writeln!(f, "  {}", drift)?;
            }
        }

        if !self.outputs.is_empty() {
            writeln!(f, "Files:")?;
            for (path, change) in &self.outputs {
                let verb = match change {
                    FileChange::Create => "create",
                    FileChange::Modify => "modify",
                    FileChange::Unchanged => "unchanged",
                };
                writeln!(f, "  {:<9} {}", verb, path.display())?;
            }
        }
        Ok(())
    }
}

/// Reports for every project in a workspace
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceReport {
    pub workspace: PathBuf,
    pub generated: String,
    pub generator: String,
    pub projects: Vec<ResolutionReport>,
}

impl WorkspaceReport {
    pub fn new(workspace: &Path, projects: Vec<ResolutionReport>) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            generated: Utc::now().to_rfc3339(),
            generator: format!("envforge {}", env!("CARGO_PKG_VERSION")),
            projects,
        }
    }

    /// Worst status of any project; an empty workspace is clean
    pub fn exit_status(&self) -> ExitStatus {
        self.projects
            .iter()
            .map(ResolutionReport::exit_status)
            .max()
            .unwrap_or(ExitStatus::Clean)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl fmt::Display for WorkspaceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.projects.is_empty() {
            return writeln!(f, "No projects found in {}", self.workspace.display());
        }
        for (i, project) in self.projects.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", project)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregate;
    use crate::claim::{DependencyClaim, SourceKind};
    use crate::orchestrator::{FailureReason, LoopState};
    use crate::resolver::ConflictKind;
    use crate::validator::ValidationResult;
    use std::time::Duration;

    fn entry(name: &str, tentative: bool, auto_fixed: bool) -> ResolvedEntry {
        let mut entry = crate::ecosystems::test_support::entry(Ecosystem::PythonPip, name, "1.0.0");
        entry.tentative = tentative;
        entry.auto_fixed = auto_fixed;
        entry
    }

    fn accepted(entries: Vec<ResolvedEntry>, optional_conflicts: Vec<UnresolvedConflict>) -> LoopResult {
        LoopResult {
            outcome: LoopOutcome::Accepted,
            history: vec![ResolutionAttempt {
                number: 1,
                assignment: ResolvedAssignment::from_entries(entries),
                conflicts: Vec::new(),
                validation: Some(ValidationResult::passed("ok", Duration::from_millis(1500))),
                infrastructure_error: None,
                adjustments: Vec::new(),
                deprecations: Vec::new(),
            }],
            states: vec![
                LoopState::Aggregated,
                LoopState::Resolving,
                LoopState::Validating,
                LoopState::Accepted,
            ],
            optional_conflicts,
        }
    }

    fn report(result: LoopResult) -> ResolutionReport {
        let project = Project::new("/work/app", "", Ecosystem::PythonPip);
        let claims = vec![DependencyClaim::new(
            PackageIdentity::new(Ecosystem::PythonPip, "numpy"),
            SourceKind::ImportScan,
            0.8,
            "imported in app.py",
        )];
        let evidence = Evidence {
            claims: claims.clone(),
            warnings: Vec::new(),
        };
        ResolutionReport::new(&project, &evidence, &aggregate(claims), result)
    }

    #[test]
    fn test_exit_status_mapping() {
        assert_eq!(report(accepted(vec![entry("numpy", false, false)], vec![])).exit_status(), ExitStatus::Clean);
        assert_eq!(
            report(accepted(vec![entry("scipy", true, false)], vec![])).exit_status(),
            ExitStatus::NeedsReview
        );
        assert_eq!(
            report(accepted(vec![entry("bar", false, true)], vec![])).exit_status(),
            ExitStatus::NeedsReview
        );

        let dropped = UnresolvedConflict {
            package: PackageIdentity::new(Ecosystem::PythonPip, "foo"),
            kind: ConflictKind::ConflictingPins,
            conflicting_claims: Vec::new(),
        };
        assert_eq!(
            report(accepted(vec![entry("numpy", false, false)], vec![dropped])).exit_status(),
            ExitStatus::NeedsReview
        );

        let mut failed = accepted(vec![], vec![]);
        failed.outcome = LoopOutcome::Failed(FailureReason::RetryBudgetExhausted);
        assert_eq!(report(failed).exit_status(), ExitStatus::Failed);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Clean.code(), 0);
        assert_eq!(ExitStatus::NeedsReview.code(), 2);
        assert_eq!(ExitStatus::Failed.code(), 1);
    }

    #[test]
    fn test_workspace_takes_worst_status() {
        let workspace = WorkspaceReport::new(
            Path::new("/work"),
            vec![
                report(accepted(vec![entry("numpy", false, false)], vec![])),
                report(accepted(vec![entry("scipy", true, false)], vec![])),
            ],
        );
        assert_eq!(workspace.exit_status(), ExitStatus::NeedsReview);
        assert_eq!(WorkspaceReport::new(Path::new("/work"), vec![]).exit_status(), ExitStatus::Clean);
    }

    #[test]
    fn test_text_rendering() {
        let text = report(accepted(vec![entry("numpy", false, false), entry("scipy", true, false)], vec![])).to_string();
        assert!(text.starts_with("== . (python-pip) ==\n"));
        assert!(text.contains("accepted 2 package(s) after 1 attempt(s) (1 tentative, 0 auto-fixed)"));
        assert!(text.contains("  python-pip:scipy 1.0.0 (tentative)\n"));
        assert!(text.contains("  #1 pass in 1.5s\n"));
    }

    #[test]
    fn test_json_export() {
        let workspace = WorkspaceReport::new(
            Path::new("/work"),
            vec![report(accepted(vec![entry("numpy", false, false)], vec![]))],
        );
        let json: serde_json::Value = serde_json::from_str(&workspace.to_json().unwrap()).unwrap();
        let project = &json["projects"][0];
        assert_eq!(project["project"], ". (python-pip)");
        assert_eq!(project["outcome"]["status"], "accepted");
        assert_eq!(project["states"][3], "ACCEPTED");
        assert_eq!(project["history"][0]["validation"]["outcome"], "pass");
        assert_eq!(project["history"][0]["validation"]["duration_secs"], 1.5);
    }

    #[test]
    fn test_deprecations_and_audit_need_review() {
        let mut result = accepted(vec![entry("numpy", false, false)], vec![]);
        let attempt = &mut result.history[0];
        attempt.deprecations.push(DeprecationNotice {
            package: PackageIdentity::new(Ecosystem::PythonPip, "numpy"),
            version: crate::version::PackageVersion::parse("1.0.0").unwrap(),
            reason: "end of life".to_string(),
            upgraded_to: None,
        });
        let deprecated = report(result.clone());
        assert_eq!(deprecated.exit_status(), ExitStatus::NeedsReview);
        assert!(deprecated.to_string().contains(
            "Deprecated:\n  python-pip:numpy@1.0.0 is deprecated: end of life; suggest upgrade\n"
        ));

        let mut audited = accepted(vec![entry("numpy", false, false)], vec![]);
        audited.history[0].validation = Some(
            ValidationResult::passed("ok", Duration::ZERO).with_audit_findings(vec!["CVE-2021-1 numpy".to_string()]),
        );
        let audited = report(audited);
        assert_eq!(audited.audit_findings(), ["CVE-2021-1 numpy".to_string()]);
        assert_eq!(audited.exit_status(), ExitStatus::NeedsReview);
        assert!(audited.to_string().contains("Audit findings:\n  CVE-2021-1 numpy\n"));
    }
}
