// src/validator.rs

//! Sandbox validation of a resolved assignment
//!
//! Each ecosystem in the assignment is installed in its own fresh sandbox,
//! one after another. The project directory is never touched: manifests are
//! rendered into the sandbox's work directory. Results of the individual
//! ecosystems are merged into one [`ValidationResult`].
//!
//! After a passing install the ecosystem's vulnerability audit runs in the
//! same sandbox when its tool is available. Audit findings are reported but
//! never fail a validation.
//!
//! Installer failures are results, not errors. `Err` is reserved for
//! infrastructure problems (no scratch space, missing installer tool) and
//! cancellation, which the resolution loop must not retry.

use crate::cancel::CancelToken;
use crate::claim::PackageIdentity;
use crate::ecosystems::{EcosystemRegistry, EcosystemSupport};
use crate::error::{Error, Result};
use crate::resolver::{ResolvedAssignment, ResolvedEntry};
use crate::sandbox::{Sandbox, SandboxConfig, StepOutcome};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Diagnostic logs kept per ecosystem (tail)
const MAX_LOG_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Pass,
    Fail,
}

/// Why a validation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    InstallFailed { exit_code: Option<i32> },
    TimedOut,
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Outcome of installing an assignment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub outcome: ValidationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Packages the installer output blames; empty means the whole
    /// assignment is suspect
    pub failing_packages: BTreeSet<PackageIdentity>,
    pub diagnostic_log: String,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// Vulnerability audit output lines of a passing install
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub audit_findings: Vec<String>,
}

impl ValidationResult {
    pub fn passed(diagnostic_log: impl Into<String>, duration: Duration) -> Self {
        Self {
            outcome: ValidationOutcome::Pass,
            failure: None,
            failing_packages: BTreeSet::new(),
            diagnostic_log: diagnostic_log.into(),
            duration,
            audit_findings: Vec::new(),
        }
    }

    pub fn with_audit_findings(mut self, findings: Vec<String>) -> Self {
        self.audit_findings = findings;
        self
    }

    pub fn failed(
        failure: FailureKind,
        failing_packages: BTreeSet<PackageIdentity>,
        diagnostic_log: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            outcome: ValidationOutcome::Fail,
            failure: Some(failure),
            failing_packages,
            diagnostic_log: diagnostic_log.into(),
            duration,
            audit_findings: Vec::new(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.outcome == ValidationOutcome::Pass
    }

    /// Combine per-ecosystem results; the first failure kind wins
    pub fn merge(mut self, other: ValidationResult) -> Self {
        if other.outcome == ValidationOutcome::Fail {
            self.outcome = ValidationOutcome::Fail;
            self.failure = self.failure.or(other.failure);
        }
        self.failing_packages.extend(other.failing_packages);
        self.audit_findings.extend(other.audit_findings);
        if !other.diagnostic_log.is_empty() {
            if !self.diagnostic_log.is_empty() {
                self.diagnostic_log.push('\n');
            }
            self.diagnostic_log.push_str(&other.diagnostic_log);
        }
        self.duration += other.duration;
        self
    }
}

/// Checks that an assignment installs
pub trait Validator: Send + Sync {
    fn validate(&self, assignment: &ResolvedAssignment, project_root: &Path) -> Result<ValidationResult>;
}

/// Keep the end of a log, where installers report what went wrong
fn tail(log: &str, max_bytes: usize) -> String {
    if log.len() <= max_bytes {
        return log.to_string();
    }
    let mut start = log.len() - max_bytes;
    while !log.is_char_boundary(start) {
        start += 1;
    }
    format!("[... {} bytes truncated ...]\n{}", start, &log[start..])
}

/// Validator installing into throwaway sandboxes
pub struct SandboxValidator {
    registry: Arc<EcosystemRegistry>,
    config: SandboxConfig,
    cancel: CancelToken,
    audit: bool,
}

impl SandboxValidator {
    pub fn new(registry: Arc<EcosystemRegistry>, config: SandboxConfig, cancel: CancelToken) -> Self {
        Self {
            registry,
            config,
            cancel,
            audit: true,
        }
    }

    /// Enable or disable the post-install vulnerability audit
    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }

    /// Run the audit steps after a passing install
    ///
    /// A missing audit tool skips the audit. Only cancellation is an error.
    fn audit(
        &self,
        sandbox: &Sandbox,
        plugin: &dyn EcosystemSupport,
        entries: &[&ResolvedEntry],
    ) -> Result<Vec<String>> {
        let steps = plugin.audit_steps(entries, sandbox.paths());
        if !self.audit || steps.is_empty() {
            return Ok(Vec::new());
        }
        if let Err(e) = sandbox.check_tools(&steps) {
            warn!("Skipping {} vulnerability audit: {}", plugin.ecosystem(), e);
            return Ok(Vec::new());
        }

        let offset = sandbox.read_log().len();
        for step in &steps {
            match sandbox.run(step) {
                Ok(StepOutcome::TimedOut) => {
                    warn!("{} audit timed out", plugin.ecosystem());
                    break;
                }
                // Audit tools exit non-zero when they find something
                Ok(_) => {}
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!("{} audit could not run: {}", plugin.ecosystem(), e);
                    return Ok(Vec::new());
                }
            }
        }

        let log = sandbox.read_log();
        let findings = plugin.audit_findings(log.get(offset..).unwrap_or_default());
        if !findings.is_empty() {
            warn!("{} audit reported {} finding(s)", plugin.ecosystem(), findings.len());
        }
        Ok(findings)
    }
}

impl Validator for SandboxValidator {
    fn validate(&self, assignment: &ResolvedAssignment, project_root: &Path) -> Result<ValidationResult> {
        let mut merged = ValidationResult::passed("", Duration::ZERO);

        for ecosystem in assignment.ecosystems() {
            let plugin = self.registry.require(ecosystem)?;
            let entries = assignment.for_ecosystem(ecosystem);
            info!(
                "Validating {} {} package(s) for {}",
                entries.len(),
                ecosystem,
                project_root.display()
            );

            let started = Instant::now();
            let sandbox = Sandbox::create(self.config.clone(), self.cancel.clone())?;
            sandbox.write_manifests(&plugin.render_manifest(&entries))?;
            let steps = plugin.install_steps(&entries, sandbox.paths());
            sandbox.check_tools(&steps)?;

            let outcome = sandbox.run_all(&steps)?;
            let findings = match outcome {
                StepOutcome::Succeeded => self.audit(&sandbox, plugin.as_ref(), &entries)?,
                _ => Vec::new(),
            };
            let log = sandbox.read_log();
            let duration = started.elapsed();
            let diagnostic = tail(&format!("=== {} ===\n{}", ecosystem, log), MAX_LOG_BYTES);

            let result = match outcome {
                StepOutcome::Succeeded => ValidationResult::passed(diagnostic, duration).with_audit_findings(findings),
                StepOutcome::Failed { exit_code } => {
                    let blamed = plugin.attribute_failures(&log, &entries);
                    warn!("{} install failed (exit {:?}); blamed: {}", ecosystem, exit_code, blamed.len());
                    ValidationResult::failed(FailureKind::InstallFailed { exit_code }, blamed, diagnostic, duration)
                }
                StepOutcome::TimedOut => {
                    let blamed = plugin.attribute_failures(&log, &entries);
                    warn!("{} install timed out", ecosystem);
                    ValidationResult::failed(FailureKind::TimedOut, blamed, diagnostic, duration)
                }
            };
            merged = merged.merge(result);
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::DependencyClaim;
    use crate::dockerfile::ContainerStage;
    use crate::ecosystem::Ecosystem;
    use crate::ecosystems::EcosystemSupport;
    use crate::ecosystems::test_support::entry;
    use crate::error::Error;
    use crate::manifest::ManifestFile;
    use crate::resolver::ResolvedEntry;
    use crate::sandbox::{InstallStep, SandboxPaths};
    use std::fs;
    use tempfile::TempDir;

    /// Writes `deps.txt` and runs a shell script against it
    struct ShellSupport {
        ecosystem: Ecosystem,
        program: &'static str,
        script: &'static str,
        audit: Option<(&'static str, &'static str)>,
    }

    impl EcosystemSupport for ShellSupport {
        fn ecosystem(&self) -> Ecosystem {
            self.ecosystem
        }

        fn scan(&self, _root: &Path) -> Result<Vec<DependencyClaim>> {
            Ok(Vec::new())
        }

        fn render_manifest(&self, entries: &[&ResolvedEntry]) -> Vec<ManifestFile> {
            let lines: String = entries
                .iter()
                .map(|e| format!("{}=={}\n", e.identity.name(), e.version))
                .collect();
            vec![ManifestFile::new("deps.txt", lines)]
        }

        fn install_steps(&self, _entries: &[&ResolvedEntry], _paths: &SandboxPaths) -> Vec<InstallStep> {
            vec![InstallStep::new(self.program).arg("-c").arg(self.script)]
        }

        fn audit_steps(&self, _entries: &[&ResolvedEntry], _paths: &SandboxPaths) -> Vec<InstallStep> {
            self.audit
                .iter()
                .map(|(program, script)| InstallStep::new(*program).arg("-c").arg(*script))
                .collect()
        }

        fn container_stage(&self, _manifests: &[ManifestFile]) -> ContainerStage {
            ContainerStage::new("scratch")
        }

        fn description(&self) -> &'static str {
            "shell test plugin"
        }
    }

    fn validator(plugins: Vec<ShellSupport>, timeout: Duration) -> SandboxValidator {
        let mut registry = EcosystemRegistry::new();
        for plugin in plugins {
            registry.register(Arc::new(plugin));
        }
        SandboxValidator::new(
            Arc::new(registry),
            SandboxConfig::default().with_timeout(timeout),
            CancelToken::new(),
        )
    }

    fn shell(ecosystem: Ecosystem, script: &'static str) -> ShellSupport {
        ShellSupport {
            ecosystem,
            program: "/bin/sh",
            script,
            audit: None,
        }
    }

    fn audited(script: &'static str, audit: &'static str) -> ShellSupport {
        ShellSupport {
            audit: Some(("/bin/sh", audit)),
            ..shell(Ecosystem::PythonPip, script)
        }
    }

    const REPORT_CVE: &str = "echo 'foo 1.0.0 CVE-2021-1234'; echo 'Found 1 known vulnerability in 1 package'; exit 1";

    const FAIL_ON_BAR: &str = "cat deps.txt; if grep -q '^bar==' deps.txt; then echo 'ERROR: could not install bar' >&2; exit 3; fi";

    #[test]
    fn test_pass() {
        let v = validator(vec![shell(Ecosystem::PythonPip, FAIL_ON_BAR)], DEFAULT_TEST_TIMEOUT);
        let assignment = ResolvedAssignment::from_entries([entry(Ecosystem::PythonPip, "foo", "1.0.0")]);
        let result = v.validate(&assignment, Path::new("/project")).unwrap();
        assert!(result.is_pass());
        assert!(result.diagnostic_log.contains("foo==1.0.0"));
    }

    const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn test_failure_attributed() {
        let v = validator(vec![shell(Ecosystem::PythonPip, FAIL_ON_BAR)], DEFAULT_TEST_TIMEOUT);
        let assignment = ResolvedAssignment::from_entries([
            entry(Ecosystem::PythonPip, "foo", "1.0.0"),
            entry(Ecosystem::PythonPip, "bar", "1.2.0"),
        ]);
        let result = v.validate(&assignment, Path::new("/project")).unwrap();
        assert_eq!(result.outcome, ValidationOutcome::Fail);
        assert_eq!(result.failure, Some(FailureKind::InstallFailed { exit_code: Some(3) }));
        assert_eq!(
            result.failing_packages.into_iter().collect::<Vec<_>>(),
            vec![PackageIdentity::new(Ecosystem::PythonPip, "bar")]
        );
    }

    #[test]
    fn test_timeout_is_a_failure() {
        let v = validator(vec![shell(Ecosystem::PythonPip, "sleep 30")], Duration::from_millis(300));
        let assignment = ResolvedAssignment::from_entries([entry(Ecosystem::PythonPip, "foo", "1.0.0")]);
        let result = v.validate(&assignment, Path::new("/project")).unwrap();
        assert_eq!(result.failure, Some(FailureKind::TimedOut));
        assert!(result.duration < Duration::from_secs(10));
    }

    #[test]
    fn test_missing_tool_is_infrastructure() {
        let plugin = ShellSupport {
            ecosystem: Ecosystem::PythonPip,
            program: "envforge-no-such-installer",
            script: "true",
            audit: None,
        };
        let v = validator(vec![plugin], DEFAULT_TEST_TIMEOUT);
        let assignment = ResolvedAssignment::from_entries([entry(Ecosystem::PythonPip, "foo", "1.0.0")]);
        let err = v.validate(&assignment, Path::new("/project")).unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_ecosystems_validated_separately_and_merged() {
        let v = validator(
            vec![
                shell(Ecosystem::PythonPip, "cat deps.txt"),
                shell(Ecosystem::NodeNpm, FAIL_ON_BAR),
            ],
            DEFAULT_TEST_TIMEOUT,
        );
        let assignment = ResolvedAssignment::from_entries([
            entry(Ecosystem::PythonPip, "foo", "1.0.0"),
            entry(Ecosystem::NodeNpm, "bar", "2.0.0"),
        ]);
        let result = v.validate(&assignment, Path::new("/project")).unwrap();
        assert_eq!(result.outcome, ValidationOutcome::Fail);
        assert!(result.diagnostic_log.contains("=== python-pip ==="));
        assert!(result.diagnostic_log.contains("=== node-npm ==="));
        assert_eq!(result.failing_packages.len(), 1);
    }

    #[test]
    fn test_project_directory_untouched() {
        let project = TempDir::new().unwrap();
        fs::write(project.path().join("requirements.txt"), "foo\n").unwrap();
        let v = validator(vec![shell(Ecosystem::PythonPip, "touch created.txt")], DEFAULT_TEST_TIMEOUT);
        let assignment = ResolvedAssignment::from_entries([entry(Ecosystem::PythonPip, "foo", "1.0.0")]);
        v.validate(&assignment, project.path()).unwrap();

        let names: Vec<String> = fs::read_dir(project.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["requirements.txt"]);
        assert_eq!(fs::read_to_string(project.path().join("requirements.txt")).unwrap(), "foo\n");
    }

    #[test]
    fn test_tail_truncates_on_char_boundary() {
        let log = "é".repeat(10);
        let cut = tail(&log, 5);
        assert!(cut.starts_with("[... "));
        assert!(cut.ends_with("éé"));
        assert_eq!(tail("short", 100), "short");
    }

    #[test]
    fn test_audit_findings_on_pass() {
        let v = validator(vec![audited("cat deps.txt", REPORT_CVE)], DEFAULT_TEST_TIMEOUT);
        let assignment = ResolvedAssignment::from_entries([entry(Ecosystem::PythonPip, "foo", "1.0.0")]);
        let result = v.validate(&assignment, Path::new("/project")).unwrap();
        assert!(result.is_pass());
        assert_eq!(
            result.audit_findings,
            vec!["foo 1.0.0 CVE-2021-1234", "Found 1 known vulnerability in 1 package"]
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["audit_findings"][0], "foo 1.0.0 CVE-2021-1234");
    }

    #[test]
    fn test_audit_skipped_when_disabled_failed_or_missing() {
        let assignment = ResolvedAssignment::from_entries([
            entry(Ecosystem::PythonPip, "foo", "1.0.0"),
            entry(Ecosystem::PythonPip, "bar", "1.2.0"),
        ]);
        let failing = validator(vec![audited(FAIL_ON_BAR, REPORT_CVE)], DEFAULT_TEST_TIMEOUT);
        let result = failing.validate(&assignment, Path::new("/project")).unwrap();
        assert!(!result.is_pass());
        assert!(result.audit_findings.is_empty());

        let passing = ResolvedAssignment::from_entries([entry(Ecosystem::PythonPip, "foo", "1.0.0")]);
        let disabled = validator(vec![audited("true", REPORT_CVE)], DEFAULT_TEST_TIMEOUT).with_audit(false);
        assert!(disabled.validate(&passing, Path::new("/project")).unwrap().audit_findings.is_empty());

        let missing = ShellSupport {
            audit: Some(("envforge-no-such-auditor", "true")),
            ..shell(Ecosystem::PythonPip, "true")
        };
        let result = validator(vec![missing], DEFAULT_TEST_TIMEOUT)
            .validate(&passing, Path::new("/project"))
            .unwrap();
        assert!(result.is_pass());
        assert!(result.audit_findings.is_empty());
    }
}
