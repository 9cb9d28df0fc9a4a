// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use envforge::claim::{DependencyClaim, PackageIdentity, SourceKind};
use envforge::dockerfile::ContainerStage;
use envforge::ecosystems::{EcosystemRegistry, EcosystemSupport, PythonSupport};
use envforge::manifest::ManifestFile;
use envforge::resolver::{ResolvedAssignment, ResolvedEntry};
use envforge::sandbox::{InstallStep, SandboxPaths};
use envforge::validator::{FailureKind, ValidationResult, Validator};
use envforge::{Ecosystem, Result, VersionConstraint};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use walkdir::WalkDir;

pub fn py(name: &str) -> PackageIdentity {
    PackageIdentity::new(Ecosystem::PythonPip, name)
}

/// A python-pip claim, optionally constrained
pub fn claim(name: &str, constraint: Option<&str>, source: SourceKind, confidence: f64) -> DependencyClaim {
    let claim = DependencyClaim::new(py(name), source, confidence, "test fixture");
    match constraint {
        Some(c) => claim.with_constraint(VersionConstraint::parse(c).unwrap()),
        None => claim,
    }
}

/// Version string chosen for a package
pub fn version_of(assignment: &ResolvedAssignment, name: &str) -> String {
    assignment.get(&py(name)).unwrap().version.to_string()
}

type Rule = dyn Fn(&ResolvedAssignment) -> Option<Vec<&'static str>> + Send + Sync;

/// Validator driven by a rule: `None` passes, `Some(names)` fails blaming
/// those packages
pub struct ScriptedValidator {
    rule: Box<Rule>,
    pub seen: Mutex<Vec<ResolvedAssignment>>,
}

impl ScriptedValidator {
    pub fn new(rule: impl Fn(&ResolvedAssignment) -> Option<Vec<&'static str>> + Send + Sync + 'static) -> Self {
        Self {
            rule: Box::new(rule),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl Validator for ScriptedValidator {
    fn validate(&self, assignment: &ResolvedAssignment, _project_root: &Path) -> Result<ValidationResult> {
        self.seen.lock().unwrap().push(assignment.clone());
        Ok(match (self.rule)(assignment) {
            None => ValidationResult::passed("install ok", Duration::from_millis(10)),
            Some(names) => ValidationResult::failed(
                FailureKind::InstallFailed { exit_code: Some(1) },
                names.into_iter().map(py).collect::<BTreeSet<_>>(),
                "install failed",
                Duration::from_millis(10),
            ),
        })
    }
}

/// Python plugin whose install step is a shell script
///
/// Scanning, rendering and attribution behave like pip; the script runs in
/// the sandbox work directory next to the rendered `requirements.txt`.
pub struct ShellPython {
    pub script: String,
}

impl EcosystemSupport for ShellPython {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::PythonPip
    }

    fn scan(&self, project_root: &Path) -> Result<Vec<DependencyClaim>> {
        PythonSupport.scan(project_root)
    }

    fn render_manifest(&self, entries: &[&ResolvedEntry]) -> Vec<ManifestFile> {
        PythonSupport.render_manifest(entries)
    }

    fn install_steps(&self, _entries: &[&ResolvedEntry], _paths: &SandboxPaths) -> Vec<InstallStep> {
        vec![InstallStep::new("/bin/sh").arg("-c").arg(self.script.as_str())]
    }

    fn attribute_failures(&self, log: &str, entries: &[&ResolvedEntry]) -> BTreeSet<PackageIdentity> {
        PythonSupport.attribute_failures(log, entries)
    }

    fn container_stage(&self, manifests: &[ManifestFile]) -> ContainerStage {
        PythonSupport.container_stage(manifests)
    }

    fn description(&self) -> &'static str {
        "pip manifests installed by a shell script"
    }
}

/// Built-in registry with python-pip replaced by a shell script
pub fn shell_registry(script: &str) -> EcosystemRegistry {
    let mut registry = EcosystemRegistry::with_builtins();
    registry.register(Arc::new(ShellPython {
        script: script.to_string(),
    }));
    registry
}

/// Every file below `root` with its contents
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().to_path_buf();
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}

/// Write a file below `root`, creating parent directories
pub fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}
