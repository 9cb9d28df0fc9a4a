// src/ecosystems/python.rs

//! Python / pip support
//!
//! Reads `requirements.txt`, `pyproject.toml` (PEP 621 and Poetry) and
//! `Pipfile`; validates in a fresh virtualenv with `pip install -r`.

use super::{EcosystemSupport, MANIFEST_CONFIDENCE, attribute_with_patterns, read_optional};
use crate::claim::{DependencyClaim, PackageIdentity, SourceKind};
use crate::dockerfile::ContainerStage;
use crate::ecosystem::Ecosystem;
use crate::error::Result;
use crate::manifest::ManifestFile;
use crate::resolver::{ResolvedEntry, ResolvedVersion};
use crate::sandbox::{InstallStep, SandboxPaths};
use crate::version::VersionConstraint;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

static REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*(.*)$").expect("valid regex")
});

static NO_DISTRIBUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)No matching distribution found for ([A-Za-z0-9][A-Za-z0-9._-]*)").expect("valid regex")
});
static NO_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Could not find a version that satisfies the requirement ([A-Za-z0-9][A-Za-z0-9._-]*)")
        .expect("valid regex")
});
static BUT_YOU_HAVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)requires ([A-Za-z0-9][A-Za-z0-9._-]*)[^,\n]*, but you have").expect("valid regex")
});
static USER_REQUESTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*The user requested ([A-Za-z0-9][A-Za-z0-9._-]*)").expect("valid regex")
});
static BUILD_FAILED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Failed (?:to build|building wheel for) ([A-Za-z0-9][A-Za-z0-9._-]*)").expect("valid regex")
});

/// Python packages installed with pip
pub struct PythonSupport;

/// Split a PEP 508 requirement into name and version specifier
///
/// Returns `None` for lines that are not requirements (options, includes,
/// URLs). Extras and environment markers are dropped.
pub fn parse_requirement(line: &str) -> Option<(String, Option<String>)> {
    let line = match line.find(" #") {
        Some(pos) => &line[..pos],
        None => line,
    };
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('-') || line.contains("://") {
        return None;
    }
    let line = line.split(';').next().unwrap_or(line);

    let caps = REQUIREMENT_RE.captures(line)?;
    let name = caps.get(1)?.as_str().to_string();
    let spec = caps
        .get(2)
        .map(|m| m.as_str().trim().trim_start_matches('(').trim_end_matches(')').trim())
        .unwrap_or("");

    // `name @ file:///...` direct references carry no version
    if spec.is_empty() || spec.starts_with('@') {
        Some((name, None))
    } else {
        Some((name, Some(spec.to_string())))
    }
}

fn manifest_claim(name: &str, spec: Option<&str>, file: &str) -> DependencyClaim {
    let identity = PackageIdentity::new(Ecosystem::PythonPip, name);
    let claim = DependencyClaim::new(
        identity,
        SourceKind::ManifestFile,
        MANIFEST_CONFIDENCE,
        format!("declared in {}", file),
    );
    match spec.map(VersionConstraint::parse) {
        Some(Ok(constraint)) => claim.with_constraint(constraint),
        Some(Err(e)) => {
            warn!("Ignoring version of {} in {}: {}", name, file, e);
            claim
        }
        None => claim,
    }
}

/// Poetry and Pipfile values: `"^1.2"`, `"*"`, or `{ version = "..." }`
fn table_value_spec(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Table(t) => t.get("version").and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

impl PythonSupport {
    fn scan_requirements(&self, root: &Path, claims: &mut Vec<DependencyClaim>) -> Result<()> {
        if let Some(content) = read_optional(&root.join("requirements.txt"))? {
            for line in content.lines() {
                if let Some((name, spec)) = parse_requirement(line) {
                    claims.push(manifest_claim(&name, spec.as_deref(), "requirements.txt"));
                }
            }
        }
        Ok(())
    }

    fn scan_pyproject(&self, root: &Path, claims: &mut Vec<DependencyClaim>) -> Result<()> {
        let Some(content) = read_optional(&root.join("pyproject.toml"))? else {
            return Ok(());
        };
        let doc: toml::Value = toml::from_str(&content)?;

        if let Some(deps) = doc
            .get("project")
            .and_then(|p| p.get("dependencies"))
            .and_then(|d| d.as_array())
        {
            for dep in deps.iter().filter_map(|d| d.as_str()) {
                if let Some((name, spec)) = parse_requirement(dep) {
                    claims.push(manifest_claim(&name, spec.as_deref(), "pyproject.toml"));
                }
            }
        }

        if let Some(deps) = doc
            .get("tool")
            .and_then(|t| t.get("poetry"))
            .and_then(|p| p.get("dependencies"))
            .and_then(|d| d.as_table())
        {
            for (name, value) in deps.iter().filter(|(name, _)| name.as_str() != "python") {
                let spec = table_value_spec(value);
                claims.push(manifest_claim(name, spec.as_deref(), "pyproject.toml"));
            }
        }
        Ok(())
    }

    fn scan_pipfile(&self, root: &Path, claims: &mut Vec<DependencyClaim>) -> Result<()> {
        let Some(content) = read_optional(&root.join("Pipfile"))? else {
            return Ok(());
        };
        let doc: toml::Value = toml::from_str(&content)?;
        if let Some(packages) = doc.get("packages").and_then(|p| p.as_table()) {
            for (name, value) in packages {
                let spec = table_value_spec(value);
                claims.push(manifest_claim(name, spec.as_deref(), "Pipfile"));
            }
        }
        Ok(())
    }
}

/// pip requirement specifier for a resolved entry
fn requirement_spec(entry: &ResolvedEntry) -> String {
    match &entry.version {
        ResolvedVersion::Version(v) => format!("=={}", v),
        ResolvedVersion::Range(VersionConstraint::Range(r)) => r
            .comparators()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(","),
        ResolvedVersion::Range(VersionConstraint::Exact(v)) => format!("=={}", v),
        ResolvedVersion::Range(VersionConstraint::Any) | ResolvedVersion::Latest => String::new(),
    }
}

impl EcosystemSupport for PythonSupport {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::PythonPip
    }

    fn scan(&self, project_root: &Path) -> Result<Vec<DependencyClaim>> {
        let mut claims = Vec::new();
        self.scan_requirements(project_root, &mut claims)?;
        self.scan_pyproject(project_root, &mut claims)?;
        self.scan_pipfile(project_root, &mut claims)?;
        Ok(claims)
    }

    fn render_manifest(&self, entries: &[&ResolvedEntry]) -> Vec<ManifestFile> {
        let mut out = String::from("# Generated by envforge\n");
        for entry in entries {
            out.push_str(entry.identity.name());
            out.push_str(&requirement_spec(entry));
            if entry.tentative {
                out.push_str("  # tentative: low-confidence inference");
            }
            out.push('\n');
        }
        vec![ManifestFile::new("requirements.txt", out)]
    }

    fn install_steps(&self, _entries: &[&ResolvedEntry], paths: &SandboxPaths) -> Vec<InstallStep> {
        let venv = paths.work.join("venv");
        let pip = venv.join("bin").join("pip");
        vec![
            InstallStep::new("python3")
                .args(["-m", "venv"])
                .arg(venv.to_string_lossy()),
            InstallStep::new(pip.to_string_lossy())
                .args([
                    "install",
                    "--no-cache-dir",
                    "--disable-pip-version-check",
                    "--no-input",
                    "-r",
                    "requirements.txt",
                ])
                .env("PIP_NO_INPUT", "1"),
        ]
    }

    fn audit_steps(&self, _entries: &[&ResolvedEntry], paths: &SandboxPaths) -> Vec<InstallStep> {
        // pip-audit inspects the interpreter named here instead of its own
        let python = paths.work.join("venv").join("bin").join("python");
        vec![
            InstallStep::new("pip-audit")
                .args(["--progress-spinner", "off", "--cache-dir"])
                .arg(paths.cache.join("pip-audit").to_string_lossy())
                .env("PIPAPI_PYTHON_LOCATION", python.to_string_lossy()),
        ]
    }

    fn attribute_failures(&self, log: &str, entries: &[&ResolvedEntry]) -> BTreeSet<PackageIdentity> {
        attribute_with_patterns(
            Ecosystem::PythonPip,
            &[
                &NO_DISTRIBUTION_RE,
                &NO_VERSION_RE,
                &BUT_YOU_HAVE_RE,
                &USER_REQUESTED_RE,
                &BUILD_FAILED_RE,
            ],
            log,
            entries,
        )
    }

    fn container_stage(&self, manifests: &[ManifestFile]) -> ContainerStage {
        manifests
            .iter()
            .fold(ContainerStage::new("python:3.12-slim"), |stage, m| stage.copy(&m.file_name()))
            .run("pip install --no-cache-dir --prefix=/install -r requirements.txt")
            .artifact("/install", "/usr/local")
    }

    fn description(&self) -> &'static str {
        "Python packages via pip (requirements.txt, pyproject.toml, Pipfile)"
    }
}
