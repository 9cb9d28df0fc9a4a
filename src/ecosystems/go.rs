// src/ecosystems/go.rs

//! Go modules support
//!
//! `go.mod` can only hold concrete versions, so entries without one are
//! fetched with a `go get` version query before `go mod download`.

use super::{EcosystemSupport, MANIFEST_CONFIDENCE, attribute_with_patterns, read_optional};
use crate::claim::{DependencyClaim, PackageIdentity, SourceKind};
use crate::dockerfile::ContainerStage;
use crate::ecosystem::Ecosystem;
use crate::error::Result;
use crate::manifest::ManifestFile;
use crate::resolver::{ResolvedEntry, ResolvedVersion};
use crate::sandbox::{InstallStep, SandboxPaths};
use crate::version::{PackageVersion, VersionConstraint};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

static MODULE_VERSION_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"go: ([^\s@]+)@\S+: ").expect("valid regex"));
static MODULE_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"go: module ([^\s@:]+)(?:@\S+)?: ").expect("valid regex"));

/// Module path of the generated go.mod
const SANDBOX_MODULE: &str = "envforge.local/environment";

/// Go modules
pub struct GoSupport;

/// Go insists on the `v` prefix
fn go_version(v: &PackageVersion) -> String {
    let raw = v.as_str();
    if raw.starts_with('v') {
        raw.to_string()
    } else {
        format!("v{}", raw)
    }
}

/// `go get` version query for an entry go.mod cannot express
fn version_query(entry: &ResolvedEntry) -> Option<String> {
    match &entry.version {
        ResolvedVersion::Version(_) => None,
        ResolvedVersion::Range(VersionConstraint::Exact(v)) => Some(go_version(v)),
        ResolvedVersion::Range(VersionConstraint::Range(r)) => {
            // Queries take one comparator; the upper bound keeps us off the
            // version that failed
            if let Some(upper) = r.upper() {
                let op = if upper.inclusive { "<=" } else { "<" };
                Some(format!("{}{}", op, go_version(&upper.version)))
            } else if let Some(lower) = r.lower() {
                let op = if lower.inclusive { ">=" } else { ">" };
                Some(format!("{}{}", op, go_version(&lower.version)))
            } else {
                Some("latest".to_string())
            }
        }
        ResolvedVersion::Range(VersionConstraint::Any) | ResolvedVersion::Latest => Some("latest".to_string()),
    }
}

/// `require` entries of a go.mod file as (module, version, indirect)
pub fn parse_go_mod(content: &str) -> Vec<(String, String, bool)> {
    let mut requires = Vec::new();
    let mut in_block = false;

    for raw in content.lines() {
        let (line, comment) = match raw.find("//") {
            Some(pos) => (&raw[..pos], &raw[pos..]),
            None => (raw, ""),
        };
        let line = line.trim();
        let indirect = comment.contains("indirect");

        if in_block {
            if line == ")" {
                in_block = false;
                continue;
            }
        } else if line == "require (" || line == "require(" {
            in_block = true;
            continue;
        }

        let spec = if in_block {
            line
        } else if let Some(rest) = line.strip_prefix("require ") {
            rest.trim()
        } else {
            continue;
        };

        let mut parts = spec.split_whitespace();
        if let (Some(module), Some(version)) = (parts.next(), parts.next()) {
            requires.push((module.to_string(), version.to_string(), indirect));
        }
    }
    requires
}

impl EcosystemSupport for GoSupport {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::GoModules
    }

    fn scan(&self, project_root: &Path) -> Result<Vec<DependencyClaim>> {
        let Some(content) = read_optional(&project_root.join("go.mod"))? else {
            return Ok(Vec::new());
        };

        let mut claims = Vec::new();
        for (module, version, indirect) in parse_go_mod(&content) {
            let rationale = if indirect {
                "required in go.mod (indirect)"
            } else {
                "required in go.mod"
            };
            let claim = DependencyClaim::new(
                PackageIdentity::new(Ecosystem::GoModules, &module),
                SourceKind::ManifestFile,
                MANIFEST_CONFIDENCE,
                rationale,
            );
            let claim = match PackageVersion::parse(&version) {
                Ok(v) => claim.with_constraint(VersionConstraint::Exact(v)),
                Err(e) => {
                    warn!("Ignoring version of {} in go.mod: {}", module, e);
                    claim
                }
            };
            claims.push(claim);
        }
        Ok(claims)
    }

    fn render_manifest(&self, entries: &[&ResolvedEntry]) -> Vec<ManifestFile> {
        let mut out = format!("// Generated by envforge\nmodule {}\n\ngo 1.21\n", SANDBOX_MODULE);
        let concrete: Vec<(&ResolvedEntry, &PackageVersion)> = entries
            .iter()
            .filter_map(|e| e.version.version().map(|v| (*e, v)))
            .collect();

        if !concrete.is_empty() {
            out.push_str("\nrequire (\n");
            for (entry, version) in &concrete {
                let _ = writeln!(out, "\t{} {}", entry.identity.name(), go_version(version));
            }
            out.push_str(")\n");
        }
        for entry in entries {
            if let Some(query) = version_query(entry) {
                let _ = writeln!(out, "// {}@{} (resolved by go get)", entry.identity.name(), query);
            }
        }
        vec![ManifestFile::new("go.mod", out)]
    }

    fn install_steps(&self, entries: &[&ResolvedEntry], paths: &SandboxPaths) -> Vec<InstallStep> {
        let env = |step: InstallStep| {
            step.env("GOMODCACHE", paths.cache.join("gomod").to_string_lossy())
                .env("GOPATH", paths.cache.join("gopath").to_string_lossy())
                .env("GOCACHE", paths.cache.join("gobuild").to_string_lossy())
                .env("GOFLAGS", "-mod=mod")
                .env("GOTOOLCHAIN", "local")
        };

        let queries: Vec<String> = entries
            .iter()
            .filter_map(|e| version_query(e).map(|q| format!("{}@{}", e.identity.name(), q)))
            .collect();

        let mut steps = Vec::new();
        if !queries.is_empty() {
            steps.push(env(InstallStep::new("go").arg("get").args(queries)));
        }
        steps.push(env(InstallStep::new("go").args(["mod", "download"])));
        steps
    }

    fn attribute_failures(&self, log: &str, entries: &[&ResolvedEntry]) -> BTreeSet<PackageIdentity> {
        attribute_with_patterns(
            Ecosystem::GoModules,
            &[&MODULE_VERSION_ERROR_RE, &MODULE_ERROR_RE],
            log,
            entries,
        )
    }

    fn container_stage(&self, manifests: &[ManifestFile]) -> ContainerStage {
        manifests
            .iter()
            .fold(ContainerStage::new("golang:1.22"), |stage, m| stage.copy(&m.file_name()))
            .env("GOMODCACHE", "/deps/gomod")
            .run("go mod download")
            .artifact("/deps/gomod", "/deps/gomod")
    }

    fn description(&self) -> &'static str {
        "Go modules (go.mod)"
    }
}
