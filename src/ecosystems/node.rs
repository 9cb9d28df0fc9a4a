// src/ecosystems/node.rs

//! JavaScript / npm support

use super::{EcosystemSupport, MANIFEST_CONFIDENCE, attribute_with_patterns, read_optional};
use crate::claim::{DependencyClaim, PackageIdentity, SourceKind};
use crate::dockerfile::ContainerStage;
use crate::ecosystem::Ecosystem;
use crate::error::{Error, Result};
use crate::manifest::ManifestFile;
use crate::resolver::{ResolvedEntry, ResolvedVersion};
use crate::sandbox::{InstallStep, SandboxPaths};
use crate::version::{Comparator, VersionConstraint};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

static NO_MATCHING_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"No matching version found for (@?[A-Za-z0-9._\-/]+?)@").expect("valid regex")
});
static NOT_FOUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"404 Not Found - GET https?://[^/\s]+/(@?[A-Za-z0-9._\-]+(?:/[A-Za-z0-9._\-]+)?)").expect("valid regex")
});
static NOT_IN_REGISTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'(@?[A-Za-z0-9._\-/]+?)@[^']*' is not in (?:the npm|this) registry").expect("valid regex")
});
static PEER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"peer (@?[A-Za-z0-9._\-/]+?)@""#).expect("valid regex"));

/// Dependency sections read from package.json, in claim order
const DEPENDENCY_SECTIONS: &[&str] = &["dependencies", "devDependencies"];

/// JavaScript/TypeScript packages installed with npm
pub struct NodeSupport;

/// Specifiers that name a source rather than a version range
fn is_non_registry_spec(spec: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "file:", "link:", "workspace:", "npm:", "git:", "git+", "github:", "http:", "https:",
    ];
    PREFIXES.iter().any(|p| spec.starts_with(p)) || (spec.contains('/') && !spec.starts_with('@'))
}

fn manifest_claim(name: &str, spec: &str, section: &str) -> DependencyClaim {
    let identity = PackageIdentity::new(Ecosystem::NodeNpm, name);
    let claim = DependencyClaim::new(
        identity,
        SourceKind::ManifestFile,
        MANIFEST_CONFIDENCE,
        format!("declared in package.json {}", section),
    );
    if is_non_registry_spec(spec) {
        return claim;
    }
    match VersionConstraint::parse(spec) {
        Ok(constraint) => claim.with_constraint(constraint),
        Err(e) => {
            warn!("Ignoring version of {} in package.json: {}", name, e);
            claim
        }
    }
}

/// npm range syntax for a resolved entry
///
/// npm has no `!=`; exclusions are dropped from deferred ranges.
fn npm_spec(entry: &ResolvedEntry) -> String {
    match &entry.version {
        ResolvedVersion::Version(v) => v.to_string(),
        ResolvedVersion::Range(VersionConstraint::Exact(v)) => v.to_string(),
        ResolvedVersion::Range(VersionConstraint::Range(r)) => r
            .comparators()
            .iter()
            .filter(|c| !matches!(c, Comparator::Ne(_)))
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" "),
        ResolvedVersion::Range(VersionConstraint::Any) | ResolvedVersion::Latest => "latest".to_string(),
    }
}

impl EcosystemSupport for NodeSupport {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::NodeNpm
    }

    fn scan(&self, project_root: &Path) -> Result<Vec<DependencyClaim>> {
        let Some(content) = read_optional(&project_root.join("package.json"))? else {
            return Ok(Vec::new());
        };
        let doc: Value = serde_json::from_str(&content)
            .map_err(|e| Error::ParseError(format!("package.json: {}", e)))?;

        let mut claims = Vec::new();
        for section in DEPENDENCY_SECTIONS {
            if let Some(deps) = doc.get(*section).and_then(Value::as_object) {
                for (name, spec) in deps {
                    claims.push(manifest_claim(name, spec.as_str().unwrap_or("*"), section));
                }
            }
        }
        Ok(claims)
    }

    fn render_manifest(&self, entries: &[&ResolvedEntry]) -> Vec<ManifestFile> {
        let dependencies: Map<String, Value> = entries
            .iter()
            .map(|e| (e.identity.name().to_string(), Value::String(npm_spec(e))))
            .collect();
        let doc = json!({
            "name": "envforge-environment",
            "version": "0.0.0",
            "private": true,
            "dependencies": dependencies,
        });
        let mut contents = serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{}".to_string());
        contents.push('\n');
        vec![ManifestFile::new("package.json", contents)]
    }

    fn install_steps(&self, _entries: &[&ResolvedEntry], paths: &SandboxPaths) -> Vec<InstallStep> {
        vec![
            InstallStep::new("npm")
                .args(["install", "--no-audit", "--no-fund", "--ignore-scripts", "--cache"])
                .arg(paths.cache.join("npm").to_string_lossy())
                .env("npm_config_update_notifier", "false"),
        ]
    }

    fn audit_steps(&self, _entries: &[&ResolvedEntry], paths: &SandboxPaths) -> Vec<InstallStep> {
        vec![
            InstallStep::new("npm")
                .args(["audit", "--omit=dev", "--cache"])
                .arg(paths.cache.join("npm").to_string_lossy())
                .env("npm_config_update_notifier", "false"),
        ]
    }

    fn attribute_failures(&self, log: &str, entries: &[&ResolvedEntry]) -> BTreeSet<PackageIdentity> {
        // Scoped names appear URL-encoded in registry errors
        let log = log.replace("%2f", "/").replace("%2F", "/");
        attribute_with_patterns(
            Ecosystem::NodeNpm,
            &[&NO_MATCHING_VERSION_RE, &NOT_FOUND_RE, &NOT_IN_REGISTRY_RE, &PEER_RE],
            &log,
            entries,
        )
    }

    fn container_stage(&self, manifests: &[ManifestFile]) -> ContainerStage {
        manifests
            .iter()
            .fold(ContainerStage::new("node:20-slim"), |stage, m| stage.copy(&m.file_name()))
            .run("npm install --omit=dev --no-audit --no-fund")
            .artifact("node_modules", "node_modules")
    }

    fn description(&self) -> &'static str {
        "JavaScript/TypeScript packages via npm (package.json)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecosystems::test_support::entry;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_package_json() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{
                "name": "demo",
                "dependencies": {"react": "^18.2.0", "Lodash": "4.17.21", "local": "file:../local"},
                "devDependencies": {"jest": "~29.7", "both": "^1.0 || ^2.0"}
            }"#,
        )
        .unwrap();

        let claims = NodeSupport.scan(dir.path()).unwrap();
        let names: Vec<&str> = claims.iter().map(|c| c.identity.name()).collect();
        assert_eq!(names, vec!["lodash", "local", "react", "both", "jest"]);
        assert_eq!(claims[0].version_constraint.as_ref().unwrap().to_string(), "==4.17.21");
        assert!(!claims[1].is_constrained());
        assert_eq!(claims[2].version_constraint.as_ref().unwrap().to_string(), ">=18.2.0, <19.0.0");
        assert!(!claims[3].is_constrained());
        assert!(claims[4].rationale.contains("devDependencies"));
    }

    #[test]
    fn test_scan_invalid_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{ nope").unwrap();
        assert!(matches!(NodeSupport.scan(dir.path()), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_render_package_json() {
        let a = entry(Ecosystem::NodeNpm, "react", "18.2.0");
        let b = entry(Ecosystem::NodeNpm, "express", ">=4.0.0, <5.0.0");
        let c = entry(Ecosystem::NodeNpm, "react-dom", "latest");
        let files = NodeSupport.render_manifest(&[&a, &b, &c]);
        let doc: Value = serde_json::from_str(&files[0].contents).unwrap();
        assert_eq!(doc["dependencies"]["react"], "18.2.0");
        assert_eq!(doc["dependencies"]["express"], ">=4.0.0 <5.0.0");
        assert_eq!(doc["dependencies"]["react-dom"], "latest");
        assert_eq!(doc["private"], true);
    }

    #[test]
    fn test_attribute_npm_errors() {
        let a = entry(Ecosystem::NodeNpm, "react", "99.0.0");
        let b = entry(Ecosystem::NodeNpm, "@types/node", "20.0.0");
        let c = entry(Ecosystem::NodeNpm, "express", "4.18.2");
        let entries = vec![&a, &b, &c];

        let log = "npm ERR! code ETARGET\nnpm ERR! notarget No matching version found for react@99.0.0.\n";
        assert_eq!(
            NodeSupport.attribute_failures(log, &entries).into_iter().collect::<Vec<_>>(),
            vec![a.identity.clone()]
        );

        let log = "npm ERR! 404 Not Found - GET https://registry.npmjs.org/@types%2fnode - Not found\n";
        assert!(NodeSupport.attribute_failures(log, &entries).contains(&b.identity));
    }

    #[test]
    fn test_npm_audit_findings() {
        let log = "# npm audit report\n\n\
                   lodash  <4.17.21\n\
                   Severity: critical\n\
                   Prototype Pollution in lodash - https://github.com/advisories/GHSA-jf85-cpcp-j695\n\
                   fix available via `npm audit fix`\n\n\
                   1 critical severity vulnerability\n";
        let findings = NodeSupport.audit_findings(log);
        assert_eq!(findings.len(), 2);
        assert!(findings[0].contains("GHSA-jf85-cpcp-j695"));
        assert_eq!(findings[1], "1 critical severity vulnerability");
        assert!(NodeSupport.audit_findings("found 0 vulnerabilities\n").is_empty());
    }
}
