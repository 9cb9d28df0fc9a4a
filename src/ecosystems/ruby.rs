// src/ecosystems/ruby.rs

//! Ruby / bundler support

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
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

static GEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*gem\s+["']([^"']+)["']((?:\s*,\s*["'][^"']*["'])*)"#).expect("valid regex")
});
static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"["']([^"']*)["']"#).expect("valid regex"));

static GEM_NOT_FOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Could not find gem '([^'\s(]+)").expect("valid regex"));
static SPEC_NOT_FOUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Could not find ([A-Za-z0-9_.\-]+?)-\d[\w.]* in").expect("valid regex")
});
static INCOMPATIBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"could not find compatible versions for gem "([^"]+)""#).expect("valid regex")
});
static INSTALL_ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"An error occurred while installing ([A-Za-z0-9_.\-]+) \(").expect("valid regex")
});

/// Ruby gems installed with bundler
pub struct RubySupport;

/// Gem requirement strings for a resolved entry
fn gem_requirements(entry: &ResolvedEntry) -> Vec<String> {
    match &entry.version {
        ResolvedVersion::Version(v) | ResolvedVersion::Range(VersionConstraint::Exact(v)) => vec![v.to_string()],
        ResolvedVersion::Range(VersionConstraint::Range(r)) => r
            .comparators()
            .iter()
            .map(|c| format!("{} {}", c.operator(), c.version()))
            .collect(),
        ResolvedVersion::Range(VersionConstraint::Any) | ResolvedVersion::Latest => Vec::new(),
    }
}

impl EcosystemSupport for RubySupport {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::RubyGems
    }

    fn scan(&self, project_root: &Path) -> Result<Vec<DependencyClaim>> {
        let Some(content) = read_optional(&project_root.join("Gemfile"))? else {
            return Ok(Vec::new());
        };

        let mut claims = Vec::new();
        for line in content.lines() {
            let Some(caps) = GEM_RE.captures(line) else {
                continue;
            };
            let name = &caps[1];
            let requirements: Vec<&str> = caps
                .get(2)
                .map(|m| QUOTED_RE.captures_iter(m.as_str()).filter_map(|c| c.get(1)).map(|g| g.as_str()).collect())
                .unwrap_or_default();

            let claim = DependencyClaim::new(
                PackageIdentity::new(Ecosystem::RubyGems, name),
                SourceKind::ManifestFile,
                MANIFEST_CONFIDENCE,
                "declared in Gemfile",
            );
            let claim = if requirements.is_empty() {
                claim
            } else {
                match VersionConstraint::parse(&requirements.join(", ")) {
                    Ok(constraint) => claim.with_constraint(constraint),
                    Err(e) => {
                        warn!("Ignoring version of {} in Gemfile: {}", name, e);
                        claim
                    }
                }
            };
            claims.push(claim);
        }
        Ok(claims)
    }

    fn render_manifest(&self, entries: &[&ResolvedEntry]) -> Vec<ManifestFile> {
        let mut out = String::from("# Generated by envforge\nsource \"https://rubygems.org\"\n\n");
        for entry in entries {
            let _ = write!(out, "gem \"{}\"", entry.identity.name());
            for requirement in gem_requirements(entry) {
                let _ = write!(out, ", \"{}\"", requirement);
            }
            if entry.tentative {
                out.push_str(" # tentative: low-confidence inference");
            }
            out.push('\n');
        }
        vec![ManifestFile::new("Gemfile", out)]
    }

    fn install_steps(&self, _entries: &[&ResolvedEntry], paths: &SandboxPaths) -> Vec<InstallStep> {
        vec![
            InstallStep::new("bundle")
                .arg("install")
                .env("BUNDLE_GEMFILE", paths.work.join("Gemfile").to_string_lossy())
                .env("BUNDLE_PATH", paths.cache.join("bundle").to_string_lossy())
                .env("BUNDLE_APP_CONFIG", paths.work.join(".bundle").to_string_lossy())
                .env("GEM_HOME", paths.cache.join("gems").to_string_lossy()),
        ]
    }

    fn audit_steps(&self, _entries: &[&ResolvedEntry], paths: &SandboxPaths) -> Vec<InstallStep> {
        vec![
            InstallStep::new("bundle-audit")
                .args(["check", "--update"])
                .env("BUNDLE_GEMFILE", paths.work.join("Gemfile").to_string_lossy())
                .env("GEM_HOME", paths.cache.join("gems").to_string_lossy()),
        ]
    }

    fn attribute_failures(&self, log: &str, entries: &[&ResolvedEntry]) -> BTreeSet<PackageIdentity> {
        attribute_with_patterns(
            Ecosystem::RubyGems,
            &[&GEM_NOT_FOUND_RE, &SPEC_NOT_FOUND_RE, &INCOMPATIBLE_RE, &INSTALL_ERROR_RE],
            log,
            entries,
        )
    }

    fn container_stage(&self, manifests: &[ManifestFile]) -> ContainerStage {
        manifests
            .iter()
            .fold(ContainerStage::new("ruby:3.3-slim"), |stage, m| stage.copy(&m.file_name()))
            .env("BUNDLE_PATH", "/deps/bundle")
            .run("bundle install")
            .artifact("/deps/bundle", "/deps/bundle")
    }

    fn description(&self) -> &'static str {
        "Ruby gems via bundler (Gemfile)"
    }
}
