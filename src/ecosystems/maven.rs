// src/ecosystems/maven.rs

//! Java / Maven support
//!
//! Package names are `groupId:artifactId`. Maven's own range syntax
//! (`[1.0,2.0)`) is translated to and from the common constraint model.

use super::{EcosystemSupport, MANIFEST_CONFIDENCE, attribute_with_patterns, read_optional};
use crate::claim::{DependencyClaim, PackageIdentity, SourceKind};
use crate::dockerfile::ContainerStage;
use crate::ecosystem::Ecosystem;
use crate::error::{Error, Result};
use crate::manifest::ManifestFile;
use crate::resolver::{ResolvedEntry, ResolvedVersion};
use crate::sandbox::{InstallStep, SandboxPaths};
use crate::version::{PackageVersion, VersionConstraint, VersionRange};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

static DEPENDENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<dependency>(.*?)</dependency>").expect("valid regex"));
static DEPENDENCY_MANAGEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<dependencyManagement>.*?</dependencyManagement>").expect("valid regex")
});

static MISSING_ARTIFACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Could not find artifact|Failure to find|could not be resolved:) ([\w.\-]+:[\w.\-]+):")
        .expect("valid regex")
});
static UNRESOLVABLE_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Could not resolve version range for ([\w.\-]+:[\w.\-]+):").expect("valid regex")
});

/// Java artifacts resolved by Maven
pub struct MavenSupport;

fn xml_field<'a>(block: &'a str, field: &str) -> Option<&'a str> {
    let open = format!("<{}>", field);
    let close = format!("</{}>", field);
    let start = block.find(&open)? + open.len();
    let end = block[start..].find(&close)? + start;
    Some(block[start..end].trim())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Parse a Maven version or single version range
///
/// - `1.2.3` → exact
/// - `[1.0,2.0)` → >=1.0, <2.0
/// - `[1.5]` → exact
/// - `(,1.0]` → <=1.0
pub fn parse_maven_version(spec: &str) -> Result<VersionConstraint> {
    let spec = spec.trim();
    let invalid = |reason: &str| Error::InvalidConstraint {
        input: spec.to_string(),
        reason: reason.to_string(),
    };

    let Some(open) = spec.chars().next().filter(|c| *c == '[' || *c == '(') else {
        return Ok(VersionConstraint::Exact(PackageVersion::parse(spec)?));
    };
    let close = spec.chars().last().filter(|c| *c == ']' || *c == ')')
        .ok_or_else(|| invalid("unterminated range"))?;
    let inner = &spec[1..spec.len() - 1];
    if inner.contains(['[', '(', ']', ')']) {
        return Err(invalid("multiple range sets are not supported"));
    }

    let Some((low, high)) = inner.split_once(',') else {
        return Ok(VersionConstraint::Exact(PackageVersion::parse(inner)?));
    };

    let mut range = VersionRange::any();
    if !low.trim().is_empty() {
        let v = PackageVersion::parse(low)?;
        range = range.intersect(&if open == '[' {
            VersionRange::at_least(v)
        } else {
            VersionRange::greater_than(v)
        });
    }
    if !high.trim().is_empty() {
        let v = PackageVersion::parse(high)?;
        range = range.intersect(&if close == ']' {
            VersionRange::at_most(v)
        } else {
            VersionRange::less_than(v)
        });
    }
    Ok(VersionConstraint::from_range(range))
}

/// Maven version element for a resolved entry
fn maven_spec(entry: &ResolvedEntry) -> String {
    let range_spec = |r: &VersionRange| {
        let low = r.lower().map(|b| (if b.inclusive { "[" } else { "(" }, b.version.to_string()));
        let high = r.upper().map(|b| (if b.inclusive { "]" } else { ")" }, b.version.to_string()));
        let (open, low) = low.unwrap_or(("(", String::new()));
        let (close, high) = high.unwrap_or((")", String::new()));
        format!("{}{},{}{}", open, low, high, close)
    };
    match &entry.version {
        ResolvedVersion::Version(v) => v.to_string(),
        ResolvedVersion::Range(VersionConstraint::Exact(v)) => format!("[{}]", v),
        ResolvedVersion::Range(VersionConstraint::Range(r)) => range_spec(r),
        ResolvedVersion::Range(VersionConstraint::Any) | ResolvedVersion::Latest => "[0,)".to_string(),
    }
}

impl EcosystemSupport for MavenSupport {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::JavaMaven
    }

    fn scan(&self, project_root: &Path) -> Result<Vec<DependencyClaim>> {
        let Some(content) = read_optional(&project_root.join("pom.xml"))? else {
            return Ok(Vec::new());
        };
        // Managed versions are defaults, not dependencies
        let content = DEPENDENCY_MANAGEMENT_RE.replace_all(&content, "");

        let mut claims = Vec::new();
        for caps in DEPENDENCY_RE.captures_iter(&content) {
            let block = &caps[1];
            let (Some(group), Some(artifact)) = (xml_field(block, "groupId"), xml_field(block, "artifactId")) else {
                continue;
            };
            if matches!(xml_field(block, "scope"), Some("test") | Some("provided")) {
                continue;
            }

            let name = format!("{}:{}", group, artifact);
            let claim = DependencyClaim::new(
                PackageIdentity::new(Ecosystem::JavaMaven, &name),
                SourceKind::ManifestFile,
                MANIFEST_CONFIDENCE,
                "declared in pom.xml",
            );
            let claim = match xml_field(block, "version") {
                // Property references resolve through the POM model
                Some(v) if v.contains("${") => claim,
                Some(v) => match parse_maven_version(v) {
                    Ok(constraint) => claim.with_constraint(constraint),
                    Err(e) => {
                        warn!("Ignoring version of {} in pom.xml: {}", name, e);
                        claim
                    }
                },
                None => claim,
            };
            claims.push(claim);
        }
        Ok(claims)
    }

    fn render_manifest(&self, entries: &[&ResolvedEntry]) -> Vec<ManifestFile> {
        let mut out = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!-- Generated by envforge -->\n\
             <project xmlns=\"http://maven.apache.org/POM/4.0.0\">\n  \
             <modelVersion>4.0.0</modelVersion>\n  \
             <groupId>envforge</groupId>\n  \
             <artifactId>envforge-environment</artifactId>\n  \
             <version>0.0.0</version>\n  \
             <packaging>pom</packaging>\n  \
             <dependencies>\n",
        );
        for entry in entries {
            let Some((group, artifact)) = entry.identity.name().split_once(':') else {
                let _ = writeln!(out, "    <!-- {}: no groupId -->", xml_escape(entry.identity.name()));
                continue;
            };
            let _ = writeln!(out, "    <dependency>");
            let _ = writeln!(out, "      <groupId>{}</groupId>", xml_escape(group));
            let _ = writeln!(out, "      <artifactId>{}</artifactId>", xml_escape(artifact));
            let _ = writeln!(out, "      <version>{}</version>", xml_escape(&maven_spec(entry)));
            let _ = writeln!(out, "    </dependency>");
        }
        out.push_str("  </dependencies>\n</project>\n");
        vec![ManifestFile::new("pom.xml", out)]
    }

    fn install_steps(&self, _entries: &[&ResolvedEntry], paths: &SandboxPaths) -> Vec<InstallStep> {
        vec![
            InstallStep::new("mvn")
                .args(["-B", "-q"])
                .arg(format!("-Dmaven.repo.local={}", paths.cache.join("m2").display()))
                .arg("dependency:resolve"),
        ]
    }

    fn attribute_failures(&self, log: &str, entries: &[&ResolvedEntry]) -> BTreeSet<PackageIdentity> {
        attribute_with_patterns(
            Ecosystem::JavaMaven,
            &[&MISSING_ARTIFACT_RE, &UNRESOLVABLE_RANGE_RE],
            log,
            entries,
        )
    }

    fn container_stage(&self, manifests: &[ManifestFile]) -> ContainerStage {
        manifests
            .iter()
            .fold(ContainerStage::new("maven:3.9-eclipse-temurin-21"), |stage, m| stage.copy(&m.file_name()))
            .run("mvn -B -q -Dmaven.repo.local=/deps/m2 dependency:resolve")
            .artifact("/deps/m2", "/root/.m2/repository")
    }

    fn description(&self) -> &'static str {
        "Java artifacts via Maven (pom.xml)"
    }
}
