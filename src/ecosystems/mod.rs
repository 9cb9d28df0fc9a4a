// src/ecosystems/mod.rs

//! Per-ecosystem support plugins
//!
//! Everything that depends on an ecosystem's file formats and tools sits
//! behind [`EcosystemSupport`]: reading declared dependencies from manifest
//! files, rendering a resolved assignment back into those files, the
//! installer commands used to validate it, and attributing installer
//! failures to packages. Implementations are registered statically and
//! selected by [`Ecosystem`].

mod go;
mod maven;
mod node;
mod python;
mod ruby;

pub use go::GoSupport;
pub use maven::MavenSupport;
pub use node::NodeSupport;
pub use python::PythonSupport;
pub use ruby::RubySupport;

use crate::claim::{DependencyClaim, PackageIdentity};
use crate::dockerfile::ContainerStage;
use crate::ecosystem::Ecosystem;
use crate::error::{Error, Result};
use crate::manifest::ManifestFile;
use crate::resolver::ResolvedEntry;
use crate::sandbox::{InstallStep, SandboxPaths};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, LazyLock};

/// Confidence of a dependency declared in a manifest file
pub const MANIFEST_CONFIDENCE: f64 = 1.0;

/// Ecosystem-specific behavior used by evidence gathering, validation and
/// output rendering
pub trait EcosystemSupport: Send + Sync {
    /// The ecosystem this plugin handles
    fn ecosystem(&self) -> Ecosystem;

    /// Read dependencies declared in the project's manifest files
    ///
    /// A project without manifests yields no claims, not an error.
    fn scan(&self, project_root: &Path) -> Result<Vec<DependencyClaim>>;

    /// Render entries of this ecosystem into manifest files
    fn render_manifest(&self, entries: &[&ResolvedEntry]) -> Vec<ManifestFile>;

    /// Installer commands that validate the rendered manifests
    fn install_steps(&self, entries: &[&ResolvedEntry], paths: &SandboxPaths) -> Vec<InstallStep>;

    /// Vulnerability audit of a passing install; empty when the ecosystem
    /// has no audit tool
    fn audit_steps(&self, _entries: &[&ResolvedEntry], _paths: &SandboxPaths) -> Vec<InstallStep> {
        Vec::new()
    }

    /// Findings reported in the audit part of the log
    fn audit_findings(&self, log: &str) -> Vec<String> {
        findings_by_marker(log)
    }

    /// Packages an installer log blames
    ///
    /// Best effort; an empty set means the failure could not be pinned on
    /// any package.
    fn attribute_failures(&self, log: &str, entries: &[&ResolvedEntry]) -> BTreeSet<PackageIdentity> {
        attribute_by_mention(log, entries)
    }

    /// Container build stage installing the rendered manifests
    fn container_stage(&self, manifests: &[ManifestFile]) -> ContainerStage;

    /// Short description for `--help` style listings
    fn description(&self) -> &'static str;
}

/// Registry of ecosystem plugins
pub struct EcosystemRegistry {
    plugins: HashMap<Ecosystem, Arc<dyn EcosystemSupport>>,
}

impl EcosystemRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Create a registry with all built-in ecosystems
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PythonSupport));
        registry.register(Arc::new(NodeSupport));
        registry.register(Arc::new(MavenSupport));
        registry.register(Arc::new(GoSupport));
        registry.register(Arc::new(RubySupport));
        registry
    }

    /// Register a plugin, replacing any previous one for its ecosystem
    pub fn register(&mut self, plugin: Arc<dyn EcosystemSupport>) {
        self.plugins.insert(plugin.ecosystem(), plugin);
    }

    /// Get the plugin for an ecosystem
    pub fn get(&self, ecosystem: Ecosystem) -> Option<&Arc<dyn EcosystemSupport>> {
        self.plugins.get(&ecosystem)
    }

    /// Get the plugin for an ecosystem or fail
    pub fn require(&self, ecosystem: Ecosystem) -> Result<&Arc<dyn EcosystemSupport>> {
        self.get(ecosystem)
            .ok_or_else(|| Error::UnsupportedEcosystem(ecosystem.to_string()))
    }

    /// Check if an ecosystem has a plugin
    pub fn has(&self, ecosystem: Ecosystem) -> bool {
        self.plugins.contains_key(&ecosystem)
    }

    /// Registered ecosystems in a stable order
    pub fn ecosystems(&self) -> Vec<Ecosystem> {
        let mut all: Vec<Ecosystem> = self.plugins.keys().copied().collect();
        all.sort();
        all
    }
}

impl Default for EcosystemRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

static ADVISORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:CVE-\d{4}-\d+|GHSA(?:-[0-9a-z]{4}){3}|PYSEC-\d{4}-\d+|vulnerabilit(?:y|ies))\b")
        .expect("valid regex")
});
static NO_FINDINGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:found 0 vulnerabilities|no (?:known )?vulnerabilities found)\b").expect("valid regex")
});

/// Audit findings kept per ecosystem
const MAX_FINDINGS: usize = 50;

/// Fallback audit parsing: lines naming an advisory or a vulnerability
///
/// Audit tools exit non-zero when they find something, so the log is the
/// only reliable signal. "No vulnerabilities found" lines are skipped.
pub fn findings_by_marker(log: &str) -> Vec<String> {
    let mut findings: Vec<String> = Vec::new();
    for line in log.lines().map(str::trim) {
        if line.starts_with("$ ") || !ADVISORY_RE.is_match(line) || NO_FINDINGS_RE.is_match(line) {
            continue;
        }
        if !findings.iter().any(|f| f == line) {
            findings.push(line.to_string());
        }
        if findings.len() == MAX_FINDINGS {
            break;
        }
    }
    findings
}

const ERROR_MARKERS: &[&str] = &[
    "error",
    "failed",
    "failure",
    "could not",
    "cannot",
    "not found",
    "no matching",
    "conflict",
    "unable",
    "incompatible",
];

/// Fallback attribution: packages named on an error line of the log
pub fn attribute_by_mention(log: &str, entries: &[&ResolvedEntry]) -> BTreeSet<PackageIdentity> {
    let error_lines: Vec<String> = log
        .lines()
        .map(str::to_lowercase)
        .filter(|line| ERROR_MARKERS.iter().any(|m| line.contains(m)))
        .collect();

    entries
        .iter()
        .filter(|entry| {
            let name = entry.identity.name().to_lowercase();
            error_lines.iter().any(|line| mentions_token(line, &name))
        })
        .map(|entry| entry.identity.clone())
        .collect()
}

/// Whether `name` occurs in `line` as a whole token
fn mentions_token(line: &str, name: &str) -> bool {
    let is_name_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '@' | ':');
    line.match_indices(name).any(|(start, matched)| {
        let before = line[..start].chars().next_back();
        let after = line[start + matched.len()..].chars().next();
        !before.is_some_and(is_name_char)
            // A trailing '.' ends a sentence more often than a name
            && !after.is_some_and(|c| is_name_char(c) && c != '.' && c != ':')
    })
}

/// Attribute by ecosystem-specific patterns, falling back to mentions
///
/// Each pattern's first capture group is a package name; names are
/// normalized and kept only when they belong to the assignment.
pub(crate) fn attribute_with_patterns(
    ecosystem: Ecosystem,
    patterns: &[&Regex],
    log: &str,
    entries: &[&ResolvedEntry],
) -> BTreeSet<PackageIdentity> {
    let known: BTreeSet<&PackageIdentity> = entries.iter().map(|e| &e.identity).collect();
    let found: BTreeSet<PackageIdentity> = patterns
        .iter()
        .flat_map(|re| re.captures_iter(log))
        .filter_map(|caps| caps.get(1))
        .map(|m| PackageIdentity::new(ecosystem, m.as_str().trim_end_matches('.')))
        .filter(|id| known.contains(id))
        .collect();

    if found.is_empty() {
        attribute_by_mention(log, entries)
    } else {
        found
    }
}

/// Read a manifest file if it exists
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
