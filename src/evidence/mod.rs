// src/evidence/mod.rs

//! Evidence sources
//!
//! Each source inspects a project and produces [`DependencyClaim`]s:
//!
//! 1. **Manifest files**: declared dependencies, read by the ecosystem plugin
//! 2. **Import scan**: packages imported by source files
//! 3. **Inference**: packages a model believes are needed alongside the
//!    ones already found
//!
//! Primary sources run concurrently and are joined in registration order.
//! Derived sources (inference) run afterwards and see the primary claims.
//! A failing source never aborts the run: its claims are dropped and a
//! warning is recorded.

mod imports;
mod inference;

pub use imports::{IMPORT_CONFIDENCE, ImportScanner};
pub use inference::{HIDDEN_DEPENDENCY_CONFIDENCE, HiddenDependencyRules, InferenceEvidence, InferenceModel, InferredDependency};

use crate::claim::DependencyClaim;
use crate::ecosystems::EcosystemRegistry;
use crate::error::Result;
use crate::workspace::Project;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// A producer of dependency claims
pub trait EvidenceSource: Send + Sync {
    /// Name used in warnings and logs
    fn name(&self) -> &str;

    /// Whether this source needs the claims of the primary sources
    fn is_derived(&self) -> bool {
        false
    }

    /// Produce claims for a project
    ///
    /// `prior` is empty for primary sources.
    fn scan(&self, project: &Project, prior: &[DependencyClaim]) -> Result<Vec<DependencyClaim>>;
}

/// A source that failed and was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceWarning {
    pub source: String,
    pub project: String,
    pub message: String,
}

/// Claims gathered for one project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evidence {
    pub claims: Vec<DependencyClaim>,
    pub warnings: Vec<EvidenceWarning>,
}

impl Evidence {
    fn absorb(&mut self, source: &str, project: &Project, result: Result<Vec<DependencyClaim>>) {
        match result {
            Ok(claims) => {
                debug!("{}: {} claim(s) from {}", project, claims.len(), source);
                self.claims.extend(claims);
            }
            Err(e) => {
                warn!("Evidence source '{}' failed for {}: {}", source, project, e);
                self.warnings.push(EvidenceWarning {
                    source: source.to_string(),
                    project: project.label(),
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Run every source against a project
pub fn gather(sources: &[Arc<dyn EvidenceSource>], project: &Project) -> Evidence {
    let (derived, primary): (Vec<_>, Vec<_>) = sources.iter().partition(|s| s.is_derived());
    let mut evidence = Evidence::default();

    // Indexed collect keeps registration order
    let results: Vec<Result<Vec<DependencyClaim>>> = primary
        .par_iter()
        .map(|source| source.scan(project, &[]))
        .collect();
    for (source, result) in primary.iter().zip(results) {
        evidence.absorb(source.name(), project, result);
    }

    for source in derived {
        let result = source.scan(project, &evidence.claims);
        evidence.absorb(source.name(), project, result);
    }
    evidence
}

/// Manifest-file evidence, delegated to the ecosystem plugin
pub struct ManifestEvidence {
    registry: Arc<EcosystemRegistry>,
}

impl ManifestEvidence {
    pub fn new(registry: Arc<EcosystemRegistry>) -> Self {
        Self { registry }
    }
}

impl EvidenceSource for ManifestEvidence {
    fn name(&self) -> &str {
        "manifest-file"
    }

    fn scan(&self, project: &Project, _prior: &[DependencyClaim]) -> Result<Vec<DependencyClaim>> {
        self.registry.require(project.ecosystem)?.scan(&project.root)
    }
}

/// The standard source set: manifests, imports, then hidden-dependency rules
pub fn default_sources(registry: Arc<EcosystemRegistry>, max_scan_depth: usize) -> Vec<Arc<dyn EvidenceSource>> {
    vec![
        Arc::new(ManifestEvidence::new(registry)),
        Arc::new(ImportScanner::new(max_scan_depth)),
        Arc::new(InferenceEvidence::new(Arc::new(HiddenDependencyRules))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{PackageIdentity, SourceKind};
    use crate::ecosystem::Ecosystem;
    use crate::error::Error;
    use std::fs;
    use tempfile::TempDir;

    struct Failing;

    impl EvidenceSource for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn scan(&self, _project: &Project, _prior: &[DependencyClaim]) -> Result<Vec<DependencyClaim>> {
            Err(Error::EvidenceFailed {
                source_name: "failing".to_string(),
                reason: "boom".to_string(),
            })
        }
    }

    struct Fixed(&'static str);

    impl EvidenceSource for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn scan(&self, _project: &Project, _prior: &[DependencyClaim]) -> Result<Vec<DependencyClaim>> {
            Ok(vec![DependencyClaim::new(
                PackageIdentity::new(Ecosystem::PythonPip, self.0),
                SourceKind::ImportScan,
                0.8,
                "fixed",
            )])
        }
    }

    #[test]
    fn test_failure_degrades_to_warning() {
        let dir = TempDir::new().unwrap();
        let project = Project::new(dir.path(), "", Ecosystem::PythonPip);
        let sources: Vec<Arc<dyn EvidenceSource>> = vec![Arc::new(Fixed("a")), Arc::new(Failing), Arc::new(Fixed("b"))];

        let evidence = gather(&sources, &project);
        let names: Vec<&str> = evidence.claims.iter().map(|c| c.identity.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(evidence.warnings.len(), 1);
        assert_eq!(evidence.warnings[0].source, "failing");
        assert!(evidence.warnings[0].message.contains("boom"));
    }

    #[test]
    fn test_default_sources_with_hidden_rules() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("requirements.txt"), "numpy>=1.20,<2.0\n").unwrap();
        fs::write(dir.path().join("app.py"), "import numpy as np\nimport os\n").unwrap();
        let project = Project::new(dir.path(), "", Ecosystem::PythonPip);

        let sources = default_sources(Arc::new(EcosystemRegistry::with_builtins()), 8);
        let evidence = gather(&sources, &project);
        assert!(evidence.warnings.is_empty());

        let kinds: Vec<(&str, SourceKind)> = evidence
            .claims
            .iter()
            .map(|c| (c.identity.name(), c.source_kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("numpy", SourceKind::ManifestFile),
                ("numpy", SourceKind::ImportScan),
                ("scipy", SourceKind::AiInference),
                ("matplotlib", SourceKind::AiInference),
            ]
        );
    }
}
