// src/evidence/inference.rs

//! Inferred dependencies
//!
//! An [`InferenceModel`] suggests packages a project probably needs but
//! never names, each with a confidence and a rationale. The model is a
//! capability: anything from a lookup table to a remote service can sit
//! behind the trait. The built-in [`HiddenDependencyRules`] is a fixed
//! table of packages commonly required alongside others. Its confidence
//! sits below the default threshold, so its suggestions surface as
//! tentative unless other evidence backs them.

use super::EvidenceSource;
use crate::claim::{DependencyClaim, PackageIdentity, SourceKind};
use crate::ecosystem::Ecosystem;
use crate::error::Result;
use crate::workspace::Project;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Confidence of a hidden-dependency rule
pub const HIDDEN_DEPENDENCY_CONFIDENCE: f64 = 0.45;

/// One suggestion from a model
#[derive(Debug, Clone, PartialEq)]
pub struct InferredDependency {
    pub identity: PackageIdentity,
    pub confidence: f64,
    pub rationale: String,
}

/// Suggests packages from what is already known about a project
pub trait InferenceModel: Send + Sync {
    fn name(&self) -> &str;

    /// Suggestions given the claims found so far
    fn suggest(&self, project: &Project, known: &[DependencyClaim]) -> Result<Vec<InferredDependency>>;
}

/// (ecosystem, trigger package, implied packages)
const HIDDEN_RULES: &[(Ecosystem, &str, &[&str])] = &[
    (Ecosystem::PythonPip, "numpy", &["scipy", "matplotlib"]),
    (Ecosystem::PythonPip, "scikit-learn", &["numpy", "scipy"]),
    (Ecosystem::PythonPip, "pandas", &["numpy"]),
    (Ecosystem::PythonPip, "seaborn", &["matplotlib", "pandas"]),
    (Ecosystem::PythonPip, "torchvision", &["torch"]),
    (Ecosystem::NodeNpm, "react", &["react-dom"]),
    (Ecosystem::NodeNpm, "express", &["body-parser"]),
    (Ecosystem::NodeNpm, "styled-components", &["react"]),
    (Ecosystem::RubyGems, "rails", &["puma"]),
];

/// Table of commonly co-required packages
pub struct HiddenDependencyRules;

impl InferenceModel for HiddenDependencyRules {
    fn name(&self) -> &str {
        "hidden-dependency-rules"
    }

    fn suggest(&self, project: &Project, known: &[DependencyClaim]) -> Result<Vec<InferredDependency>> {
        let mut present: BTreeSet<PackageIdentity> = known.iter().map(|c| c.identity.clone()).collect();
        let triggers: Vec<PackageIdentity> = known.iter().map(|c| c.identity.clone()).collect();

        let mut suggestions = Vec::new();
        for trigger in &triggers {
            for (ecosystem, name, implied) in HIDDEN_RULES {
                if *ecosystem != project.ecosystem || PackageIdentity::new(*ecosystem, name) != *trigger {
                    continue;
                }
                for implied_name in *implied {
                    let identity = PackageIdentity::new(*ecosystem, implied_name);
                    if present.insert(identity.clone()) {
                        suggestions.push(InferredDependency {
                            identity,
                            confidence: HIDDEN_DEPENDENCY_CONFIDENCE,
                            rationale: format!("commonly required alongside {}", trigger.name()),
                        });
                    }
                }
            }
        }
        Ok(suggestions)
    }
}

/// Evidence source running an inference model over the primary claims
pub struct InferenceEvidence {
    model: Arc<dyn InferenceModel>,
}

impl InferenceEvidence {
    pub fn new(model: Arc<dyn InferenceModel>) -> Self {
        Self { model }
    }
}

impl EvidenceSource for InferenceEvidence {
    fn name(&self) -> &str {
        self.model.name()
    }

    fn is_derived(&self) -> bool {
        true
    }

    fn scan(&self, project: &Project, prior: &[DependencyClaim]) -> Result<Vec<DependencyClaim>> {
        Ok(self
            .model
            .suggest(project, prior)?
            .into_iter()
            .map(|s| DependencyClaim::new(s.identity, SourceKind::AiInference, s.confidence, s.rationale))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(ecosystem: Ecosystem, name: &str) -> DependencyClaim {
        DependencyClaim::new(PackageIdentity::new(ecosystem, name), SourceKind::ImportScan, 0.8, "test")
    }

    #[test]
    fn test_rules_skip_known_packages() {
        let project = Project::new("/p", "", Ecosystem::PythonPip);
        let known = vec![
            claim(Ecosystem::PythonPip, "scikit-learn"),
            claim(Ecosystem::PythonPip, "numpy"),
        ];
        let suggestions = HiddenDependencyRules.suggest(&project, &known).unwrap();
        let names: Vec<&str> = suggestions.iter().map(|s| s.identity.name()).collect();
        // numpy is already claimed; scipy is suggested once
        assert_eq!(names, vec!["scipy", "matplotlib"]);
        assert!(suggestions.iter().all(|s| s.confidence < 0.5));
        assert_eq!(suggestions[0].rationale, "commonly required alongside scikit-learn");
    }

    #[test]
    fn test_rules_are_per_ecosystem() {
        let project = Project::new("/p", "", Ecosystem::NodeNpm);
        let known = vec![claim(Ecosystem::NodeNpm, "React")];
        let suggestions = HiddenDependencyRules.suggest(&project, &known).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].identity, PackageIdentity::new(Ecosystem::NodeNpm, "react-dom"));
    }

    #[test]
    fn test_inference_evidence_tags_source() {
        let project = Project::new("/p", "", Ecosystem::NodeNpm);
        let source = InferenceEvidence::new(Arc::new(HiddenDependencyRules));
        assert!(source.is_derived());
        let claims = source.scan(&project, &[claim(Ecosystem::NodeNpm, "express")]).unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].source_kind, SourceKind::AiInference);
        assert_eq!(claims[0].identity.name(), "body-parser");
    }
}
