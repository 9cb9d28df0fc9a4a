// src/engine.rs

//! End-to-end runs over a workspace
//!
//! [`Engine`] wires the pieces together for each discovered project:
//! evidence → aggregate → resolution loop → rendered outputs. Projects are
//! independent; with `parallel_projects` they run on rayon workers, each
//! with its own candidate set, assignment and sandboxes. Nothing is written
//! into a project here: outputs are returned for the caller to preview or
//! apply.
//!
//! Progress of every project goes to one shared [`ProgressTracker`].

use crate::aggregator::{CandidateSet, aggregate};
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::dockerfile::ProjectStage;
use crate::ecosystems::EcosystemRegistry;
use crate::envfile;
use crate::error::Result;
use crate::evidence::{self, Evidence, EvidenceSource};
use crate::lockfile::{LOCKFILE_NAME, Lockfile};
use crate::lookup::{CachedLookup, RegistryLookup, VersionLookup};
use crate::manifest::{self, ManifestFile};
use crate::orchestrator::ResolutionLoop;
use crate::progress::{LogProgress, Phase, ProgressTracker};
use crate::report::ResolutionReport;
use crate::resolver::ResolvedAssignment;
use crate::scan_cache::ScanCache;
use crate::validator::{SandboxValidator, Validator};
use crate::workspace::{self, DiscoveryOptions, Project};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Evidence and candidates of one project, before resolution
#[derive(Debug, Clone)]
pub struct ProjectScan {
    pub project: Project,
    pub evidence: Evidence,
    pub candidates: CandidateSet,
}

/// Everything one project run produced
#[derive(Debug, Clone)]
pub struct ProjectRun {
    pub project: Project,
    pub report: ResolutionReport,
    /// Manifests and lockfile, empty unless accepted
    pub files: Vec<ManifestFile>,
    /// Container stages, empty unless accepted
    pub stages: Vec<ProjectStage>,
}

pub struct Engine {
    config: EngineConfig,
    registry: Arc<EcosystemRegistry>,
    sources: Vec<Arc<dyn EvidenceSource>>,
    lookup: Arc<dyn VersionLookup>,
    validator: Arc<dyn Validator>,
    cancel: CancelToken,
    progress: Arc<dyn ProgressTracker>,
    scan_cache: Option<ScanCache>,
}

fn sandbox_validator(registry: &Arc<EcosystemRegistry>, config: &EngineConfig, cancel: &CancelToken) -> Arc<dyn Validator> {
    Arc::new(
        SandboxValidator::new(Arc::clone(registry), config.sandbox_config(), cancel.clone()).with_audit(config.audit),
    )
}

impl Engine {
    /// Engine with the built-in ecosystems, registry lookups and sandbox
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(EcosystemRegistry::with_builtins());
        let lookup = CachedLookup::new(RegistryLookup::new(config.lookup_timeout(), config.offline)?);
        let cancel = CancelToken::new();
        let scan_cache = if config.scan_cache {
            match ScanCache::default_dir() {
                Some(dir) => Some(ScanCache::new(dir, config.max_scan_depth)),
                None => {
                    warn!("No user cache directory; scan cache disabled");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self {
            sources: evidence::default_sources(Arc::clone(&registry), config.max_scan_depth),
            validator: sandbox_validator(&registry, &config, &cancel),
            lookup: Arc::new(lookup),
            registry,
            config,
            cancel,
            progress: Arc::new(LogProgress),
            scan_cache,
        })
    }

    /// Replace the ecosystem registry; evidence sources and the sandbox
    /// validator are rebuilt on top of it
    pub fn with_registry(mut self, registry: EcosystemRegistry) -> Self {
        let registry = Arc::new(registry);
        self.sources = evidence::default_sources(Arc::clone(&registry), self.config.max_scan_depth);
        self.validator = sandbox_validator(&registry, &self.config, &self.cancel);
        self.registry = registry;
        self
    }

    pub fn with_sources(mut self, sources: Vec<Arc<dyn EvidenceSource>>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn VersionLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Share a cancellation token with the caller; the sandbox validator is
    /// rebuilt so running installs honour it too
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.validator = sandbox_validator(&self.registry, &self.config, &cancel);
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    /// Use (or with `None`, stop using) an evidence cache
    pub fn with_scan_cache(mut self, cache: Option<ScanCache>) -> Self {
        self.scan_cache = cache;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &EcosystemRegistry {
        &self.registry
    }

    /// Find the projects of a workspace
    pub fn discover(&self, workspace: &Path, options: &DiscoveryOptions) -> Result<Vec<Project>> {
        let projects = workspace::discover(workspace, options)?;
        info!("Found {} project(s) in {}", projects.len(), workspace.display());
        Ok(projects)
    }

    /// Gather evidence and aggregate it
    ///
    /// With a scan cache, evidence of an unchanged project is reused.
    pub fn scan(&self, project: &Project) -> ProjectScan {
        self.progress.set_phase(&project.label(), Phase::Scanning);
        let cached = self.scan_cache.as_ref().and_then(|cache| cache.load(project));
        let evidence = match cached {
            Some(evidence) => {
                info!("{}: using cached evidence", project);
                evidence
            }
            None => {
                let evidence = evidence::gather(&self.sources, project);
                if let Some(cache) = &self.scan_cache {
                    if let Err(e) = cache.store(project, &evidence) {
                        warn!("Failed to cache evidence for {}: {}", project, e);
                    }
                }
                evidence
            }
        };
        let candidates = aggregate(evidence.claims.iter().cloned());
        info!(
            "{}: {} claim(s) for {} package(s)",
            project,
            evidence.claims.len(),
            candidates.len()
        );
        ProjectScan {
            project: project.clone(),
            evidence,
            candidates,
        }
    }

    /// Scan, resolve and validate one project
    pub fn run_project(&self, project: &Project) -> Result<ProjectRun> {
        let scan = self.scan(project);
        let label = project.label();
        let result = ResolutionLoop::new(self.lookup.as_ref(), self.validator.as_ref(), self.config.loop_config())
            .with_cancel_token(self.cancel.clone())
            .with_progress(self.progress.as_ref(), label.clone())
            .run(&scan.candidates, &project.root);

        let mut report = ResolutionReport::new(project, &scan.evidence, &scan.candidates, result);
        let mut files = Vec::new();
        let mut stages = Vec::new();

        if let Some(assignment) = report.accepted().cloned() {
            let drift = lock_drift(project, &assignment);
            let lock_current = drift.as_ref().is_some_and(Vec::is_empty);
            report.lock_drift = drift.unwrap_or_default();

            for ecosystem in assignment.ecosystems() {
                let plugin = self.registry.require(ecosystem)?;
                let manifests = plugin.render_manifest(&assignment.for_ecosystem(ecosystem));
                stages.push(ProjectStage {
                    subdir: project.relative.clone(),
                    stage: plugin.container_stage(&manifests),
                });
                files.extend(manifests);
            }
            if self.config.env_template {
                let names = envfile::scan(project, self.config.max_scan_depth);
                files.extend(envfile::render(&names));
            }
            if !lock_current {
                files.push(Lockfile::from_assignment(&project.label(), &assignment).to_manifest_file()?);
            }
            report.outputs = manifest::preview(&project.root, &files);
        }
        self.progress
            .finish_project(&label, report.accepted().is_some(), &report.summary());

        Ok(ProjectRun {
            project: project.clone(),
            report,
            files,
            stages,
        })
    }

    /// Run every project, in parallel when configured
    ///
    /// Results keep the order of `projects`.
    pub fn run_all(&self, projects: &[Project]) -> Result<Vec<ProjectRun>> {
        self.progress.begin(projects.len());
        if self.config.parallel_projects && projects.len() > 1 {
            projects.par_iter().map(|p| self.run_project(p)).collect()
        } else {
            projects.iter().map(|p| self.run_project(p)).collect()
        }
    }
}

/// Differences from the project's existing lockfile
///
/// `None` when the project has no lockfile yet.
fn lock_drift(project: &Project, assignment: &ResolvedAssignment) -> Option<Vec<String>> {
    let path = project.root.join(LOCKFILE_NAME);
    if !path.is_file() {
        return None;
    }
    Some(match Lockfile::from_file(&path) {
        Ok(existing) => match existing.validate_against(assignment) {
            Ok(()) => Vec::new(),
            Err(drift) => drift.iter().map(ToString::to_string).collect(),
        },
        Err(e) => {
            warn!("Ignoring unreadable {}: {}", path.display(), e);
            vec![format!("existing lockfile unreadable: {}", e)]
        }
    })
}
