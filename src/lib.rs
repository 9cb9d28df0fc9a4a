// src/lib.rs

//! envforge
//!
//! Infers the runtime dependencies of a project tree from several kinds of
//! evidence, resolves one consistent version per package, and validates
//! the result by installing it in a disposable sandbox, loosening
//! constraints and retrying when the install fails.
//!
//! # Architecture
//!
//! - Evidence sources produce claims; the aggregator groups them by package
//! - The resolver intersects constraints deterministically
//! - The sandbox validator installs an assignment away from the project
//! - The resolution loop drives resolve → validate → adjust under a budget
//! - Ecosystem plugins (pip, npm, Maven, Go modules, RubyGems) supply
//!   manifest parsing, rendering, install steps, audits and failure
//!   attribution
//! - Known-deprecated releases are reported and upgraded when possible

pub mod aggregator;
pub mod cancel;
pub mod claim;
pub mod config;
pub mod deprecation;
pub mod dockerfile;
pub mod ecosystem;
pub mod ecosystems;
pub mod engine;
pub mod envfile;
mod error;
pub mod evidence;
pub mod lockfile;
pub mod lookup;
pub mod manifest;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod resolver;
pub mod sandbox;
pub mod scan_cache;
pub mod validator;
pub mod version;
pub mod workspace;

pub use aggregator::{CandidateSet, aggregate};
pub use cancel::CancelToken;
pub use claim::{DependencyClaim, PackageIdentity, SourceKind};
pub use config::EngineConfig;
pub use ecosystem::Ecosystem;
pub use ecosystems::{EcosystemRegistry, EcosystemSupport};
pub use engine::{Engine, ProjectRun, ProjectScan};
pub use error::{Error, Result};
pub use evidence::{EvidenceSource, EvidenceWarning, InferenceModel};
pub use lockfile::Lockfile;
pub use lookup::{StaticCatalog, VersionLookup};
pub use orchestrator::{LoopConfig, LoopOutcome, LoopResult, ResolutionLoop};
pub use progress::{LogProgress, Phase, ProgressTracker, SilentProgress};
pub use report::{ExitStatus, ResolutionReport, WorkspaceReport};
pub use resolver::{ResolvedAssignment, Resolver, UnresolvedConflict};
pub use scan_cache::ScanCache;
pub use validator::{SandboxValidator, ValidationResult, Validator};
pub use version::{PackageVersion, VersionConstraint, VersionRange};
pub use workspace::{DiscoveryOptions, Project};
