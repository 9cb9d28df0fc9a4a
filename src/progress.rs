// src/progress.rs

//! Progress reporting for workspace runs
//!
//! The engine and the resolution loop report where each project is through
//! a [`ProgressTracker`]. Projects may run on several rayon workers at
//! once, so trackers are keyed by project label and must be thread-safe.
//!
//! Implementations:
//! - `SilentProgress`: no-op, the default for library use and tests
//! - `LogProgress`: phase changes as tracing events
//! - the CLI's terminal progress bars (`commands::progress`)

use std::fmt;
use tracing::{debug, info};

/// Where a project currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    Resolving { attempt: u32, budget: u32 },
    Validating { attempt: u32, budget: u32 },
    Adjusting { attempt: u32, budget: u32 },
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scanning => write!(f, "scanning"),
            Self::Resolving { attempt, budget } => write!(f, "resolving (attempt {}/{})", attempt, budget),
            Self::Validating { attempt, budget } => write!(f, "validating (attempt {}/{})", attempt, budget),
            Self::Adjusting { attempt, budget } => write!(f, "adjusting (attempt {}/{})", attempt, budget),
        }
    }
}

/// Receives progress of the projects in a run
///
/// Every call carries the project label, so one tracker serves all
/// projects of a workspace.
pub trait ProgressTracker: Send + Sync {
    /// Total number of projects about to run
    fn begin(&self, _projects: usize) {}

    /// A project moved to a new phase
    fn set_phase(&self, project: &str, phase: Phase);

    /// A project finished; `accepted` is false for every failed outcome
    fn finish_project(&self, project: &str, accepted: bool, summary: &str);
}

/// Progress tracker that reports nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressTracker for SilentProgress {
    fn set_phase(&self, _project: &str, _phase: Phase) {}

    fn finish_project(&self, _project: &str, _accepted: bool, _summary: &str) {}
}

/// Shared no-op tracker
pub static SILENT: SilentProgress = SilentProgress;

/// Progress tracker that logs to tracing
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressTracker for LogProgress {
    fn begin(&self, projects: usize) {
        info!("Processing {} project(s)", projects);
    }

    fn set_phase(&self, project: &str, phase: Phase) {
        debug!("{}: {}", project, phase);
    }

    fn finish_project(&self, project: &str, accepted: bool, summary: &str) {
        if accepted {
            info!("{}: done ({})", project, summary);
        } else {
            info!("{}: failed ({})", project, summary);
        }
    }
}
