// src/commands/init.rs
//! Resolve, validate and write environment manifests

use super::{discovery_options, load_config, progress};
use crate::cli::InitArgs;
use anyhow::{Context, Result};
use envforge::dockerfile::{self, ProjectStage};
use envforge::engine::ProjectRun;
use envforge::manifest::{self, FileChange, ManifestFile};
use envforge::{CancelToken, Engine, ExitStatus, ResolutionReport, WorkspaceReport};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;
use tracing::{info, warn};

const DOCKERFILE_NAME: &str = "Dockerfile";

/// How generated files reach the project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyMode {
    Preview,
    Confirm,
    Auto,
}

impl ApplyMode {
    fn from_args(args: &InitArgs) -> Self {
        if args.preview {
            Self::Preview
        } else if args.auto_apply {
            Self::Auto
        } else {
            Self::Confirm
        }
    }
}

/// Run the full resolution for every project in a workspace
pub fn cmd_init(args: &InitArgs, cancel: CancelToken) -> Result<ExitStatus> {
    let workspace = &args.workspace.path;
    let mut config = load_config(&args.workspace)?;
    if let Some(budget) = args.retry_budget {
        config.retry_budget = budget;
    }
    if let Some(timeout) = args.timeout {
        config.validation_timeout_secs = timeout;
    }
    if let Some(threshold) = args.threshold {
        config.confidence_threshold = threshold;
    }
    config.audit &= !args.no_audit;
    config.validate().context("Invalid command-line option")?;

    let engine = Engine::new(config.clone())?
        .with_cancel_token(cancel.clone())
        .with_progress(progress::tracker(args.workspace.json));
    let projects = engine.discover(workspace, &discovery_options(&args.workspace, &config))?;
    if projects.is_empty() {
        warn!("No projects found in {}", workspace.display());
    }

    let runs = engine.run_all(&projects)?;
    let dockerfile = if args.docker { render_dockerfile(workspace, &runs) } else { None };

    let mode = ApplyMode::from_args(args);
    let pending = pending_changes(&runs, dockerfile.as_ref(), workspace);
    let mut reports: Vec<_> = runs.iter().map(|r| r.report.clone()).collect();

    let apply = match mode {
        _ if pending == 0 => false,
        ApplyMode::Preview => false,
        _ if cancel.is_cancelled() => {
            warn!("Interrupted; not writing any files");
            false
        }
        ApplyMode::Auto => true,
        ApplyMode::Confirm => {
            if !args.workspace.json {
                print_reports(&reports);
            }
            confirm(pending)?
        }
    };

    if apply {
        for (run, report) in runs.iter().zip(reports.iter_mut()) {
            report.applied = manifest::apply(&run.project.root, &run.files)
                .with_context(|| format!("Failed to write files for {}", run.project))?;
        }
        if let Some(file) = &dockerfile {
            manifest::apply(workspace, std::slice::from_ref(file)).context("Failed to write Dockerfile")?;
        }
    }

    let report = WorkspaceReport::new(workspace, reports);
    if let Some(path) = &args.report {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    if args.workspace.json {
        println!("{}", report.to_json()?);
    } else if mode != ApplyMode::Confirm || pending == 0 || cancel.is_cancelled() {
        print_reports(&report.projects);
    }
    if mode == ApplyMode::Preview && pending > 0 {
        eprintln!("Preview only: {} file(s) not written", pending);
    }
    if apply {
        let written: usize = report.projects.iter().map(|p| p.applied.len()).sum();
        eprintln!("Wrote {} file(s)", written + usize::from(dockerfile.is_some()));
    }

    let status = report.exit_status();
    if cancel.is_cancelled() {
        return Ok(ExitStatus::Failed);
    }
    Ok(status)
}

/// Dockerfile for the accepted projects, if any
fn render_dockerfile(workspace: &Path, runs: &[ProjectRun]) -> Option<ManifestFile> {
    let stages: Vec<ProjectStage> = runs.iter().flat_map(|r| r.stages.iter().cloned()).collect();
    if stages.is_empty() {
        warn!("No accepted project; skipping Dockerfile for {}", workspace.display());
        return None;
    }
    Some(ManifestFile::new(DOCKERFILE_NAME, dockerfile::render(&stages)))
}

/// Number of files that applying would create or modify
fn pending_changes(runs: &[ProjectRun], dockerfile: Option<&ManifestFile>, workspace: &Path) -> usize {
    let project_changes: usize = runs
        .iter()
        .map(|r| {
            r.report
                .outputs
                .iter()
                .filter(|(_, change)| *change != FileChange::Unchanged)
                .count()
        })
        .sum();
    let docker_changes = dockerfile
        .map(|file| {
            manifest::preview(workspace, std::slice::from_ref(file))
                .iter()
                .filter(|(_, change)| *change != FileChange::Unchanged)
                .count()
        })
        .unwrap_or(0);
    project_changes + docker_changes
}

fn print_reports(reports: &[ResolutionReport]) {
    if reports.is_empty() {
        println!("No projects found");
    }
    for (i, report) in reports.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print!("{}", report);
    }
}

/// Ask before writing; a non-interactive stdin means no
fn confirm(pending: usize) -> Result<bool> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        warn!("stdin is not a terminal; use --auto-apply to write files");
        return Ok(false);
    }
    eprint!("Write {} file(s)? [y/N] ", pending);
    io::stderr().flush()?;
    let mut answer = String::new();
    stdin.lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
