// src/commands/scan.rs
//! Evidence-only view of a workspace

use super::{discovery_options, load_config};
use crate::cli::ScanArgs;
use anyhow::Result;
use envforge::engine::ProjectScan;
use envforge::{CandidateSet, Engine, EvidenceWarning, ExitStatus};
use serde::Serialize;

#[derive(Serialize)]
struct ScanOutput<'a> {
    project: String,
    candidates: &'a CandidateSet,
    warnings: &'a [EvidenceWarning],
}

/// Print the claims gathered for every project
pub fn cmd_scan(args: &ScanArgs) -> Result<ExitStatus> {
    let config = load_config(&args.workspace)?;
    let engine = Engine::new(config.clone())?;
    let projects = engine.discover(&args.workspace.path, &discovery_options(&args.workspace, &config))?;
    let scans: Vec<ProjectScan> = projects.iter().map(|p| engine.scan(p)).collect();

    if args.workspace.json {
        let output: Vec<ScanOutput> = scans
            .iter()
            .map(|s| ScanOutput {
                project: s.project.label(),
                candidates: &s.candidates,
                warnings: &s.evidence.warnings,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitStatus::Clean);
    }

    if scans.is_empty() {
        println!("No projects found in {}", args.workspace.path.display());
    }
    for scan in &scans {
        println!("== {} ==", scan.project.label());
        for (identity, claims) in &scan.candidates {
            println!("  {}", identity);
            for claim in claims {
                let constraint = claim
                    .version_constraint
                    .as_ref()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "*".to_string());
                println!(
                    "    {:<13} {:<16} {:.2}  {}",
                    claim.source_kind.as_str(),
                    constraint,
                    claim.confidence,
                    claim.rationale
                );
            }
        }
        for warning in &scan.evidence.warnings {
            println!("  warning: {}: {}", warning.source, warning.message);
        }
    }
    Ok(ExitStatus::Clean)
}
