// src/cli/mod.rs
//! CLI definitions for envforge
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.
//!
//! - `init` - Infer, resolve and validate a workspace, then write manifests
//! - `scan` - Show the gathered evidence and candidate packages only

use clap::{Args, Parser, Subcommand};
use envforge::Ecosystem;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "envforge")]
#[command(author = "envforge Contributors")]
#[command(version)]
#[command(about = "Infer a project's dependencies and validate them in a disposable sandbox", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve and validate the dependencies of every project in a workspace
    Init(InitArgs),

    /// Show evidence and candidate packages without resolving
    Scan(ScanArgs),
}

/// Options shared by `init` and `scan`
#[derive(Args, Debug, Clone)]
pub struct WorkspaceArgs {
    /// Workspace directory
    pub path: PathBuf,

    /// Ecosystem for a root without manifests (python, node, java, go, ruby)
    #[arg(long, value_parser = parse_ecosystem)]
    pub lang: Option<Ecosystem>,

    /// Configuration file (default: <path>/envforge.toml, then the user config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip registry version lookups
    #[arg(long)]
    pub offline: bool,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Reuse the evidence of projects unchanged since the last run
    #[arg(long)]
    pub cache: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    /// Show what would be written without writing anything
    #[arg(long, conflicts_with = "auto_apply")]
    pub preview: bool,

    /// Write files without asking for confirmation
    #[arg(long)]
    pub auto_apply: bool,

    /// Also generate a multi-stage Dockerfile at the workspace root
    #[arg(long)]
    pub docker: bool,

    /// Maximum resolve/validate attempts per project
    #[arg(long, value_name = "N")]
    pub retry_budget: Option<u32>,

    /// Install step timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Confidence below which packages are tentative (0.0-1.0)
    #[arg(long, value_name = "T")]
    pub threshold: Option<f64>,

    /// Skip the vulnerability audit of accepted environments
    #[arg(long)]
    pub no_audit: bool,

    /// Write the JSON report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
}

fn parse_ecosystem(s: &str) -> Result<Ecosystem, String> {
    s.parse::<Ecosystem>().map_err(|e| e.to_string())
}
