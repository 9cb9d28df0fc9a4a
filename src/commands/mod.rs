// src/commands/mod.rs
//! Command handlers for the envforge CLI

mod init;
mod progress;
mod scan;

pub use init::cmd_init;
pub use scan::cmd_scan;

use crate::cli::WorkspaceArgs;
use anyhow::{Context, Result};
use envforge::{DiscoveryOptions, EngineConfig};
use tracing::info;

/// Configuration for a workspace, with the shared flags applied
fn load_config(args: &WorkspaceArgs) -> Result<EngineConfig> {
    let (mut config, source) = EngineConfig::discover(args.config.as_deref(), &args.path)
        .context("Failed to load configuration")?;
    match source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("Using default configuration"),
    }
    config.offline |= args.offline;
    config.scan_cache |= args.cache;
    Ok(config)
}

fn discovery_options(args: &WorkspaceArgs, config: &EngineConfig) -> DiscoveryOptions {
    DiscoveryOptions {
        max_depth: config.max_scan_depth,
        language: args.lang,
    }
}
