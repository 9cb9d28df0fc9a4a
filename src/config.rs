// src/config.rs

//! Engine configuration
//!
//! A TOML file with flat keys, every one optional:
//!
//! ```toml
//! confidence_threshold = 0.5
//! retry_budget = 3
//! validation_timeout_secs = 600
//! lookup_timeout_secs = 2
//! offline = false
//! optional = ["python-pip:matplotlib", "react-dom"]
//! max_scan_depth = 8
//! parallel_projects = true
//! extra_env = ["PIP_INDEX_URL"]
//! upgrade_deprecated = true
//! audit = true
//! env_template = true
//! scan_cache = false
//! ```
//!
//! The file is taken from `--config`, else `<project>/envforge.toml`, else
//! `~/.config/envforge/config.toml`. Command-line flags are applied on top.

use crate::error::{Error, Result};
use crate::orchestrator::LoopConfig;
use crate::sandbox::SandboxConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Per-project configuration file name
pub const PROJECT_CONFIG_NAME: &str = "envforge.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Claims below this confidence make a package tentative
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Maximum resolve/validate attempts per project
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Timeout of one install step
    #[serde(default = "default_validation_timeout_secs")]
    pub validation_timeout_secs: u64,

    /// Timeout of one registry request
    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,

    /// Skip registry lookups entirely
    #[serde(default)]
    pub offline: bool,

    /// Packages allowed to stay unresolved (`name` or `ecosystem:name`)
    #[serde(default)]
    pub optional: Vec<String>,

    /// Directory depth for discovery and import scanning
    #[serde(default = "default_max_scan_depth")]
    pub max_scan_depth: usize,

    /// Process monorepo projects in parallel
    #[serde(default = "default_parallel_projects")]
    pub parallel_projects: bool,

    /// Additional environment variables passed into the sandbox
    #[serde(default)]
    pub extra_env: Vec<String>,

    /// Move known-deprecated releases to the newest good release
    #[serde(default = "default_true")]
    pub upgrade_deprecated: bool,

    /// Run the ecosystem's vulnerability audit after a passing install
    #[serde(default = "default_true")]
    pub audit: bool,

    /// Generate `.env.example` from environment variables the code reads
    #[serde(default = "default_true")]
    pub env_template: bool,

    /// Reuse evidence of unchanged projects from the user cache directory
    #[serde(default)]
    pub scan_cache: bool,
}

fn default_confidence_threshold() -> f64 {
    crate::resolver::DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_retry_budget() -> u32 {
    crate::orchestrator::DEFAULT_RETRY_BUDGET
}

fn default_validation_timeout_secs() -> u64 {
    600
}

fn default_lookup_timeout_secs() -> u64 {
    2
}

fn default_max_scan_depth() -> usize {
    crate::workspace::DEFAULT_MAX_DEPTH
}

fn default_parallel_projects() -> bool {
    true
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            retry_budget: default_retry_budget(),
            validation_timeout_secs: default_validation_timeout_secs(),
            lookup_timeout_secs: default_lookup_timeout_secs(),
            offline: false,
            optional: Vec::new(),
            max_scan_depth: default_max_scan_depth(),
            parallel_projects: default_parallel_projects(),
            extra_env: Vec::new(),
            upgrade_deprecated: true,
            audit: true,
            env_template: true,
            scan_cache: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content).map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the first configuration file that exists
    ///
    /// An explicit path must exist. Returns the file used, if any.
    pub fn discover(explicit: Option<&Path>, project: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        let candidates = [Some(project.join(PROJECT_CONFIG_NAME)), user_config_path()];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                debug!("Using configuration {}", path.display());
                return Ok((Self::load(&path)?, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::ConfigError(format!(
                "confidence_threshold must be between 0.0 and 1.0, got {}",
                self.confidence_threshold
            )));
        }
        if self.retry_budget == 0 {
            return Err(Error::ConfigError("retry_budget must be at least 1".to_string()));
        }
        if self.validation_timeout_secs == 0 {
            return Err(Error::ConfigError("validation_timeout_secs must be positive".to_string()));
        }
        if self.lookup_timeout_secs == 0 {
            return Err(Error::ConfigError("lookup_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            confidence_threshold: self.confidence_threshold,
            retry_budget: self.retry_budget,
            optional: self.optional.clone(),
            upgrade_deprecated: self.upgrade_deprecated,
        }
    }

    pub fn sandbox_config(&self) -> SandboxConfig {
        self.extra_env
            .iter()
            .fold(SandboxConfig::default().with_timeout(self.validation_timeout()), |config, name| {
                config.allow_env(name)
            })
    }
}

/// `~/.config/envforge/config.toml` (platform equivalent)
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("envforge").join("config.toml"))
}
