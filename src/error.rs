// src/error.rs

//! Crate-wide error type
//!
//! Every fallible library operation returns [`Result`]. A broken
//! dependency set is not an error: it comes back as a failed
//! `ValidationResult`. Only a sandbox that cannot be built or run ends up
//! here.

use thiserror::Error;

/// Errors produced by the resolution engine and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input (manifest line, identity string, ...)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Version string could not be interpreted
    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    /// Version constraint could not be interpreted
    #[error("Invalid version constraint '{input}': {reason}")]
    InvalidConstraint { input: String, reason: String },

    /// Ecosystem name is not one of the supported ecosystems
    #[error("Unsupported ecosystem: {0}")]
    UnsupportedEcosystem(String),

    /// An evidence source could not produce claims
    #[error("Evidence source '{source_name}' failed: {reason}")]
    EvidenceFailed { source_name: String, reason: String },

    /// The isolated execution context could not be created or used
    #[error("Sandbox unavailable: {0}")]
    SandboxUnavailable(String),

    /// Installer tool required for validation is not on PATH
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Registry version lookup failed
    #[error("Version lookup failed: {0}")]
    LookupError(String),

    /// Invalid configuration value or file
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Lockfile could not be read, written or validated
    #[error("Lockfile error: {0}")]
    LockfileError(String),

    /// Operator-initiated abort
    #[error("Operation cancelled")]
    Cancelled,

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// True for failures of the isolated context itself rather than of the
    /// dependencies being validated
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::SandboxUnavailable(_) | Self::ToolNotFound(_))
    }
}

/// Result type for envforge operations
pub type Result<T> = std::result::Result<T, Error>;
