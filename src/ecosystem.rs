// src/ecosystem.rs

//! Supported package ecosystems
//!
//! Each ecosystem has its own naming rules. Package names are normalized
//! here so that `Flask`, `flask` and `FLASK` collapse to one identity for
//! pip, while Maven coordinates and Go module paths keep their case.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Package ecosystem a dependency belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ecosystem {
    /// Python packages installed with pip
    /// Example: numpy, scikit-learn
    PythonPip,

    /// JavaScript/TypeScript packages installed with npm
    /// Example: react, @types/node
    NodeNpm,

    /// Java artifacts resolved by Maven
    /// Format: groupId:artifactId
    JavaMaven,

    /// Go modules
    /// Example: github.com/spf13/cobra
    GoModules,

    /// Ruby gems installed with bundler
    RubyGems,
}

impl Ecosystem {
    /// Canonical identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PythonPip => "python-pip",
            Self::NodeNpm => "node-npm",
            Self::JavaMaven => "java-maven",
            Self::GoModules => "go-modules",
            Self::RubyGems => "ruby-gems",
        }
    }

    /// Parse from an identifier or a common language alias
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "python-pip" | "python" | "pip" | "py" => Some(Self::PythonPip),
            "node-npm" | "node" | "npm" | "js" | "javascript" | "ts" | "typescript" => {
                Some(Self::NodeNpm)
            }
            "java-maven" | "java" | "maven" => Some(Self::JavaMaven),
            "go-modules" | "go" | "golang" => Some(Self::GoModules),
            "ruby-gems" | "ruby" | "gem" | "gems" | "bundler" => Some(Self::RubyGems),
            _ => None,
        }
    }

    /// Return all ecosystems in registry order
    pub fn all() -> &'static [Ecosystem] {
        &[
            Self::PythonPip,
            Self::NodeNpm,
            Self::JavaMaven,
            Self::GoModules,
            Self::RubyGems,
        ]
    }

    /// Source-file extensions that indicate this ecosystem
    pub fn source_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::PythonPip => &["py"],
            Self::NodeNpm => &["js", "jsx", "ts", "tsx", "mjs", "cjs"],
            Self::JavaMaven => &["java"],
            Self::GoModules => &["go"],
            Self::RubyGems => &["rb"],
        }
    }

    /// Manifest files whose presence marks a project root
    pub fn manifest_markers(&self) -> &'static [&'static str] {
        match self {
            Self::PythonPip => &["requirements.txt", "pyproject.toml", "setup.py", "Pipfile"],
            Self::NodeNpm => &["package.json"],
            Self::JavaMaven => &["pom.xml"],
            Self::GoModules => &["go.mod"],
            Self::RubyGems => &["Gemfile"],
        }
    }

    /// Normalize a package name according to this ecosystem's rules
    pub fn normalize_name(&self, name: &str) -> String {
        let name = name.trim();
        match self {
            Self::PythonPip => normalize_pep503(name),
            Self::NodeNpm | Self::RubyGems => name.to_lowercase(),
            Self::JavaMaven => name
                .split(':')
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(":"),
            Self::GoModules => name.trim_end_matches('/').to_string(),
        }
    }
}

/// PEP 503: lowercase, and runs of `-`, `_`, `.` become a single `-`
fn normalize_pep503(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
                in_separator = true;
            }
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::UnsupportedEcosystem(s.to_string()))
    }
}
