// src/workspace.rs

//! Project discovery
//!
//! A workspace is the directory handed to the CLI. Every directory in it
//! holding a known manifest file is a project of that manifest's
//! ecosystem; a monorepo therefore yields several projects that are
//! resolved independently. A tree without any manifest is treated as a
//! single project whose ecosystem is the one with the most source files.

use crate::ecosystem::Ecosystem;
use crate::error::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Default directory depth for discovery and import scanning
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Directories that never contain first-party code
pub const SKIPPED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "venv",
    ".venv",
    "env",
    "__pycache__",
    ".tox",
    "target",
    "vendor",
    "dist",
    "build",
    ".bundle",
];

/// One unit of resolution: a directory and the ecosystem resolved in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Absolute project directory
    pub root: PathBuf,
    /// Directory relative to the workspace root (empty for the root)
    pub relative: PathBuf,
    pub ecosystem: Ecosystem,
    /// Roots of nested projects of the same ecosystem, excluded from scans
    pub nested: Vec<PathBuf>,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>, relative: impl Into<PathBuf>, ecosystem: Ecosystem) -> Self {
        Self {
            root: root.into(),
            relative: relative.into(),
            ecosystem,
            nested: Vec::new(),
        }
    }

    /// Short label used in logs and reports
    pub fn label(&self) -> String {
        if self.relative.as_os_str().is_empty() {
            format!(". ({})", self.ecosystem)
        } else {
            format!("{} ({})", self.relative.display(), self.ecosystem)
        }
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Discovery settings
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub max_depth: usize,
    /// Only consider this ecosystem (`--lang`)
    pub language: Option<Ecosystem>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            language: None,
        }
    }
}

/// Whether the walker should descend into an entry
pub fn is_scannable(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    !SKIPPED_DIRS.contains(&name.as_ref())
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).map(Path::to_path_buf).unwrap_or_default()
}

/// Find the projects in a workspace
///
/// Projects are returned sorted by directory, then ecosystem.
pub fn discover(workspace: &Path, options: &DiscoveryOptions) -> Result<Vec<Project>> {
    if !workspace.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("not a directory: {}", workspace.display()),
        )
        .into());
    }
    let workspace = workspace.canonicalize()?;
    let ecosystems: Vec<Ecosystem> = match options.language {
        Some(lang) => vec![lang],
        None => Ecosystem::all().to_vec(),
    };

    let mut projects: Vec<Project> = Vec::new();
    let mut source_counts: BTreeMap<Ecosystem, usize> = BTreeMap::new();

    let walker = WalkDir::new(&workspace)
        .max_depth(options.max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(is_scannable);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            for ecosystem in &ecosystems {
                if ecosystem.manifest_markers().iter().any(|m| path.join(m).is_file()) {
                    projects.push(Project::new(path, relative_to(&workspace, path), *ecosystem));
                }
            }
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            for ecosystem in &ecosystems {
                if ecosystem.source_extensions().contains(&ext) {
                    *source_counts.entry(*ecosystem).or_default() += 1;
                }
            }
        }
    }

    if projects.is_empty() {
        // Highest count wins; ties go to the earlier ecosystem
        let inferred = options.language.or_else(|| {
            source_counts
                .iter()
                .filter(|(_, count)| **count > 0)
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map(|(eco, _)| *eco)
        });
        if let Some(ecosystem) = inferred {
            info!("No manifest found; treating {} as a {} project", workspace.display(), ecosystem);
            projects.push(Project::new(&workspace, PathBuf::new(), ecosystem));
        }
    }

    let roots: Vec<(PathBuf, Ecosystem)> = projects.iter().map(|p| (p.root.clone(), p.ecosystem)).collect();
    for project in &mut projects {
        project.nested = roots
            .iter()
            .filter(|(root, eco)| *eco == project.ecosystem && root != &project.root && root.starts_with(&project.root))
            .map(|(root, _)| root.clone())
            .collect();
    }

    projects.sort_by(|a, b| a.relative.cmp(&b.relative).then(a.ecosystem.cmp(&b.ecosystem)));
    debug!("Discovered {} project(s) in {}", projects.len(), workspace.display());
    Ok(projects)
}
