// src/manifest.rs

//! Rendered output files and applying them to a project
//!
//! Rendering is delegated to the ecosystem plugins. Files are only written
//! into the real project by [`apply`], which the command layer calls after
//! an accepted resolution outside preview mode.

use crate::ecosystems::EcosystemRegistry;
use crate::error::Result;
use crate::resolver::ResolvedAssignment;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// A generated file, relative to a project root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestFile {
    pub relative_path: PathBuf,
    pub contents: String,
}

impl ManifestFile {
    pub fn new(relative_path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            contents: contents.into(),
        }
    }

    /// File name as a string, for Dockerfile COPY lines
    pub fn file_name(&self) -> String {
        self.relative_path.to_string_lossy().into_owned()
    }

    /// Write the file below `dir`, creating parent directories
    pub fn write_into(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(&self.relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &self.contents)?;
        Ok(path)
    }
}

/// What applying a file would do to the project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChange {
    Create,
    Modify,
    Unchanged,
}

/// Render manifests for every ecosystem in an assignment
pub fn render_all(registry: &EcosystemRegistry, assignment: &ResolvedAssignment) -> Result<Vec<ManifestFile>> {
    let mut files = Vec::new();
    for ecosystem in assignment.ecosystems() {
        let plugin = registry.require(ecosystem)?;
        files.extend(plugin.render_manifest(&assignment.for_ecosystem(ecosystem)));
    }
    Ok(files)
}

/// Compare files against what is on disk
pub fn preview(project_root: &Path, files: &[ManifestFile]) -> Vec<(PathBuf, FileChange)> {
    files
        .iter()
        .map(|file| {
            let change = match fs::read_to_string(project_root.join(&file.relative_path)) {
                Ok(existing) if existing == file.contents => FileChange::Unchanged,
                Ok(_) => FileChange::Modify,
                Err(_) => FileChange::Create,
            };
            (file.relative_path.clone(), change)
        })
        .collect()
}

/// Write files into the project, skipping ones already up to date
pub fn apply(project_root: &Path, files: &[ManifestFile]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (file, (_, change)) in files.iter().zip(preview(project_root, files)) {
        if change == FileChange::Unchanged {
            continue;
        }
        let path = file.write_into(project_root)?;
        info!("Applied {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecosystem::Ecosystem;
    use crate::ecosystems::test_support::entry;
    use tempfile::TempDir;

    #[test]
    fn test_render_all_groups_by_ecosystem() {
        let assignment = ResolvedAssignment::from_entries(vec![
            entry(Ecosystem::PythonPip, "numpy", "1.26.4"),
            entry(Ecosystem::NodeNpm, "react", "18.2.0"),
        ]);
        let files = render_all(&EcosystemRegistry::with_builtins(), &assignment).unwrap();
        let names: Vec<String> = files.iter().map(ManifestFile::file_name).collect();
        assert_eq!(names, vec!["requirements.txt", "package.json"]);
    }

    #[test]
    fn test_preview_and_apply() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("same.txt"), "x").unwrap();
        fs::write(dir.path().join("changed.txt"), "old").unwrap();

        let files = vec![
            ManifestFile::new("same.txt", "x"),
            ManifestFile::new("changed.txt", "new"),
            ManifestFile::new("sub/new.txt", "fresh"),
        ];
        let changes: Vec<FileChange> = preview(dir.path(), &files).into_iter().map(|(_, c)| c).collect();
        assert_eq!(changes, vec![FileChange::Unchanged, FileChange::Modify, FileChange::Create]);

        let written = apply(dir.path(), &files).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(fs::read_to_string(dir.path().join("changed.txt")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dir.path().join("sub/new.txt")).unwrap(), "fresh");
    }
}
