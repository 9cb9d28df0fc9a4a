// src/scan_cache.rs

//! Evidence cache for unchanged projects
//!
//! With `--cache` the evidence gathered for a project is stored as JSON in
//! the user cache directory, keyed by the project directory. Each entry
//! carries a fingerprint of the project tree (relative path, size and
//! modification time of every scanned file); a changed tree misses and is
//! rescanned. Evidence with warnings is never stored, so a failed source
//! is retried on the next run.

use crate::error::Result;
use crate::evidence::Evidence;
use crate::workspace::{Project, is_scannable};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Serialize, Deserialize)]
struct CachedScan {
    fingerprint: String,
    evidence: Evidence,
}

/// On-disk evidence cache
#[derive(Debug, Clone)]
pub struct ScanCache {
    dir: PathBuf,
    max_depth: usize,
}

impl ScanCache {
    pub fn new(dir: impl Into<PathBuf>, max_depth: usize) -> Self {
        Self {
            dir: dir.into(),
            max_depth,
        }
    }

    /// `~/.cache/envforge/scans` (platform equivalent)
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("envforge").join("scans"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, project: &Project) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(project.root.to_string_lossy().as_bytes());
        hasher.update(project.ecosystem.to_string().as_bytes());
        let key = hex::encode(hasher.finalize());
        self.dir.join(format!("{}.json", &key[..32]))
    }

    /// Hash of the tree the evidence sources would look at
    pub fn fingerprint(&self, project: &Project) -> String {
        let mut hasher = Sha256::new();
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update(project.ecosystem.to_string().as_bytes());
        hasher.update(self.max_depth.to_le_bytes());

        let walker = WalkDir::new(&project.root)
            .max_depth(self.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| is_scannable(e) && !project.nested.iter().any(|n| n == e.path()));
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&project.root).unwrap_or(entry.path());
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            if let Ok(meta) = entry.metadata() {
                hasher.update(meta.len().to_le_bytes());
                let modified = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos())
                    .unwrap_or_default();
                hasher.update(modified.to_le_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Cached evidence, if the project has not changed since it was stored
    pub fn load(&self, project: &Project) -> Option<Evidence> {
        let path = self.entry_path(project);
        let content = fs::read_to_string(&path).ok()?;
        let cached: CachedScan = match serde_json::from_str(&content) {
            Ok(cached) => cached,
            Err(e) => {
                warn!("Ignoring corrupt scan cache {}: {}", path.display(), e);
                return None;
            }
        };
        if cached.fingerprint != self.fingerprint(project) {
            debug!("{}: scan cache is stale", project);
            return None;
        }
        debug!("{}: using cached evidence", project);
        Some(cached.evidence)
    }

    /// Store evidence for a project; evidence with warnings is skipped
    pub fn store(&self, project: &Project, evidence: &Evidence) -> Result<()> {
        if !evidence.warnings.is_empty() {
            debug!("{}: not caching evidence with warnings", project);
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        let cached = CachedScan {
            fingerprint: self.fingerprint(project),
            evidence: evidence.clone(),
        };
        fs::write(self.entry_path(project), serde_json::to_string(&cached)?)?;
        Ok(())
    }
}
