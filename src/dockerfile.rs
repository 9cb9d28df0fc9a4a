// src/dockerfile.rs

//! Multi-stage Dockerfile generation
//!
//! Each project contributes one dependency stage built from its
//! ecosystem's base image. The final stage copies the project sources and
//! the installed dependency trees out of every stage.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Dependency-install stage for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStage {
    pub base_image: String,
    /// Manifest files copied into the stage, relative to the project
    pub manifests: Vec<String>,
    pub env: Vec<(String, String)>,
    pub run: Vec<String>,
    /// `(path in stage, path in final image)`; relative paths are taken
    /// from the project's directory
    pub artifacts: Vec<(String, String)>,
}

impl ContainerStage {
    pub fn new(base_image: &str) -> Self {
        Self {
            base_image: base_image.to_string(),
            manifests: Vec::new(),
            env: Vec::new(),
            run: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn copy(mut self, manifest: &str) -> Self {
        self.manifests.push(manifest.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn run(mut self, command: &str) -> Self {
        self.run.push(command.to_string());
        self
    }

    pub fn artifact(mut self, from: &str, to: &str) -> Self {
        self.artifacts.push((from.to_string(), to.to_string()));
        self
    }
}

/// A stage together with the project it belongs to
#[derive(Debug, Clone)]
pub struct ProjectStage {
    /// Project directory relative to the workspace root (empty for root)
    pub subdir: PathBuf,
    pub stage: ContainerStage,
}

fn stage_name(index: usize, subdir: &Path) -> String {
    let label: String = subdir
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let label = label.trim_matches('-');
    if label.is_empty() {
        format!("deps-{}-root", index)
    } else {
        format!("deps-{}-{}", index, label)
    }
}

fn app_dir(subdir: &Path) -> String {
    if subdir.as_os_str().is_empty() {
        "/app".to_string()
    } else {
        format!("/app/{}", subdir.to_string_lossy().trim_matches('/'))
    }
}

fn source_path(subdir: &Path, file: &str) -> String {
    if subdir.as_os_str().is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", subdir.to_string_lossy().trim_matches('/'), file)
    }
}

/// Render a Dockerfile for a set of project stages
///
/// The final image uses the first stage's base image when every stage
/// shares it, and a plain Debian image otherwise.
pub fn render(stages: &[ProjectStage]) -> String {
    let mut out = String::from("# Generated by envforge\n");

    for (index, project) in stages.iter().enumerate() {
        let name = stage_name(index, &project.subdir);
        let workdir = app_dir(&project.subdir);
        let stage = &project.stage;

        let _ = writeln!(out, "\nFROM {} AS {}", stage.base_image, name);
        let _ = writeln!(out, "WORKDIR {}", workdir);
        for (key, value) in &stage.env {
            let _ = writeln!(out, "ENV {}={}", key, value);
        }
        if !stage.manifests.is_empty() {
            let sources: Vec<String> = stage
                .manifests
                .iter()
                .map(|m| source_path(&project.subdir, m))
                .collect();
            let _ = writeln!(out, "COPY {} ./", sources.join(" "));
        }
        for command in &stage.run {
            let _ = writeln!(out, "RUN {}", command);
        }
    }

    let final_image = match stages.first() {
        Some(first) if stages.iter().all(|s| s.stage.base_image == first.stage.base_image) => {
            first.stage.base_image.as_str()
        }
        _ => "debian:bookworm-slim",
    };

    let _ = writeln!(out, "\nFROM {}", final_image);
    let _ = writeln!(out, "WORKDIR /app");
    let _ = writeln!(out, "COPY . /app");
    for (index, project) in stages.iter().enumerate() {
        let name = stage_name(index, &project.subdir);
        let workdir = app_dir(&project.subdir);
        for (key, value) in &project.stage.env {
            let _ = writeln!(out, "ENV {}={}", key, value);
        }
        for (from, to) in &project.stage.artifacts {
            let resolve = |p: &str| {
                if p.starts_with('/') {
                    p.to_string()
                } else {
                    format!("{}/{}", workdir, p)
                }
            };
            let _ = writeln!(out, "COPY --from={} {} {}", name, resolve(from), resolve(to));
        }
    }

    out
}
