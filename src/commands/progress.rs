// src/commands/progress.rs
//! Terminal progress for workspace runs
//!
//! An overall bar counts finished projects; below it each running project
//! gets its own bar that advances once per resolve/validate attempt, with
//! the current phase as its message.

use envforge::{LogProgress, Phase, ProgressTracker};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Progress bars for every project of a run
pub struct ProjectProgress {
    multi: MultiProgress,
    overall: ProgressBar,
    projects: Mutex<HashMap<String, ProgressBar>>,
}

impl ProjectProgress {
    pub fn new() -> Self {
        Self::with_multi(MultiProgress::new())
    }

    fn with_multi(multi: MultiProgress) -> Self {
        let overall = ProgressBar::new(0);
        overall.set_style(
            ProgressStyle::default_bar()
                .template("{msg} ({pos}/{len}) [{bar:40.green/dim}] {percent}%")
                .expect("Invalid progress bar template")
                .progress_chars("##-"),
        );
        overall.set_message("Resolving projects");
        let overall = multi.add(overall);

        Self {
            multi,
            overall,
            projects: Mutex::new(HashMap::new()),
        }
    }

    /// The project's bar, created on first use
    fn project_bar(&self, project: &str) -> ProgressBar {
        let mut projects = match self.projects.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        projects
            .entry(project.to_string())
            .or_insert_with(|| {
                let bar = ProgressBar::new(1);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("  {spinner:.cyan} {prefix} [{bar:20.cyan/dim}] {msg}")
                        .expect("Invalid progress bar template")
                        .progress_chars("##-"),
                );
                bar.set_prefix(project.to_string());
                bar.enable_steady_tick(Duration::from_millis(100));
                self.multi.add(bar)
            })
            .clone()
    }

    fn take_project_bar(&self, project: &str) -> Option<ProgressBar> {
        match self.projects.lock() {
            Ok(mut guard) => guard.remove(project),
            Err(poisoned) => poisoned.into_inner().remove(project),
        }
    }
}

impl Default for ProjectProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker for ProjectProgress {
    fn begin(&self, projects: usize) {
        if projects == 0 {
            self.overall.finish_and_clear();
        } else {
            self.overall.set_length(projects as u64);
        }
    }

    fn set_phase(&self, project: &str, phase: Phase) {
        let bar = self.project_bar(project);
        match phase {
            Phase::Scanning => {}
            Phase::Resolving { attempt, budget }
            | Phase::Validating { attempt, budget }
            | Phase::Adjusting { attempt, budget } => {
                bar.set_length(u64::from(budget));
                bar.set_position(u64::from(attempt.saturating_sub(1)));
            }
        }
        bar.set_message(phase.to_string());
    }

    fn finish_project(&self, project: &str, accepted: bool, summary: &str) {
        let bar = self.take_project_bar(project).unwrap_or_else(|| self.project_bar(project));
        if accepted {
            bar.finish_with_message(format!("{} [OK]", summary));
        } else {
            bar.abandon_with_message(format!("{} [FAILED]", summary));
        }

        self.overall.inc(1);
        if self.overall.length().is_some_and(|len| self.overall.position() >= len) {
            self.overall.finish_with_message("Projects done");
        }
    }
}

/// Progress bars when stderr is a terminal and output is text, log
/// events otherwise
pub fn tracker(json: bool) -> Arc<dyn ProgressTracker> {
    if !json && std::io::stderr().is_terminal() {
        Arc::new(ProjectProgress::new())
    } else {
        Arc::new(LogProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;

    fn hidden() -> ProjectProgress {
        ProjectProgress::with_multi(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    #[test]
    fn test_attempts_advance_project_bar() {
        let progress = hidden();
        progress.begin(2);
        progress.set_phase("app", Phase::Scanning);
        progress.set_phase("app", Phase::Resolving { attempt: 1, budget: 3 });
        progress.set_phase("app", Phase::Adjusting { attempt: 1, budget: 3 });
        progress.set_phase("app", Phase::Validating { attempt: 2, budget: 3 });

        let bar = progress.project_bar("app");
        assert_eq!(bar.length(), Some(3));
        assert_eq!(bar.position(), 1);
        assert_eq!(bar.message(), "validating (attempt 2/3)");
        assert_eq!(bar.prefix(), "app");
    }

    #[test]
    fn test_finished_projects_counted() {
        let progress = hidden();
        progress.begin(2);
        progress.set_phase("api", Phase::Scanning);
        progress.finish_project("api", true, "accepted");
        assert!(progress.take_project_bar("api").is_none());
        assert_eq!(progress.overall.position(), 1);
        assert!(!progress.overall.is_finished());

        progress.finish_project("web", false, "failed");
        assert_eq!(progress.overall.position(), 2);
        assert!(progress.overall.is_finished());
    }
}
