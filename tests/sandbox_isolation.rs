// tests/sandbox_isolation.rs

//! Full runs through the real sandbox with shell-script installers

#![cfg(unix)]

mod common;

use common::{shell_registry, snapshot, write};
use envforge::lookup::StaticCatalog;
use envforge::orchestrator::{FailureReason, LoopOutcome};
use envforge::validator::FailureKind;
use envforge::workspace::DiscoveryOptions;
use envforge::{CancelToken, Ecosystem, Engine, EngineConfig, ExitStatus, PackageIdentity};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Fails while bar 1.2.0 is requested; also tries to litter HOME and TMPDIR
const FAIL_ON_BAR_120: &str = r#"
touch "$HOME/installed" "$TMPDIR/scratch"
cat requirements.txt
if grep -q '^bar==1.2.0' requirements.txt; then
    echo 'ERROR: No matching distribution found for bar==1.2.0' >&2
    exit 1
fi
"#;

fn catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with_versions(
            PackageIdentity::new(Ecosystem::PythonPip, "bar"),
            &["1.0.0", "1.1.0", "1.2.0"],
        )
        .unwrap()
}

fn engine(script: &str, config: EngineConfig) -> Engine {
    Engine::new(config)
        .unwrap()
        .with_registry(shell_registry(script))
        .with_lookup(Arc::new(catalog()))
}

fn offline() -> EngineConfig {
    EngineConfig {
        offline: true,
        ..Default::default()
    }
}

#[test]
fn validation_never_touches_project() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "requirements.txt", "bar>=1.0\n");
    write(dir.path(), "app/main.py", "import bar\n");
    let before = snapshot(dir.path());

    let engine = engine(FAIL_ON_BAR_120, offline());
    let projects = engine.discover(dir.path(), &DiscoveryOptions::default()).unwrap();
    assert_eq!(projects.len(), 1);
    let run = engine.run_project(&projects[0]).unwrap();

    assert_eq!(run.report.result.outcome, LoopOutcome::Accepted);
    assert_eq!(run.report.history().len(), 2);
    let accepted = run.report.accepted().unwrap();
    let bar = accepted.get(&PackageIdentity::new(Ecosystem::PythonPip, "bar")).unwrap();
    assert_eq!(bar.version.to_string(), "1.1.0");
    assert!(bar.auto_fixed);
    assert_eq!(run.report.exit_status(), ExitStatus::NeedsReview);

    // Failure was attributed from the installer output
    let first = run.report.history()[0].validation.as_ref().unwrap();
    assert_eq!(first.failing_packages.len(), 1);
    assert!(first.diagnostic_log.contains("No matching distribution found for bar==1.2.0"));

    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn timeout_is_a_failed_validation() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "requirements.txt", "bar==1.0.0\n");

    let config = EngineConfig {
        validation_timeout_secs: 1,
        retry_budget: 1,
        ..offline()
    };
    let engine = engine("sleep 30", config);
    let projects = engine.discover(dir.path(), &DiscoveryOptions::default()).unwrap();

    let started = Instant::now();
    let run = engine.run_project(&projects[0]).unwrap();
    assert!(started.elapsed() < Duration::from_secs(20));

    assert_eq!(run.report.result.outcome, LoopOutcome::Failed(FailureReason::RetryBudgetExhausted));
    let validation = run.report.history()[0].validation.as_ref().unwrap();
    assert_eq!(validation.failure, Some(FailureKind::TimedOut));
    assert_eq!(run.report.exit_status(), ExitStatus::Failed);
}

#[test]
fn cancellation_stops_running_install() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "requirements.txt", "bar==1.0.0\n");

    let cancel = CancelToken::new();
    let engine = engine("sleep 30", offline()).with_cancel_token(cancel.clone());
    let projects = engine.discover(dir.path(), &DiscoveryOptions::default()).unwrap();

    let trigger = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            cancel.cancel();
        })
    };
    let started = Instant::now();
    let run = engine.run_project(&projects[0]).unwrap();
    trigger.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(20));
    assert_eq!(run.report.result.outcome, LoopOutcome::Failed(FailureReason::Cancelled));
    assert_eq!(run.report.history().len(), 1);
    assert!(run.files.is_empty());
}

#[test]
fn monorepo_projects_run_independently() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "services/good/requirements.txt", "bar==1.0.0\n");
    write(dir.path(), "services/bad/requirements.txt", "bar==1.2.0\n");
    let before = snapshot(dir.path());

    let config = EngineConfig {
        retry_budget: 1,
        ..offline()
    };
    let engine = engine(FAIL_ON_BAR_120, config);
    let projects = engine.discover(dir.path(), &DiscoveryOptions::default()).unwrap();
    let labels: Vec<String> = projects.iter().map(|p| p.label()).collect();
    assert_eq!(labels, vec!["services/bad (python-pip)", "services/good (python-pip)"]);

    let runs = engine.run_all(&projects).unwrap();
    assert_eq!(
        runs[0].report.result.outcome,
        LoopOutcome::Failed(FailureReason::RetryBudgetExhausted)
    );
    assert_eq!(runs[1].report.result.outcome, LoopOutcome::Accepted);
    assert!(runs[0].files.is_empty());
    assert!(!runs[1].files.is_empty());

    assert_eq!(snapshot(dir.path()), before);
}
