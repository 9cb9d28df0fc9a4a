// src/sandbox/mod.rs

//! Disposable execution context for dependency installation
//!
//! A sandbox is a scratch directory tree with its own `HOME`, `TMPDIR` and
//! package caches. Install steps run inside it with a cleared environment,
//! no stdin, and a hard timeout. The whole tree is deleted when the
//! [`Sandbox`] is dropped, whichever way the attempt ended.
//!
//! Layout:
//!
//! ```text
//! <scratch>/
//!   work/        manifests are written here; cwd of every step
//!   home/        HOME
//!   tmp/         TMPDIR
//!   cache/       per-tool download caches
//!   output.log   combined stdout/stderr of all steps
//! ```

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::manifest::ManifestFile;
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Default install timeout (10 minutes)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// How often a running step checks for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Variables passed through from the caller's environment
const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "LANG",
    "LC_ALL",
    "TERM",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    "http_proxy",
    "https_proxy",
    "no_proxy",
    "SSL_CERT_FILE",
    "SSL_CERT_DIR",
];

const LOG_FILE: &str = "output.log";

/// Sandbox configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Per-step timeout
    pub timeout: Duration,
    /// Environment variables inherited from the caller
    pub env_allowlist: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SandboxConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn allow_env(mut self, name: &str) -> Self {
        self.env_allowlist.push(name.to_string());
        self
    }
}

/// Directories inside a sandbox
#[derive(Debug, Clone)]
pub struct SandboxPaths {
    pub root: PathBuf,
    pub work: PathBuf,
    pub home: PathBuf,
    pub tmp: PathBuf,
    pub cache: PathBuf,
}

impl SandboxPaths {
    fn under(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            work: root.join("work"),
            home: root.join("home"),
            tmp: root.join("tmp"),
            cache: root.join("cache"),
        }
    }
}

/// One installer command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl InstallStep {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Shell-like rendering for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed { exit_code: Option<i32> },
    TimedOut,
}

impl StepOutcome {
    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            StepOutcome::Succeeded
        } else {
            StepOutcome::Failed {
                exit_code: status.code(),
            }
        }
    }
}

/// Kills the step's process group and reaps it unless disarmed
struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    fn disarm(&mut self) {
        self.child = None;
    }

    fn child(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            kill_group(child.id());
            if let Err(e) = child.kill() {
                debug!("Failed to kill step process {}: {}", child.id(), e);
            }
            if let Err(e) = child.wait() {
                debug!("Failed to reap step process {}: {}", child.id(), e);
            }
        }
    }
}

/// SIGKILL everything left in a step's process group
///
/// The step runs as its own group leader, so this reaches installer
/// grandchildren too. An empty group is not an error.
fn kill_group(leader: u32) {
    let Ok(pid) = i32::try_from(leader) else {
        debug!("Process id {} out of range; not signalling its group", leader);
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => debug!("Failed to kill process group {}: {}", pid, e),
    }
}

/// An isolated scratch context, removed on drop
pub struct Sandbox {
    paths: SandboxPaths,
    config: SandboxConfig,
    cancel: CancelToken,
    // Dropped last: deleting the tree is the final teardown step
    scratch: TempDir,
}

impl Sandbox {
    /// Create the scratch tree
    pub fn create(config: SandboxConfig, cancel: CancelToken) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("envforge-")
            .tempdir()
            .map_err(|e| Error::SandboxUnavailable(format!("cannot create scratch directory: {}", e)))?;
        let paths = SandboxPaths::under(scratch.path());

        for dir in [&paths.work, &paths.home, &paths.tmp, &paths.cache] {
            fs::create_dir_all(dir)
                .map_err(|e| Error::SandboxUnavailable(format!("cannot create {}: {}", dir.display(), e)))?;
        }
        File::create(paths.root.join(LOG_FILE))
            .map_err(|e| Error::SandboxUnavailable(format!("cannot create log file: {}", e)))?;

        debug!("Created sandbox at {}", paths.root.display());
        Ok(Self {
            paths,
            config,
            cancel,
            scratch,
        })
    }

    pub fn paths(&self) -> &SandboxPaths {
        &self.paths
    }

    pub fn root(&self) -> &Path {
        self.scratch.path()
    }

    /// Write rendered manifests into the work directory
    pub fn write_manifests(&self, files: &[ManifestFile]) -> Result<()> {
        for file in files {
            file.write_into(&self.paths.work)?;
        }
        Ok(())
    }

    /// Combined output of every step run so far
    pub fn read_log(&self) -> String {
        match fs::read(self.paths.root.join(LOG_FILE)) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!("Failed to read sandbox log: {}", e);
                String::new()
            }
        }
    }

    /// Check that every step's program can be found
    pub fn check_tools(&self, steps: &[InstallStep]) -> Result<()> {
        for step in steps {
            // Programs inside the sandbox (venv/bin/pip) appear only after
            // earlier steps have run
            if Path::new(&step.program).starts_with(&self.paths.root) {
                continue;
            }
            if which::which(&step.program).is_err() {
                return Err(Error::ToolNotFound(step.program.clone()));
            }
        }
        Ok(())
    }

    /// Run one step to completion, timeout or cancellation
    ///
    /// Cancellation is checked before spawning and between polls; a
    /// cancelled or timed-out step has its whole process group killed.
    pub fn run(&self, step: &InstallStep) -> Result<StepOutcome> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut log = OpenOptions::new()
            .append(true)
            .open(self.paths.root.join(LOG_FILE))
            .map_err(|e| Error::SandboxUnavailable(format!("cannot open log file: {}", e)))?;
        writeln!(log, "$ {}", step.command_line())?;
        let stdout = log.try_clone()?;

        let mut command = Command::new(&step.program);
        command
            .args(&step.args)
            .current_dir(&self.paths.work)
            .env_clear();
        for key in &self.config.env_allowlist {
            if let Ok(value) = std::env::var(key) {
                command.env(key, value);
            }
        }
        command
            .env("HOME", &self.paths.home)
            .env("TMPDIR", &self.paths.tmp)
            .env("XDG_CACHE_HOME", &self.paths.cache)
            .envs(step.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(log))
            .process_group(0);

        info!("Running {}", step.command_line());
        let child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ToolNotFound(step.program.clone()),
            _ => Error::SandboxUnavailable(format!("failed to spawn {}: {}", step.program, e)),
        })?;

        let mut guard = ChildGuard { child: Some(child) };
        let started = Instant::now();

        loop {
            let remaining = self.config.timeout.saturating_sub(started.elapsed());
            let Some(child) = guard.child() else {
                return Err(Error::SandboxUnavailable("step process lost".to_string()));
            };
            match child.wait_timeout(remaining.min(POLL_INTERVAL))? {
                Some(status) => {
                    let leader = child.id();
                    guard.disarm();
                    // Background jobs must not outlive the sandbox tree
                    kill_group(leader);
                    let outcome = StepOutcome::from_status(status);
                    debug!("{} finished: {:?}", step.program, outcome);
                    return Ok(outcome);
                }
                None if self.cancel.is_cancelled() => {
                    warn!("Cancelling {}", step.command_line());
                    drop(guard);
                    return Err(Error::Cancelled);
                }
                None if started.elapsed() >= self.config.timeout => {
                    warn!(
                        "{} timed out after {} seconds",
                        step.program,
                        self.config.timeout.as_secs()
                    );
                    drop(guard);
                    return Ok(StepOutcome::TimedOut);
                }
                None => {}
            }
        }
    }

    /// Run steps in order, stopping at the first one that does not succeed
    pub fn run_all(&self, steps: &[InstallStep]) -> Result<StepOutcome> {
        for step in steps {
            let outcome = self.run(step)?;
            if outcome != StepOutcome::Succeeded {
                return Ok(outcome);
            }
        }
        Ok(StepOutcome::Succeeded)
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        debug!("Tearing down sandbox {}", self.paths.root.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> InstallStep {
        InstallStep::new("/bin/sh").arg("-c").arg(script)
    }

    fn sandbox(timeout: Duration) -> Sandbox {
        Sandbox::create(SandboxConfig::default().with_timeout(timeout), CancelToken::new()).unwrap()
    }

    #[test]
    fn test_layout_and_teardown() {
        let sb = sandbox(DEFAULT_TIMEOUT);
        let root = sb.root().to_path_buf();
        assert!(sb.paths().work.is_dir());
        assert!(sb.paths().home.is_dir());
        assert!(root.join(LOG_FILE).is_file());
        drop(sb);
        assert!(!root.exists());
    }

    #[test]
    fn test_step_runs_in_work_dir_with_scratch_home() {
        let sb = sandbox(DEFAULT_TIMEOUT);
        let outcome = sb.run(&sh("pwd > where.txt; echo \"$HOME\" >> where.txt")).unwrap();
        assert_eq!(outcome, StepOutcome::Succeeded);
        let written = fs::read_to_string(sb.paths().work.join("where.txt")).unwrap();
        let root = sb.root().canonicalize().unwrap();
        for line in written.lines() {
            let path = Path::new(line).canonicalize().unwrap();
            assert!(path.starts_with(&root), "{} escaped the sandbox", line);
        }
    }

    #[test]
    fn test_failure_exit_code_and_log() {
        let sb = sandbox(DEFAULT_TIMEOUT);
        let outcome = sb.run(&sh("echo 'ERROR: boom' >&2; exit 3")).unwrap();
        assert_eq!(outcome, StepOutcome::Failed { exit_code: Some(3) });
        let log = sb.read_log();
        assert!(log.contains("$ /bin/sh -c"));
        assert!(log.contains("ERROR: boom"));
    }

    #[test]
    fn test_timeout_kills_step() {
        let sb = sandbox(Duration::from_millis(300));
        let started = Instant::now();
        let outcome = sb.run(&sh("sleep 10")).unwrap();
        assert_eq!(outcome, StepOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_background_job_killed_after_success() {
        let outside = TempDir::new().unwrap();
        let marker = outside.path().join("late");
        let sb = sandbox(DEFAULT_TIMEOUT);
        let script = format!("(sleep 1; touch '{}') & exit 0", marker.display());

        assert_eq!(sb.run(&sh(&script)).unwrap(), StepOutcome::Succeeded);
        std::thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
    }

    #[test]
    fn test_timeout_kills_grandchildren() {
        let outside = TempDir::new().unwrap();
        let marker = outside.path().join("late");
        let sb = sandbox(Duration::from_millis(300));
        let script = format!("(sleep 1; touch '{}') & sleep 10", marker.display());

        assert_eq!(sb.run(&sh(&script)).unwrap(), StepOutcome::TimedOut);
        std::thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
    }

    #[test]
    fn test_cancel_before_spawn() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let sb = Sandbox::create(SandboxConfig::default(), cancel).unwrap();
        assert!(matches!(sb.run(&sh("true")), Err(Error::Cancelled)));
    }

    #[test]
    fn test_cancel_while_running() {
        let cancel = CancelToken::new();
        let sb = Sandbox::create(SandboxConfig::default(), cancel.clone()).unwrap();
        let trigger = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            cancel.cancel();
        });
        let started = Instant::now();
        assert!(matches!(sb.run(&sh("sleep 10")), Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
        trigger.join().unwrap();
    }

    #[test]
    fn test_missing_tool() {
        let sb = sandbox(DEFAULT_TIMEOUT);
        let step = InstallStep::new("envforge-no-such-installer");
        assert!(matches!(sb.check_tools(&[step.clone()]), Err(Error::ToolNotFound(_))));
        assert!(matches!(sb.run(&step), Err(Error::ToolNotFound(_))));
    }

    #[test]
    fn test_run_all_stops_at_first_failure() {
        let sb = sandbox(DEFAULT_TIMEOUT);
        let outcome = sb
            .run_all(&[sh("touch one"), sh("exit 1"), sh("touch three")])
            .unwrap();
        assert_eq!(outcome, StepOutcome::Failed { exit_code: Some(1) });
        assert!(sb.paths().work.join("one").exists());
        assert!(!sb.paths().work.join("three").exists());
    }
}
