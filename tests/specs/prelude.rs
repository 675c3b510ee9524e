//! Test helpers for behavioral specifications.
//!
//! Provides a high-level DSL for driving the `varie` CLI end to end
//! against a real `varied` daemon, isolated per test via `VARIE_HOME`/
//! `VARIE_TMP_DIR`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

// Aggressive timeouts for fast tests.
//
// IMPORTANT:
//   Do NOT change these.
//   File a performance bug instead.
const VARIE_TIMEOUT_CONNECT_MS: &str = "2000";
const VARIE_TIMEOUT_EXIT_MS: &str = "500";
const VARIE_TIMEOUT_IPC_MS: &str = "500";
const VARIE_CONNECT_POLL_MS: &str = "5";

pub const SPEC_POLL_INTERVAL_MS: u64 = 10;
pub const SPEC_WAIT_MAX_MS: u64 = 2000;

/// Resolve a workspace binary, checking llvm-cov's target directory first
/// (so coverage runs find the right binary) before falling back to the
/// standard debug profile and finally the test binary's own directory.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

fn varie_binary() -> PathBuf {
    binary_path("varie")
}

pub fn varied_binary() -> PathBuf {
    binary_path("varied")
}

fn varie_cmd() -> Command {
    Command::new(varie_binary())
}

/// Create a CLI builder for `varie` commands.
pub fn cli() -> CliBuilder {
    CliBuilder::new()
}

/// High-level CLI builder for fluent test assertions.
pub struct CliBuilder {
    args: Vec<String>,
    dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl CliBuilder {
    fn new() -> Self {
        Self {
            args: Vec::new(),
            dir: None,
            envs: vec![
                (
                    "VARIE_DAEMON_BINARY".into(),
                    varied_binary().to_string_lossy().into(),
                ),
                (
                    "VARIE_TIMEOUT_CONNECT_MS".into(),
                    VARIE_TIMEOUT_CONNECT_MS.into(),
                ),
                ("VARIE_TIMEOUT_EXIT_MS".into(), VARIE_TIMEOUT_EXIT_MS.into()),
                ("VARIE_TIMEOUT_IPC_MS".into(), VARIE_TIMEOUT_IPC_MS.into()),
                ("VARIE_CONNECT_POLL_MS".into(), VARIE_CONNECT_POLL_MS.into()),
            ],
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn pwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.dir = Some(path.into());
        self
    }

    pub fn env(mut self, key: &str, value: impl AsRef<Path>) -> Self {
        self.envs.push((
            key.to_string(),
            value.as_ref().to_string_lossy().to_string(),
        ));
        self
    }

    pub fn command(self) -> Command {
        let mut cmd = varie_cmd();
        cmd.args(&self.args);

        if let Some(dir) = self.dir {
            cmd.current_dir(dir);
        }

        for (key, value) in self.envs {
            cmd.env(key, value);
        }

        cmd
    }

    /// Run and expect success (exit code 0).
    pub fn passes(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("command should run");
        assert!(
            output.status.success(),
            "expected command to pass, got exit code {:?}\nstdout: {}\nstderr: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }

    /// Run and expect failure (non-zero exit code).
    pub fn fails(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("command should run");
        assert!(
            !output.status.success(),
            "expected command to fail, but it passed\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }
}

/// Result of a CLI run for chaining assertions.
pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            stdout.contains(expected),
            "stdout does not contain '{}'\nstdout: {}",
            expected,
            stdout
        );
        self
    }

    pub fn stdout_lacks(self, unexpected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            !stdout.contains(unexpected),
            "stdout should not contain '{}'\nstdout: {}",
            unexpected,
            stdout
        );
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(
            stderr.contains(expected),
            "stderr does not contain '{}'\nstderr: {}",
            expected,
            stderr
        );
        self
    }
}

// =============================================================================
// Polling
// =============================================================================

/// Poll a condition until it returns true or the timeout is reached.
pub fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);
    let poll_interval = std::time::Duration::from_millis(SPEC_POLL_INTERVAL_MS);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(poll_interval);
    }
    false
}

// =============================================================================
// Project
// =============================================================================

/// Temporary, isolated workstation home: a fresh `VARIE_HOME`/`VARIE_TMP_DIR`
/// pair per test so parallel tests never share a daemon or socket.
pub struct Project {
    home: tempfile::TempDir,
    repo: tempfile::TempDir,
}

impl Project {
    /// Create an empty project with its own repo directory and home.
    pub fn empty() -> Self {
        Self {
            home: tempfile::tempdir().unwrap(),
            repo: tempfile::tempdir().unwrap(),
        }
    }

    /// The repo directory `varie` commands run from.
    pub fn path(&self) -> &Path {
        self.repo.path()
    }

    /// The isolated `VARIE_HOME`/`VARIE_TMP_DIR` root.
    pub fn home_path(&self) -> &Path {
        self.home.path()
    }

    pub fn git_init(&self) {
        Command::new("git")
            .args(["init"])
            .current_dir(self.path())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .expect("git init should work");
    }

    /// Write a file at the given path relative to the repo, creating
    /// parent directories as needed.
    pub fn file(&self, path: impl AsRef<Path>, content: &str) {
        let full_path = self.repo.path().join(path.as_ref());
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full_path, content).unwrap();
    }

    /// Run `varie` in this project's context, with `VARIE_HOME` and
    /// `VARIE_TMP_DIR` pinned to the project's isolated home.
    pub fn varie(&self) -> CliBuilder {
        cli()
            .pwd(self.path())
            .env("VARIE_HOME", self.home_path())
            .env("VARIE_TMP_DIR", self.home_path())
    }

    /// Path to `varied`'s log file (spec.md §6).
    pub fn daemon_log_path(&self) -> PathBuf {
        self.home_path().join(".varie").join("daemon.log")
    }

    pub fn daemon_log(&self) -> String {
        std::fs::read_to_string(self.daemon_log_path())
            .unwrap_or_else(|_| "(no daemon log)".to_string())
    }

    /// Path to the socket descriptor written on startup (spec.md §4.2).
    pub fn descriptor_path(&self) -> PathBuf {
        self.home_path().join(".varie").join("daemon.json")
    }

    /// Path to the control socket itself.
    pub fn socket_path(&self) -> PathBuf {
        self.home_path().join("varie.sock")
    }

    fn daemon_pid(&self) -> Option<u32> {
        let content = std::fs::read_to_string(self.descriptor_path()).ok()?;
        let parsed: serde_json::Value = serde_json::from_str(&content).ok()?;
        parsed.get("pid")?.as_u64().map(|p| p as u32)
    }

    /// Kill the daemon process with SIGKILL (simulates a crash).
    /// Returns true if a pid was found and the signal was sent successfully.
    pub fn daemon_kill(&self) -> bool {
        match self.daemon_pid() {
            Some(pid) => Command::new("kill")
                .args(["-9", &pid.to_string()])
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false),
            None => false,
        }
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        // Always try to stop the daemon; a no-op if it is not running.
        let mut cmd = self.varie().args(&["daemon", "stop"]).command();
        cmd.stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        let _ = cmd.status();
    }
}
