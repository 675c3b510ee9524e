// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `varied` process management: starting, stopping, and probing the
//! daemon process from the CLI side.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use varie_daemon::lifecycle::Config;

use crate::client::ClientError;

/// Start `varied` in the background, returning the child process handle.
pub fn start_daemon_background() -> Result<std::process::Child, ClientError> {
    let path = find_daemon_binary();
    Command::new(&path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))
}

/// Stop the daemon with SIGTERM, polling for exit, escalating to SIGKILL.
pub fn stop_daemon_sync(config: &Config) {
    if let Some(pid) = read_daemon_pid(config) {
        kill_signal("-15", pid);

        let start = Instant::now();
        let timeout = crate::env::timeout_exit_ms().unwrap_or(Duration::from_secs(2));
        while start.elapsed() < timeout {
            if !process_exists(pid) {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        if process_exists(pid) {
            kill_signal("-9", pid);
        }
    }
}

fn find_daemon_binary() -> PathBuf {
    if let Some(path) = crate::env::daemon_binary() {
        return PathBuf::from(path);
    }

    let current_exe = std::env::current_exe().ok();

    let is_debug_build = current_exe
        .as_ref()
        .and_then(|p| p.to_str())
        .map(|s| s.contains("target/debug"))
        .unwrap_or(false);

    if is_debug_build {
        if let Some(manifest_dir) = crate::env::cargo_manifest_dir() {
            let dev_path = PathBuf::from(manifest_dir)
                .parent()
                .and_then(|p| p.parent())
                .map(|p| p.join("target/debug/varied"));
            if let Some(path) = dev_path {
                if path.exists() {
                    return path;
                }
            }
        }
    }

    if let Some(ref exe) = current_exe {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("varied");
            if sibling.exists() {
                return sibling;
            }
        }
    }

    PathBuf::from("varied")
}

/// Read the daemon's PID from its socket descriptor file.
pub fn read_daemon_pid(config: &Config) -> Option<u32> {
    let content = std::fs::read_to_string(&config.daemon_descriptor_path).ok()?;
    let parsed: serde_json::Value = serde_json::from_str(&content).ok()?;
    parsed.get("pid")?.as_u64().map(|p| p as u32)
}

fn kill_signal(signal: &str, pid: u32) -> bool {
    Command::new("kill")
        .args([signal, &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn process_exists(pid: u32) -> bool {
    kill_signal("-0", pid)
}

/// Probe whether a Unix socket is accepting connections.
pub fn probe_socket(socket_path: &std::path::Path) -> bool {
    std::os::unix::net::UnixStream::connect(socket_path).is_ok()
}

/// Remove a stale socket left behind by a daemon that is no longer
/// running, so a fresh one can bind cleanly.
pub fn cleanup_stale_socket(config: &Config) {
    let running = read_daemon_pid(config).is_some_and(process_exists);
    if !running && config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
}
