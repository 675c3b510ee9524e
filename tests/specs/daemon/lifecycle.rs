//! Daemon lifecycle specs.
//!
//! Verify `varie daemon start/stop/status` against a real `varied`
//! process, and that its well-known files show up where spec.md §6
//! says they will.

use crate::prelude::*;

#[test]
fn daemon_status_reports_not_running_before_start() {
    let temp = Project::empty();

    temp.varie()
        .args(&["daemon", "status"])
        .passes()
        .stdout_has("varied is not running");
}

#[test]
fn daemon_start_reports_success() {
    let temp = Project::empty();

    temp.varie()
        .args(&["daemon", "start"])
        .passes()
        .stdout_has("varied listening on");
}

#[test]
fn daemon_status_shows_running_after_start() {
    let temp = Project::empty();
    temp.varie().args(&["daemon", "start"]).passes();

    temp.varie()
        .args(&["daemon", "status"])
        .passes()
        .stdout_has("varied running at");
}

#[test]
fn daemon_start_is_idempotent() {
    let temp = Project::empty();
    temp.varie().args(&["daemon", "start"]).passes();
    // A second start should reuse the already-running daemon rather
    // than failing to bind the socket a second time.
    temp.varie()
        .args(&["daemon", "start"])
        .passes()
        .stdout_has("varied listening on");
}

#[test]
fn daemon_stop_reports_success() {
    let temp = Project::empty();
    temp.varie().args(&["daemon", "start"]).passes();

    temp.varie()
        .args(&["daemon", "stop"])
        .passes()
        .stdout_has("varied stopped");
}

#[test]
fn daemon_stop_reports_not_running_when_already_stopped() {
    let temp = Project::empty();

    temp.varie()
        .args(&["daemon", "stop"])
        .passes()
        .stdout_has("varied was not running");
}

#[test]
fn daemon_status_reports_not_running_after_stop() {
    let temp = Project::empty();
    temp.varie().args(&["daemon", "start"]).passes();
    temp.varie().args(&["daemon", "stop"]).passes();

    temp.varie()
        .args(&["daemon", "status"])
        .passes()
        .stdout_has("varied is not running");
}

#[test]
fn daemon_writes_descriptor_file() {
    let temp = Project::empty();
    temp.varie().args(&["daemon", "start"]).passes();

    let has_descriptor = wait_for(SPEC_WAIT_MAX_MS, || temp.descriptor_path().exists());
    assert!(has_descriptor, "daemon.json should exist after start");

    let contents = std::fs::read_to_string(temp.descriptor_path()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert!(parsed["pid"].is_number());
    assert!(parsed["socketPath"].is_string());
}

#[test]
fn daemon_creates_socket_file() {
    let temp = Project::empty();
    temp.varie().args(&["daemon", "start"]).passes();

    let has_socket = wait_for(SPEC_WAIT_MAX_MS, || temp.socket_path().exists());
    assert!(has_socket, "control socket should exist after start");
}

#[test]
fn daemon_socket_is_removed_on_graceful_stop() {
    let temp = Project::empty();
    temp.varie().args(&["daemon", "start"]).passes();
    wait_for(SPEC_WAIT_MAX_MS, || temp.socket_path().exists());

    temp.varie().args(&["daemon", "stop"]).passes();

    let gone = wait_for(SPEC_WAIT_MAX_MS, || !temp.socket_path().exists());
    assert!(gone, "control socket should be removed after stop");
}

#[test]
fn daemon_recovers_after_crash() {
    let temp = Project::empty();
    temp.varie().args(&["daemon", "start"]).passes();
    wait_for(SPEC_WAIT_MAX_MS, || temp.socket_path().exists());

    let killed = temp.daemon_kill();
    assert!(killed, "should be able to kill daemon");

    let dead = wait_for(SPEC_WAIT_MAX_MS, || {
        !temp
            .varie()
            .args(&["daemon", "status"])
            .passes()
            .stdout()
            .contains("varied running at")
    });
    assert!(dead, "daemon should be reported dead after kill");

    // Stale socket from the crash must not prevent a clean restart.
    temp.varie()
        .args(&["daemon", "start"])
        .passes()
        .stdout_has("varied listening on");

    temp.varie()
        .args(&["daemon", "status"])
        .passes()
        .stdout_has("varied running at");
}
