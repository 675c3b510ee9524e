//! Control socket dispatch specs.
//!
//! Exercise `route`/`dispatch`/`list`/`create-worker`/`discover` through
//! the `varie` CLI against a real `varied` (spec.md §4.2, §5).

use crate::prelude::*;

fn json(output: &str) -> serde_json::Value {
    serde_json::from_str(output).expect("response should be valid JSON")
}

#[test]
fn list_workers_is_empty_on_a_fresh_daemon() {
    let temp = Project::empty();
    temp.varie().args(&["daemon", "start"]).passes();

    let out = temp.varie().args(&["list"]).passes().stdout();
    let response = json(&out);
    assert_eq!(response["status"], "ok");
    assert_eq!(response["workers"], serde_json::json!([]));
}

#[test]
fn create_worker_adds_a_worker_session() {
    let temp = Project::empty();
    temp.git_init();
    temp.varie().args(&["daemon", "start"]).passes();

    let repo_path = temp.path().to_string_lossy().into_owned();
    let out = temp
        .varie()
        .args(&["create-worker", "demo-repo", &repo_path])
        .passes()
        .stdout();
    let response = json(&out);
    assert_eq!(response["status"], "ok");
    assert!(response["sessionId"].is_string());

    let listed = temp.varie().args(&["list"]).passes().stdout();
    let listed = json(&listed);
    let workers = listed["workers"].as_array().expect("workers array");
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["repo"], "demo-repo");
}

#[test]
fn dispatch_to_unknown_session_is_rejected() {
    let temp = Project::empty();
    temp.varie().args(&["daemon", "start"]).passes();

    temp.varie()
        .args(&["dispatch", "nonexistent-session", "hello"])
        .fails()
        .stderr_has("daemon rejected request");
}

#[test]
fn dispatch_to_known_session_succeeds() {
    let temp = Project::empty();
    temp.git_init();
    temp.varie().args(&["daemon", "start"]).passes();

    let repo_path = temp.path().to_string_lossy().into_owned();
    let created = temp
        .varie()
        .args(&["create-worker", "demo-repo", &repo_path])
        .passes()
        .stdout();
    let session_id = json(&created)["sessionId"]
        .as_str()
        .expect("sessionId should be a string")
        .to_string();

    let out = temp
        .varie()
        .args(&["dispatch", &session_id, "what's the status?"])
        .passes()
        .stdout();
    let response = json(&out);
    assert_eq!(response["status"], "ok");
    assert_eq!(response["dispatched"], true);
}

#[test]
fn route_with_no_matching_repo_reports_not_found() {
    let temp = Project::empty();
    temp.varie().args(&["daemon", "start"]).passes();

    let out = temp
        .varie()
        .args(&["route", "no-such-repo-anywhere", "hello"])
        .passes()
        .stdout();
    let response = json(&out);
    assert_eq!(response["status"], "ok");
    assert_eq!(response["found"], false);
}

#[test]
fn route_auto_provisions_a_worker_for_a_known_repo() {
    let temp = Project::empty();
    temp.git_init();
    temp.varie().args(&["daemon", "start"]).passes();

    let repo_path = temp.path().to_string_lossy().into_owned();
    temp.varie()
        .args(&["create-worker", "routable-repo", &repo_path])
        .passes();

    let out = temp
        .varie()
        .args(&["route", "routable-repo", "status please"])
        .passes()
        .stdout();
    let response = json(&out);
    assert_eq!(response["status"], "ok");
    assert_eq!(response["dispatched"], true);
}

#[test]
fn discover_refreshes_the_projects_registry() {
    let temp = Project::empty();
    temp.git_init();
    temp.varie().args(&["daemon", "start"]).passes();

    let repo_path = temp.path().to_string_lossy().into_owned();
    let out = temp
        .varie()
        .args(&["discover", &repo_path])
        .passes()
        .stdout();
    let response = json(&out);
    assert_eq!(response["status"], "ok");
    assert!(response["repos"].is_array());
}
