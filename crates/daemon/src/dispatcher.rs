// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher & Repo Resolver glue (spec.md §4.3): turns a user-intent
//! payload into a write to exactly one session, auto-provisioning a
//! worker on a registry hit with no live match.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use varie_adapters::resolver::fuzzy::{self, MatchCandidate};
use varie_adapters::{RepoResolver, ResolveOutcome, SessionAdapter};
use varie_core::{Clock, DaemonError, IdGen, SessionId, SessionKind, TaskId};
use varie_storage::{FlagFile, ProjectEntry, ProjectsIndex, RepoEntry};

use crate::protocol::{Response, WorkerSummary};
use crate::session_manager::SessionManager;

const MAX_TARGET_SESSION_ID: usize = 128;
const MAX_QUERY: usize = 512;
const MAX_REPO: usize = 256;
const MAX_REPO_PATH: usize = 1024;
const MAX_MESSAGE: usize = 4096;

const AUTO_PROVISION_READY_TIMEOUT: Duration = Duration::from_secs(30);
const AUTO_PROVISION_SETTLE: Duration = Duration::from_millis(500);

fn check_bounds(value: &str, max: usize, field: &str) -> Result<(), DaemonError> {
    if value.is_empty() || value.len() > max {
        return Err(DaemonError::InvalidInput(format!(
            "{field} must be non-empty and at most {max} bytes"
        )));
    }
    Ok(())
}

/// Expand a leading `~`, normalise `..`/`.` components, then require the
/// result be rooted at the user's home directory, the system temp
/// prefix, or a platform install prefix (spec.md §4.3 "Input
/// validation").
pub fn validate_path(raw: &str, home: &Path) -> Result<PathBuf, DaemonError> {
    let expanded = if let Some(rest) = raw.strip_prefix("~/") {
        home.join(rest)
    } else if raw == "~" {
        home.to_path_buf()
    } else {
        PathBuf::from(raw)
    };

    let mut normalised = PathBuf::new();
    for component in expanded.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                normalised.pop();
            }
            Component::CurDir => {}
            other => normalised.push(other.as_os_str()),
        }
    }

    let tmp = std::env::temp_dir();
    let allowed = normalised.starts_with(home)
        || normalised.starts_with(&tmp)
        || normalised.starts_with("/usr")
        || normalised.starts_with("/opt")
        || normalised.starts_with("/Applications");

    if !allowed {
        return Err(DaemonError::InvalidInput(format!(
            "path {} is not rooted at home, temp, or an install prefix",
            normalised.display()
        )));
    }

    Ok(normalised)
}

/// Normalise a repo name for the false-positive guard comparison:
/// lowercase, `_`/`-` stripped (spec.md §4.3 "False-positive guard").
fn normalize_repo_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect()
}

pub struct Dispatcher<A, C, I> {
    sessions: SessionManager<A, C, I>,
    resolver: Arc<RepoResolver>,
    home: PathBuf,
    manager_dir: PathBuf,
    projects_path: PathBuf,
    assistant_cmd: String,
    clock: Arc<C>,
}

impl<A, C, I> Dispatcher<A, C, I>
where
    A: SessionAdapter,
    C: Clock,
    I: IdGen,
{
    pub fn new(
        sessions: SessionManager<A, C, I>,
        resolver: Arc<RepoResolver>,
        home: PathBuf,
        manager_dir: PathBuf,
        projects_path: PathBuf,
        assistant_cmd: String,
        clock: Arc<C>,
    ) -> Self {
        Self {
            sessions,
            resolver,
            home,
            manager_dir,
            projects_path,
            assistant_cmd,
            clock,
        }
    }

    /// Repo name for a live session, if any (used by the relay task to
    /// fill in `sessionRepo` on command results).
    pub fn repo_of(&self, session_id: &str) -> Option<String> {
        self.sessions
            .get(&SessionId::from(session_id.to_string()))
            .map(|s| s.repo)
    }

    pub fn list_workers(&self) -> Response {
        let workers: Vec<WorkerSummary> = self
            .sessions
            .list()
            .into_iter()
            .map(|s| WorkerSummary {
                session_id: s.id.as_str().to_string(),
                repo: s.repo,
                task_id: s.task_id.map(|t| t.as_str().to_string()),
                last_activity: s.last_activity,
            })
            .collect();
        Response {
            workers: Some(workers),
            ..Response::ok()
        }
    }

    pub async fn dispatch(&self, target_session_id: &str, message: &str) -> Response {
        if let Err(e) = check_bounds(target_session_id, MAX_TARGET_SESSION_ID, "targetSessionId") {
            return Response::error(e.message());
        }
        if let Err(e) = check_bounds(message, MAX_MESSAGE, "message") {
            return Response::error(e.message());
        }
        let id = SessionId::from(target_session_id.to_string());
        let (ensure_assistant, message) = self.consume_pending_flag_file(target_session_id, message);
        match self
            .sessions
            .dispatch(&id, &message, ensure_assistant, true)
            .await
        {
            Ok(()) => Response {
                dispatched: Some(true),
                session_id: Some(target_session_id.to_string()),
                ..Response::ok()
            },
            Err(e) => Response::error(e.message()),
        }
    }

    /// Fold in a pending flag file left by a hook script, if any (spec.md
    /// §4.4 "Flag files"): a `restart` flag forces the assistant to be
    /// restarted before the message is sent; any section body is folded
    /// in as leading context. Consumed at most once, by this prompt.
    fn consume_pending_flag_file(&self, session_id: &str, message: &str) -> (bool, String) {
        let path = varie_storage::paths::flag_file_path(&self.home, session_id);
        let flag = match FlagFile::read_and_remove(&path) {
            Ok(Some(flag)) => flag,
            Ok(None) => return (false, message.to_string()),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "failed to read pending flag file");
                return (false, message.to_string());
            }
        };
        let ensure_assistant = flag.kind() == Some("restart");
        let context: Vec<&String> = flag.sections.values().collect();
        if context.is_empty() {
            (ensure_assistant, message.to_string())
        } else {
            let joined = context
                .into_iter()
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");
            (ensure_assistant, format!("{joined}\n\n{message}"))
        }
    }

    /// Best-effort idempotent injection of the managed-section marker
    /// into a repo's `CLAUDE.md` as it gains a worker session (spec.md
    /// §4.4 "CLAUDE.md injection"). A missing file or I/O error is
    /// logged, never fatal to provisioning.
    fn inject_marker(&self, repo: &str, path: &Path) {
        let claude_md = path.join("CLAUDE.md");
        if let Err(e) = varie_storage::marker::inject(&claude_md) {
            warn!(repo = %repo, error = %e, "failed to inject CLAUDE.md marker section");
        }
    }

    pub async fn create_worker(
        &self,
        repo: &str,
        repo_path: &str,
        task_id: Option<String>,
        claude_flags: Option<String>,
    ) -> Response {
        if let Err(e) = check_bounds(repo, MAX_REPO, "repo") {
            return Response::error(e.message());
        }
        if let Err(e) = check_bounds(repo_path, MAX_REPO_PATH, "repoPath") {
            return Response::error(e.message());
        }
        let path = match validate_path(repo_path, &self.home) {
            Ok(p) => p,
            Err(e) => return Response::error(e.message()),
        };

        self.inject_marker(repo, &path);

        let result = self
            .sessions
            .create(
                repo,
                &path,
                SessionKind::Worker,
                task_id.map(TaskId::new),
                claude_flags,
                &self.assistant_cmd,
                &self.home,
                &self.manager_dir,
            )
            .await;

        match result {
            Ok(id) => Response {
                session_id: Some(id.as_str().to_string()),
                ..Response::ok()
            },
            Err(e) => Response::error(e.message()),
        }
    }

    /// Fuzzy-match or auto-provision, then write (spec.md §4.3 `route`).
    pub async fn route(&self, query: &str, message: &str) -> Response {
        if let Err(e) = check_bounds(query, MAX_QUERY, "query") {
            return Response::error(e.message());
        }
        if let Err(e) = check_bounds(message, MAX_MESSAGE, "message") {
            return Response::error(e.message());
        }

        let sessions = self.sessions.list();
        let now = chrono::Utc::now();
        let path_strings: Vec<String> = sessions
            .iter()
            .map(|s| s.path.to_string_lossy().to_string())
            .collect();
        let candidates: Vec<MatchCandidate> = sessions
            .iter()
            .zip(path_strings.iter())
            .map(|(s, path)| MatchCandidate {
                session_id: s.id.as_str(),
                repo: &s.repo,
                task_id: s.task_id.as_ref().map(|t| t.as_str()),
                path: path.as_str(),
                last_activity: s.last_activity,
            })
            .collect();

        let outcome = fuzzy::best_match(query, None, &candidates, now);

        if let fuzzy::FuzzyOutcome::Matched(session_id) = outcome {
            if self.passes_false_positive_guard(query, &sessions, &session_id) {
                return self.dispatch(&session_id, message).await;
            }
        }

        let mut resolved = self.resolver.resolve(query);
        if matches!(resolved, ResolveOutcome::NotFound) {
            resolved = self.rescan_and_retry(query);
        }

        match resolved {
            ResolveOutcome::Found(record) => self.auto_provision_and_dispatch(record, message).await,
            ResolveOutcome::Ambiguous(suggestions) => Response {
                found: Some(false),
                ambiguous: Some(true),
                suggestions: Some(suggestions),
                ..Response::ok()
            },
            ResolveOutcome::NotFound => Response {
                found: Some(false),
                ..Response::ok()
            },
        }
    }

    /// On a resolve miss, perform at most one filesystem rescan per
    /// cooldown window and retry the resolve once (spec.md §4.3 "Repo
    /// Resolver internals"). Outside the cooldown window this is a
    /// no-op that reports the original miss.
    fn rescan_and_retry(&self, query: &str) -> ResolveOutcome {
        if !self.resolver.rescan_due() {
            return ResolveOutcome::NotFound;
        }
        match varie_adapters::discover(&self.manager_dir) {
            Ok(records) => self.resolver.ingest_scanned(records),
            Err(e) => {
                warn!(error = %e, "filesystem rescan on resolve miss failed");
                return ResolveOutcome::NotFound;
            }
        }
        self.resolver.mark_rescanned();
        self.resolver.resolve(query)
    }

    fn passes_false_positive_guard(
        &self,
        query: &str,
        sessions: &[varie_core::Session],
        matched_session_id: &str,
    ) -> bool {
        let Some(session) = sessions.iter().find(|s| s.id.as_str() == matched_session_id) else {
            return false;
        };
        match self.resolver.resolve(query) {
            ResolveOutcome::Found(record) => {
                normalize_repo_name(&record.name) == normalize_repo_name(&session.repo)
            }
            _ => true,
        }
    }

    async fn auto_provision_and_dispatch(
        &self,
        record: varie_core::RepoRecord,
        message: &str,
    ) -> Response {
        self.inject_marker(&record.name, &record.absolute_path);

        let created = self
            .sessions
            .create(
                record.name.clone(),
                &record.absolute_path,
                SessionKind::Worker,
                None,
                None,
                &self.assistant_cmd,
                &self.home,
                &self.manager_dir,
            )
            .await;

        let id = match created {
            Ok(id) => id,
            Err(e) => return Response::error(e.message()),
        };

        let ready = self
            .sessions
            .wait_for_assistant_ready(&id, AUTO_PROVISION_READY_TIMEOUT)
            .await;
        self.clock.sleep(AUTO_PROVISION_SETTLE).await;

        if !ready {
            return Response {
                session_id: Some(id.as_str().to_string()),
                dispatched: Some(false),
                message: Some("session created but assistant did not become ready".to_string()),
                ..Response::ok()
            };
        }

        match self.sessions.dispatch(&id, message, false, true).await {
            Ok(()) => Response {
                dispatched: Some(true),
                session_id: Some(id.as_str().to_string()),
                ..Response::ok()
            },
            Err(e) => Response {
                session_id: Some(id.as_str().to_string()),
                dispatched: Some(false),
                message: Some(e.message()),
                ..Response::ok()
            },
        }
    }

    /// Walk the filesystem for repos, merge into the projects index, and
    /// refresh the resolver's scanned cache (spec.md §4.3 `discover`).
    pub async fn discover_projects(&self, path: Option<String>) -> Response {
        let root = match path {
            Some(p) => match validate_path(&p, &self.home) {
                Ok(p) => p,
                Err(e) => return Response::error(e.message()),
            },
            None => self.manager_dir.clone(),
        };

        let found = match varie_adapters::discover(&root) {
            Ok(records) => records,
            Err(e) => return Response::error(e.to_string()),
        };

        let mut index = match ProjectsIndex::load(&self.projects_path) {
            Ok(i) => i,
            Err(e) => return Response::error(e.to_string()),
        };

        self.resolver.ingest_scanned(found.iter().cloned());

        let mut repos = Vec::new();
        for record in &found {
            repos.push(record.name.clone());
            if !index.projects.contains_key(&record.name) {
                let status = if record.has_marker_file {
                    "active"
                } else {
                    "discovered"
                };
                index.projects.insert(
                    record.name.clone(),
                    ProjectEntry {
                        status: Some(status.to_string()),
                        current_feature: None,
                        last_updated: Some(chrono::Utc::now().to_rfc3339()),
                        repos: vec![RepoEntry {
                            path: record.absolute_path.to_string_lossy().to_string(),
                            role: None,
                        }],
                    },
                );
            }
        }

        if let Err(e) = index.save(&self.projects_path) {
            return Response::error(e.to_string());
        }

        Response {
            repos: Some(repos),
            ..Response::ok()
        }
    }
}
