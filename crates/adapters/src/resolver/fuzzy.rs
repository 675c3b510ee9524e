// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fuzzy match scoring for routing a free-text query to a live worker
//! session (spec.md §4.3 "Fuzzy match scoring").
//!
//! This is deliberately decoupled from the session table's concrete
//! type: callers project each live session into a [`MatchCandidate`]
//! and get back the single highest scorer, if any clears the threshold.

use chrono::{DateTime, Utc};

const THRESHOLD: i32 = 50;

/// One session's matchable attributes, as seen by the scorer.
#[derive(Debug, Clone)]
pub struct MatchCandidate<'a> {
    pub session_id: &'a str,
    pub repo: &'a str,
    pub task_id: Option<&'a str>,
    pub path: &'a str,
    pub last_activity: DateTime<Utc>,
}

/// Outcome of a fuzzy match attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuzzyOutcome {
    Matched(String),
    NoMatch,
}

fn terms(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_ascii_lowercase())
}

/// Score one candidate against `query` (and, if supplied, a task id).
pub fn score(query: &str, task_query: Option<&str>, candidate: &MatchCandidate, now: DateTime<Utc>) -> i32 {
    let q = query.to_ascii_lowercase();
    let repo = candidate.repo.to_ascii_lowercase();
    let path = candidate.path.to_ascii_lowercase();
    let mut total = 0i32;

    if repo == q {
        total += 100;
    }
    if let (Some(tq), Some(task)) = (task_query, candidate.task_id) {
        if tq.eq_ignore_ascii_case(task) {
            total += 80;
        } else if task.to_ascii_lowercase().contains(&tq.to_ascii_lowercase()) {
            total += 30;
        }
    }
    if repo.contains(&q) {
        total += 50;
    }
    if q.contains(&repo) && !repo.is_empty() {
        total += 40;
    }
    if path.contains(&q) {
        total += 20;
    }
    for term in terms(&q) {
        if repo.contains(&term) {
            total += 10;
        }
        if let Some(task) = candidate.task_id {
            if task.to_ascii_lowercase().contains(&term) {
                total += 10;
            }
        }
        if path.contains(&term) {
            total += 5;
        }
    }

    let age = now.signed_duration_since(candidate.last_activity);
    if age < chrono::Duration::hours(1) {
        total += 15;
    } else if age < chrono::Duration::hours(24) {
        total += 5;
    }

    total
}

/// Return the single highest scorer that clears [`THRESHOLD`], or
/// `NoMatch` if nothing clears it (ties below threshold are also
/// `NoMatch`, per the "single highest scorer" rule — a tie at the top
/// has no single winner).
pub fn best_match(
    query: &str,
    task_query: Option<&str>,
    candidates: &[MatchCandidate<'_>],
    now: DateTime<Utc>,
) -> FuzzyOutcome {
    let mut scored: Vec<(i32, &str)> = candidates
        .iter()
        .map(|c| (score(query, task_query, c, now), c.session_id))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    match scored.first() {
        Some(&(top_score, top_id)) if top_score >= THRESHOLD => {
            let tied = scored.iter().filter(|&&(s, _)| s == top_score).count();
            if tied == 1 {
                FuzzyOutcome::Matched(top_id.to_string())
            } else {
                FuzzyOutcome::NoMatch
            }
        }
        _ => FuzzyOutcome::NoMatch,
    }
}
