// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repo Resolver (spec.md §4.3 "Repo Resolver internals").
//!
//! Resolves a free-text query to a registered repo through three
//! sources, checked in order: an exact hit in the scanned set, an exact
//! hit in the learned set, then a substring match with tie-breaks. A
//! resolve miss triggers at most one filesystem rescan per 5-second
//! cooldown window before giving up.

pub mod fuzzy;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use varie_core::RepoRecord;

const RESCAN_COOLDOWN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Found(RepoRecord),
    Ambiguous(Vec<String>),
    NotFound,
}

struct Inner {
    scanned: HashMap<String, RepoRecord>,
    learned: HashMap<String, RepoRecord>,
    last_rescan: Option<Instant>,
}

/// In-memory caches over the scanned and learned repo sets, with a
/// cooldown-gated rescan trigger. Persistence of these sets lives in
/// `varie-storage`; this type only holds the resolver's working copy.
pub struct RepoResolver {
    inner: Mutex<Inner>,
}

impl Default for RepoResolver {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                scanned: HashMap::new(),
                learned: HashMap::new(),
                last_rescan: None,
            }),
        }
    }
}

impl RepoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    /// Merge scanned repos in. Per spec.md §4.3 "existing entries are
    /// never overwritten", a name already present keeps its original
    /// record.
    pub fn ingest_scanned(&self, records: impl IntoIterator<Item = RepoRecord>) {
        let mut inner = self.inner.lock();
        for record in records {
            inner
                .scanned
                .entry(Self::key(&record.name))
                .or_insert(record);
        }
    }

    pub fn ingest_learned(&self, records: impl IntoIterator<Item = RepoRecord>) {
        let mut inner = self.inner.lock();
        for record in records {
            inner
                .learned
                .entry(Self::key(&record.name))
                .or_insert(record);
        }
    }

    /// True once 5 s have elapsed since the last rescan (or none has
    /// happened yet). Callers that see this return `true` should
    /// perform a filesystem rescan, ingest its results, then call
    /// [`RepoResolver::mark_rescanned`].
    pub fn rescan_due(&self) -> bool {
        let inner = self.inner.lock();
        match inner.last_rescan {
            None => true,
            Some(t) => t.elapsed() >= RESCAN_COOLDOWN,
        }
    }

    pub fn mark_rescanned(&self) {
        self.inner.lock().last_rescan = Some(Instant::now());
    }

    /// Resolve `query` against the scanned set, then the learned set,
    /// then substring matching with tie-breaks. Does not itself trigger
    /// a rescan — callers drive that via [`RepoResolver::rescan_due`].
    pub fn resolve(&self, query: &str) -> ResolveOutcome {
        let inner = self.inner.lock();
        let key = Self::key(query);

        if let Some(record) = inner.scanned.get(&key) {
            return ResolveOutcome::Found(record.clone());
        }
        if let Some(record) = inner.learned.get(&key) {
            return ResolveOutcome::Found(record.clone());
        }

        let all = inner.scanned.values().chain(inner.learned.values());
        let mut candidates: Vec<&RepoRecord> = all
            .filter(|r| {
                let name = r.name.to_ascii_lowercase();
                name.contains(&key) || key.contains(name.as_str())
            })
            .collect();

        if candidates.is_empty() {
            return ResolveOutcome::NotFound;
        }
        if candidates.len() == 1 {
            return ResolveOutcome::Found(candidates[0].clone());
        }

        // Tie-break 1: prefer a name that ends with the query.
        let ends_with: Vec<&&RepoRecord> = candidates
            .iter()
            .filter(|r| r.name.to_ascii_lowercase().ends_with(&key))
            .collect();
        if ends_with.len() == 1 {
            return ResolveOutcome::Found((*ends_with[0]).clone());
        }

        // Tie-break 2: prefer a name whose `-`/`_`-delimited segments
        // contain the query as a whole word.
        let word_boundary: Vec<&&RepoRecord> = candidates
            .iter()
            .filter(|r| {
                r.name
                    .to_ascii_lowercase()
                    .split(['-', '_'])
                    .any(|segment| segment == key)
            })
            .collect();
        if word_boundary.len() == 1 {
            return ResolveOutcome::Found((*word_boundary[0]).clone());
        }

        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        ResolveOutcome::Ambiguous(candidates.into_iter().map(|r| r.name.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use varie_core::RepoSource;

    fn repo(name: &str) -> RepoRecord {
        RepoRecord::new(name, PathBuf::from(format!("/home/u/{name}")), RepoSource::Scanned, false)
    }

    #[test]
    fn exact_scanned_hit_wins() {
        let resolver = RepoResolver::new();
        resolver.ingest_scanned([repo("my-app")]);
        assert_eq!(
            resolver.resolve("my-app"),
            ResolveOutcome::Found(repo("my-app"))
        );
    }

    #[test]
    fn scanned_takes_precedence_over_learned() {
        let resolver = RepoResolver::new();
        let mut scanned_record = repo("my-app");
        scanned_record.has_marker_file = true;
        resolver.ingest_scanned([scanned_record.clone()]);
        resolver.ingest_learned([repo("my-app")]);
        assert_eq!(resolver.resolve("my-app"), ResolveOutcome::Found(scanned_record));
    }

    #[test]
    fn single_substring_candidate_wins() {
        let resolver = RepoResolver::new();
        resolver.ingest_scanned([repo("my-app-backend")]);
        assert_eq!(
            resolver.resolve("backend"),
            ResolveOutcome::Found(repo("my-app-backend"))
        );
    }

    #[test]
    fn multiple_substring_candidates_without_tiebreak_are_ambiguous() {
        let resolver = RepoResolver::new();
        resolver.ingest_scanned([repo("my-app"), repo("my-app-backend")]);
        let outcome = resolver.resolve("my-app");
        // "my-app" is an exact hit, so this resolves directly, not via
        // substring tie-break; use a query that hits neither exactly.
        assert_eq!(outcome, ResolveOutcome::Found(repo("my-app")));

        let resolver2 = RepoResolver::new();
        resolver2.ingest_scanned([repo("foo-app"), repo("bar-app")]);
        match resolver2.resolve("app") {
            ResolveOutcome::Ambiguous(names) => {
                assert_eq!(names, vec!["bar-app".to_string(), "foo-app".to_string()])
            }
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn unknown_query_is_not_found() {
        let resolver = RepoResolver::new();
        resolver.ingest_scanned([repo("my-app")]);
        assert_eq!(resolver.resolve("nothing-like-it"), ResolveOutcome::NotFound);
    }

    #[test]
    fn rescan_due_respects_cooldown() {
        let resolver = RepoResolver::new();
        assert!(resolver.rescan_due());
        resolver.mark_rescanned();
        assert!(!resolver.rescan_due());
    }
}
