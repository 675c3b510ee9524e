// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Learned repos: `{name → RepoRecord}` persisted as JSON (spec.md §3).
//! Grows monotonically from user discovery actions; nothing ever removes
//! an entry from this store.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use varie_core::RepoRecord;

#[derive(Debug, Error)]
pub enum LearnedReposError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default)]
pub struct LearnedRepos {
    entries: BTreeMap<String, RepoRecord>,
}

impl LearnedRepos {
    pub fn load(path: &Path) -> Result<Self, LearnedReposError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let entries: BTreeMap<String, RepoRecord> = serde_json::from_str(&contents)?;
                Ok(Self { entries })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), LearnedReposError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        crate::paths::atomic_write(path, json.as_bytes())?;
        Ok(())
    }

    /// Learn a repo. Never replaces an existing entry for the same
    /// (case-insensitive) name, matching the "grows monotonically"
    /// invariant: once a name is learned it is not reinterpreted by a
    /// later discovery of the same name at a different path.
    pub fn learn(&mut self, record: RepoRecord) -> bool {
        let key = record.name.to_ascii_lowercase();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, record);
        true
    }

    pub fn get(&self, name: &str) -> Option<&RepoRecord> {
        self.entries.get(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RepoRecord> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use varie_core::RepoSource;

    #[test]
    fn learn_is_monotonic_and_case_insensitive() {
        let mut store = LearnedRepos::default();
        assert!(store.learn(RepoRecord::new(
            "App",
            PathBuf::from("/a"),
            RepoSource::Learned,
            false
        )));
        assert!(!store.learn(RepoRecord::new(
            "app",
            PathBuf::from("/b"),
            RepoSource::Learned,
            false
        )));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("APP").unwrap().absolute_path, PathBuf::from("/a"));
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned-repos.json");
        let mut store = LearnedRepos::default();
        store.learn(RepoRecord::new(
            "app",
            PathBuf::from("/a"),
            RepoSource::Learned,
            true,
        ));
        store.save(&path).unwrap();
        let loaded = LearnedRepos::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("app").unwrap().has_marker_file, true);
    }

    #[test]
    fn missing_file_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearnedRepos::load(&dir.path().join("nope.json")).unwrap();
        assert!(store.is_empty());
    }
}
