// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repo discovery: walk a directory tree looking for repos (spec.md
//! §4.3 "Discover").

use std::path::{Path, PathBuf};
use varie_core::{RepoRecord, RepoSource};

const MAX_DEPTH: usize = 3;
const SKIP_PREFIXES: &[&str] = &["node_modules", "archive"];

fn is_skipped(name: &str) -> bool {
    name.starts_with('.') || SKIP_PREFIXES.contains(&name)
}

fn is_repo_dir(path: &Path) -> bool {
    path.join(".git").exists() || path.join("CLAUDE.md").exists()
}

fn has_marker(path: &Path) -> bool {
    path.join("CLAUDE.md").exists()
}

/// Walk up to [`MAX_DEPTH`] directory levels from `root`, returning a
/// `RepoRecord` for every directory that contains a `.git` entry or a
/// `CLAUDE.md` file. Entries starting with `.`, `node_modules`, or
/// `archive` are skipped (and not descended into).
pub fn discover(root: &Path) -> std::io::Result<Vec<RepoRecord>> {
    let mut found = Vec::new();
    walk(root, 0, &mut found)?;
    Ok(found)
}

fn walk(dir: &Path, depth: usize, found: &mut Vec<RepoRecord>) -> std::io::Result<()> {
    if depth > MAX_DEPTH {
        return Ok(());
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        if is_skipped(&name) {
            continue;
        }

        if is_repo_dir(&path) {
            found.push(RepoRecord::new(
                name,
                path.clone(),
                if has_marker(&path) {
                    RepoSource::MarkerFile
                } else {
                    RepoSource::Scanned
                },
                has_marker(&path),
            ));
            // A repo directory's own subdirectories are not descended
            // into looking for nested repos.
            continue;
        }

        walk(&path, depth + 1, found)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_git_repo_and_marker_repo() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("git-repo/.git")).unwrap();
        std::fs::create_dir_all(dir.path().join("marker-repo")).unwrap();
        std::fs::write(dir.path().join("marker-repo/CLAUDE.md"), "# hi").unwrap();

        let found = discover(dir.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"git-repo"));
        assert!(names.contains(&"marker-repo"));
    }

    #[test]
    fn skips_dotfiles_node_modules_and_archive() {
        let dir = tempfile::tempdir().unwrap();
        for skipped in [".hidden", "node_modules", "archive"] {
            std::fs::create_dir_all(dir.path().join(skipped).join(".git")).unwrap();
        }
        let found = discover(dir.path()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn does_not_descend_past_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a/b/c/d/too-deep");
        std::fs::create_dir_all(deep.join(".git")).unwrap();
        let found = discover(dir.path()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn does_not_descend_into_a_found_repo() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("outer");
        std::fs::create_dir_all(repo.join(".git")).unwrap();
        std::fs::create_dir_all(repo.join("nested-with-git/.git")).unwrap();
        let found = discover(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "outer");
    }
}
