// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `projects.yaml`: the bespoke dialect described in spec.md §4.4.
//!
//! The daemon ships its own parser and serialiser for this file rather
//! than reusing `serde_yaml`: values are plain scalars and arrays of
//! fixed-shape records at two indentation levels, and the format must
//! round-trip byte-for-byte stable (`parse -> serialise -> parse`) which
//! a general-purpose YAML emitter does not guarantee (key order, quoting
//! style, flow-vs-block choices all vary by library version).

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed projects.yaml at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoEntry {
    pub path: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectEntry {
    pub status: Option<String>,
    pub current_feature: Option<String>,
    pub last_updated: Option<String>,
    pub repos: Vec<RepoEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectsIndex {
    pub projects: BTreeMap<String, ProjectEntry>,
    pub repo_aliases: BTreeMap<String, String>,
}

/// A name must start with a letter and contain only letters, digits,
/// `_` and `-` (spec.md §3 "Projects index" invariant). Not enforced by
/// the parser itself (a hand-edited file that violates this should
/// still round-trip); callers that mint new names should check this.
pub fn is_valid_project_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

enum TopKey {
    None,
    Projects,
    Aliases,
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn split_kv(line: &str, lineno: usize) -> Result<(String, String), ProjectsError> {
    let (k, v) = line.trim().split_once(':').ok_or_else(|| ProjectsError::Parse {
        line: lineno,
        reason: "expected `key: value`".to_string(),
    })?;
    Ok((k.trim().to_string(), v.trim().to_string()))
}

/// Commit the project entry being built, if any, into `idx`. Called
/// whenever a new project starts or the file moves past the `projects:`
/// section, so the in-progress entry is never looked up back out of
/// `idx.projects` (there is nothing to assert infallible about it).
fn flush_current(idx: &mut ProjectsIndex, current: &mut Option<(String, ProjectEntry)>) {
    if let Some((name, entry)) = current.take() {
        idx.projects.insert(name, entry);
    }
}

impl ProjectsIndex {
    pub fn parse(contents: &str) -> Result<Self, ProjectsError> {
        let mut idx = ProjectsIndex::default();
        let mut top = TopKey::None;
        let mut current: Option<(String, ProjectEntry)> = None;
        let mut in_repos_list = false;

        for (i, raw_line) in contents.lines().enumerate() {
            let lineno = i + 1;
            if raw_line.trim().is_empty() {
                continue;
            }
            let indent = indent_of(raw_line);
            let trimmed = raw_line.trim_start_matches(' ');

            if indent == 0 {
                if let Some(rest) = trimmed.strip_prefix("projects:") {
                    flush_current(&mut idx, &mut current);
                    top = TopKey::Projects;
                    in_repos_list = false;
                    let rest = rest.trim();
                    if !rest.is_empty() && rest != "{}" {
                        return Err(ProjectsError::Parse {
                            line: lineno,
                            reason: "unexpected trailing content after `projects:`".to_string(),
                        });
                    }
                } else if let Some(rest) = trimmed.strip_prefix("repo_aliases:") {
                    flush_current(&mut idx, &mut current);
                    top = TopKey::Aliases;
                    in_repos_list = false;
                    let rest = rest.trim();
                    if !rest.is_empty() && rest != "{}" {
                        return Err(ProjectsError::Parse {
                            line: lineno,
                            reason: "unexpected trailing content after `repo_aliases:`"
                                .to_string(),
                        });
                    }
                } else {
                    // Unrecognised top-level key: preserved only by the
                    // edit-in-place writer, which this parser does not
                    // implement; ignore it here.
                    top = TopKey::None;
                }
                continue;
            }

            match top {
                TopKey::Projects if indent == 2 => {
                    flush_current(&mut idx, &mut current);
                    let name = trimmed
                        .strip_suffix(':')
                        .ok_or_else(|| ProjectsError::Parse {
                            line: lineno,
                            reason: "expected `name:`".to_string(),
                        })?
                        .to_string();
                    current = Some((name, ProjectEntry::default()));
                    in_repos_list = false;
                }
                TopKey::Projects if indent == 4 => {
                    let (_, entry) = current.as_mut().ok_or_else(|| ProjectsError::Parse {
                        line: lineno,
                        reason: "field outside of a project".to_string(),
                    })?;
                    if trimmed.trim() == "repos:" {
                        in_repos_list = true;
                        continue;
                    }
                    in_repos_list = false;
                    let (key, value) = split_kv(trimmed, lineno)?;
                    match key.as_str() {
                        "status" => entry.status = Some(value),
                        "current_feature" => entry.current_feature = Some(value),
                        "last_updated" => entry.last_updated = Some(value),
                        other => {
                            return Err(ProjectsError::Parse {
                                line: lineno,
                                reason: format!("unknown project field `{other}`"),
                            })
                        }
                    }
                }
                TopKey::Projects if indent == 6 && in_repos_list => {
                    let (_, entry) = current.as_mut().ok_or_else(|| ProjectsError::Parse {
                        line: lineno,
                        reason: "repo item outside of a project".to_string(),
                    })?;
                    let item = trimmed
                        .strip_prefix("- ")
                        .ok_or_else(|| ProjectsError::Parse {
                            line: lineno,
                            reason: "expected `- path: ...`".to_string(),
                        })?;
                    let (key, value) = split_kv(item, lineno)?;
                    if key != "path" {
                        return Err(ProjectsError::Parse {
                            line: lineno,
                            reason: "repo list item must start with `path`".to_string(),
                        });
                    }
                    entry.repos.push(RepoEntry {
                        path: value,
                        role: None,
                    });
                }
                TopKey::Projects if indent == 8 && in_repos_list => {
                    let (_, entry) = current.as_mut().ok_or_else(|| ProjectsError::Parse {
                        line: lineno,
                        reason: "repo field outside of a project".to_string(),
                    })?;
                    let (key, value) = split_kv(trimmed, lineno)?;
                    let last = entry.repos.last_mut().ok_or_else(|| ProjectsError::Parse {
                        line: lineno,
                        reason: "repo field with no preceding `- path:` item".to_string(),
                    })?;
                    match key.as_str() {
                        "role" => last.role = Some(value),
                        other => {
                            return Err(ProjectsError::Parse {
                                line: lineno,
                                reason: format!("unknown repo field `{other}`"),
                            })
                        }
                    }
                }
                TopKey::Aliases if indent == 2 => {
                    let (alias, project) = split_kv(trimmed, lineno)?;
                    idx.repo_aliases.insert(alias, project);
                }
                _ => {
                    return Err(ProjectsError::Parse {
                        line: lineno,
                        reason: "unexpected indentation".to_string(),
                    })
                }
            }
        }

        flush_current(&mut idx, &mut current);
        Ok(idx)
    }

    /// Output is stable and alphabetically sorted by project name and by
    /// alias (spec.md §4.4 "Serialiser guarantees"). `BTreeMap` iteration
    /// order already gives us that for free.
    pub fn serialize(&self) -> String {
        let mut out = String::new();

        out.push_str("projects:\n");
        for (name, entry) in &self.projects {
            out.push_str(&format!("  {name}:\n"));
            if let Some(status) = &entry.status {
                out.push_str(&format!("    status: {status}\n"));
            }
            if let Some(cf) = &entry.current_feature {
                out.push_str(&format!("    current_feature: {cf}\n"));
            }
            if let Some(lu) = &entry.last_updated {
                out.push_str(&format!("    last_updated: {lu}\n"));
            }
            if !entry.repos.is_empty() {
                out.push_str("    repos:\n");
                for repo in &entry.repos {
                    out.push_str(&format!("      - path: {}\n", repo.path));
                    if let Some(role) = &repo.role {
                        out.push_str(&format!("        role: {role}\n"));
                    }
                }
            }
        }

        out.push_str("repo_aliases:\n");
        for (alias, project) in &self.repo_aliases {
            out.push_str(&format!("  {alias}: {project}\n"));
        }

        out
    }

    pub fn load(path: &Path) -> Result<Self, ProjectsError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ProjectsError> {
        crate::paths::atomic_write(path, self.serialize().as_bytes())?;
        Ok(())
    }

    /// The canonical project name for `query`, resolving aliases first.
    pub fn resolve(&self, query: &str) -> Option<&str> {
        if let Some(canonical) = self.repo_aliases.get(query) {
            return self.projects.contains_key(canonical).then_some(canonical.as_str());
        }
        self.projects.contains_key(query).then_some(query)
    }

    /// True if `path` already appears under any project's repo list
    /// (spec.md §3 "a single path appears under at most one project").
    pub fn path_already_registered(&self, path: &str) -> bool {
        self.projects
            .values()
            .any(|p| p.repos.iter().any(|r| r.path == path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProjectsIndex {
        let mut idx = ProjectsIndex::default();
        idx.projects.insert(
            "my-app".to_string(),
            ProjectEntry {
                status: Some("active".to_string()),
                current_feature: Some("login".to_string()),
                last_updated: Some("2026-07-28T00:00:00Z".to_string()),
                repos: vec![
                    RepoEntry {
                        path: "/home/u/my-app".to_string(),
                        role: Some("primary".to_string()),
                    },
                    RepoEntry {
                        path: "/home/u/my-app-infra".to_string(),
                        role: None,
                    },
                ],
            },
        );
        idx.repo_aliases.insert("app".to_string(), "my-app".to_string());
        idx
    }

    #[test]
    fn parses_template_empty_form() {
        let idx = ProjectsIndex::parse("projects: {}\nrepo_aliases: {}\n").unwrap();
        assert!(idx.projects.is_empty());
        assert!(idx.repo_aliases.is_empty());
    }

    #[test]
    fn empty_form_and_newline_form_serialize_identically() {
        let from_template = ProjectsIndex::parse("projects: {}\nrepo_aliases: {}\n").unwrap();
        let from_newline = ProjectsIndex::parse("projects:\nrepo_aliases:\n").unwrap();
        assert_eq!(from_template.serialize(), from_newline.serialize());
    }

    #[test]
    fn round_trips_full_sample() {
        let idx = sample();
        let serialized = idx.serialize();
        let reparsed = ProjectsIndex::parse(&serialized).unwrap();
        assert_eq!(idx, reparsed);
    }

    #[test]
    fn stable_across_five_cycles() {
        let mut text = sample().serialize();
        for _ in 0..5 {
            let idx = ProjectsIndex::parse(&text).unwrap();
            let next = idx.serialize();
            assert_eq!(text, next);
            text = next;
        }
    }

    #[test]
    fn resolve_follows_aliases() {
        let idx = sample();
        assert_eq!(idx.resolve("app"), Some("my-app"));
        assert_eq!(idx.resolve("my-app"), Some("my-app"));
        assert_eq!(idx.resolve("unknown"), None);
    }

    #[test]
    fn detects_path_already_registered() {
        let idx = sample();
        assert!(idx.path_already_registered("/home/u/my-app"));
        assert!(!idx.path_already_registered("/home/u/other"));
    }

    #[test]
    fn validates_project_names() {
        assert!(is_valid_project_name("my-app"));
        assert!(is_valid_project_name("App_2"));
        assert!(!is_valid_project_name("2app"));
        assert!(!is_valid_project_name("my app"));
        assert!(!is_valid_project_name(""));
    }

    #[test]
    fn rejects_malformed_repo_item() {
        let bad = "projects:\n  app:\n    repos:\n      - role: primary\n";
        assert!(ProjectsIndex::parse(bad).is_err());
    }
}
