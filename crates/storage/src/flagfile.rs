// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flag files (hook handshake), spec.md §3 and §6.
//!
//! `key=value` lines, optionally followed by `---section---`/`---end---`
//! blocks for multi-line payloads. The daemon only ever reads these
//! (hook scripts write them); each file is consumed exactly once by the
//! next user prompt, so `read_and_remove` deletes the file after a
//! successful parse.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlagFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unterminated section {0:?}")]
    UnterminatedSection(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagFile {
    pub fields: BTreeMap<String, String>,
    pub sections: BTreeMap<String, String>,
}

impl FlagFile {
    pub fn kind(&self) -> Option<&str> {
        self.fields.get("type").map(String::as_str)
    }

    fn parse(contents: &str) -> Result<Self, FlagFileError> {
        let mut fields = BTreeMap::new();
        let mut sections = BTreeMap::new();

        let mut lines = contents.lines().peekable();
        while let Some(line) = lines.next() {
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line
                .strip_prefix("---")
                .and_then(|rest| rest.strip_suffix("---"))
            {
                let end_marker = "---end---";
                let mut body = String::new();
                loop {
                    match lines.next() {
                        Some(l) if l == end_marker => break,
                        Some(l) => {
                            if !body.is_empty() {
                                body.push('\n');
                            }
                            body.push_str(l);
                        }
                        None => return Err(FlagFileError::UnterminatedSection(name.to_string())),
                    }
                }
                sections.insert(name.to_string(), body);
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                fields.insert(key.to_string(), value.to_string());
            }
        }

        Ok(Self { fields, sections })
    }

    /// Read and delete the flag file at `path`. Returns `Ok(None)` if no
    /// such file exists (the common case: no hook has fired since the
    /// last prompt).
    pub fn read_and_remove(path: &Path) -> Result<Option<Self>, FlagFileError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let parsed = Self::parse(&contents)?;
        std::fs::remove_file(path)?;
        Ok(Some(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = FlagFile::read_and_remove(&dir.path().join("resume-pending-s1")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn parses_key_value_lines() {
        let parsed = FlagFile::parse("type=compact\nreason=context_limit\n").unwrap();
        assert_eq!(parsed.kind(), Some("compact"));
        assert_eq!(parsed.fields.get("reason").map(String::as_str), Some("context_limit"));
    }

    #[test]
    fn parses_multiline_sections() {
        let raw = "type=restart\n---summary---\nline one\nline two\n---end---\n";
        let parsed = FlagFile::parse(raw).unwrap();
        assert_eq!(parsed.kind(), Some("restart"));
        assert_eq!(
            parsed.sections.get("summary").map(String::as_str),
            Some("line one\nline two")
        );
    }

    #[test]
    fn unterminated_section_is_an_error() {
        let raw = "type=restart\n---summary---\nline one\n";
        assert!(FlagFile::parse(raw).is_err());
    }

    #[test]
    fn read_and_remove_consumes_the_file_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume-pending-s1");
        std::fs::write(&path, "type=compact\n").unwrap();

        let first = FlagFile::read_and_remove(&path).unwrap();
        assert!(first.is_some());
        assert!(!path.exists());

        let second = FlagFile::read_and_remove(&path).unwrap();
        assert!(second.is_none());
    }
}
