// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `<home>/.<app>/config.yaml` (spec.md §6 "Configuration file").
//!
//! A plain, fixed-shape YAML file; unlike `projects.yaml` it has no
//! round-trip requirement, so it is loaded with `serde_yaml` directly.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Recognized keys of `config.yaml`. Unknown keys are ignored (not an
/// error) since this file is hand-edited and may carry forward-compat
/// fields from a newer daemon version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonConfig {
    #[serde(default)]
    pub skip_permissions: bool,
    #[serde(default)]
    pub auto_launch: bool,
    #[serde(default)]
    pub cloud_relay: bool,
    #[serde(default)]
    pub cloud_relay_token: Option<String>,
}

impl DaemonConfig {
    /// Load from disk, returning the default (all-false) config if the
    /// file does not exist yet.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_yaml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        crate::paths::atomic_write(path, yaml.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DaemonConfig::load(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(cfg, DaemonConfig::default());
    }

    #[test]
    fn round_trips_recognized_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let cfg = DaemonConfig {
            skip_permissions: true,
            auto_launch: false,
            cloud_relay: true,
            cloud_relay_token: Some("tok".into()),
        };
        cfg.save(&path).unwrap();
        let loaded = DaemonConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn unknown_keys_are_ignored_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "skipPermissions: true\nfutureKey: 42\n").unwrap();
        let cfg = DaemonConfig::load(&path).unwrap();
        assert!(cfg.skip_permissions);
    }
}
