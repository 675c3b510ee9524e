// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Well-known filesystem paths under `<home>/.<app>/` (spec.md §6).

use std::path::{Path, PathBuf};

/// Application directory name, used both for `~/.<app>/` and the
/// `<tmp>/<app-name>[-dev].sock` socket path.
pub const APP_NAME: &str = "varie";

/// Resolve the user's home directory. Panics only in contexts where `dirs`
/// itself cannot determine one; callers in the daemon treat a `None` as a
/// fatal startup error rather than unwrapping here.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

/// `<home>/.<app>/`
pub fn app_dir(home: &Path) -> PathBuf {
    home.join(format!(".{}", APP_NAME))
}

/// `<home>/.<app>/manager/`
pub fn manager_dir(home: &Path) -> PathBuf {
    app_dir(home).join("manager")
}

/// `<home>/.<app>/manager/projects.yaml`
pub fn projects_path(home: &Path) -> PathBuf {
    manager_dir(home).join("projects.yaml")
}

/// `<home>/.<app>/manager/config.yaml`
pub fn config_path(home: &Path) -> PathBuf {
    app_dir(home).join("config.yaml")
}

/// `<home>/.<app>/manager/state.yaml`
pub fn manager_state_path(home: &Path) -> PathBuf {
    manager_dir(home).join("state.yaml")
}

/// `<home>/.<app>/manager/CLAUDE.md`
pub fn manager_claude_md_path(home: &Path) -> PathBuf {
    manager_dir(home).join("CLAUDE.md")
}

/// `<home>/.<app>/learned-repos.json`
pub fn learned_repos_path(home: &Path) -> PathBuf {
    app_dir(home).join("learned-repos.json")
}

/// `<home>/.<app>/daemon.json`
pub fn daemon_descriptor_path(home: &Path) -> PathBuf {
    app_dir(home).join("daemon.json")
}

/// `<home>/.<app>/machine-id`
pub fn machine_id_path(home: &Path) -> PathBuf {
    app_dir(home).join("machine-id")
}

/// `<home>/.<app>/resume-pending-<session_id>`
pub fn flag_file_path(home: &Path, session_id: &str) -> PathBuf {
    app_dir(home).join(format!("resume-pending-{}", session_id))
}

/// Unix socket path for the given environment (`dev` uses the `-dev` suffix).
pub fn socket_path(tmp_dir: &Path, dev: bool) -> PathBuf {
    let name = if dev {
        format!("{}-dev.sock", APP_NAME)
    } else {
        format!("{}.sock", APP_NAME)
    };
    tmp_dir.join(name)
}

/// Atomically write `contents` to `path`: write to a sibling `.tmp` file,
/// fsync it, then rename into place. Grounded in the teacher's checkpoint
/// write discipline (write-tmp, fsync, rename).
pub fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    {
        let mut f = std::fs::File::create(&tmp_path)?;
        use std::io::Write;
        f.write_all(contents)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parent_dirs_and_final_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("file.yaml");
        atomic_write(&path, b"hello").expect("write");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn socket_path_uses_dev_suffix() {
        let tmp = Path::new("/tmp");
        assert_eq!(socket_path(tmp, false), Path::new("/tmp/varie.sock"));
        assert_eq!(socket_path(tmp, true), Path::new("/tmp/varie-dev.sock"));
    }
}
