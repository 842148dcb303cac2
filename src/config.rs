// Oneauth — Data directory layout
//
// Every file the maintenance subsystem owns (store, state, lock token,
// backups, logs) is derived from a single data directory so that an
// operator override of `--data-dir` moves the whole installation.

use std::path::{Path, PathBuf};

/// Resolved locations of all persisted files.
#[derive(Debug, Clone)]
pub struct Paths {
    data_dir: PathBuf,
}

impl Paths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Platform default: `<data_dir>/oneauth` (e.g. `~/.local/share/oneauth`).
    pub fn default_data_dir() -> PathBuf {
        let base = dirs_next::data_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("oneauth")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The store file shared with the serving layer.
    pub fn db(&self) -> PathBuf {
        self.data_dir.join("otp.db")
    }

    /// Maintenance scheduling state, owned exclusively by this subsystem.
    pub fn state(&self) -> PathBuf {
        self.data_dir.join("maintenance.json")
    }

    /// Cross-process lock token, owned exclusively by this subsystem.
    pub fn lock(&self) -> PathBuf {
        self.data_dir.join("maintenance.lock")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backup")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new(Self::default_data_dir())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_paths_live_under_data_dir() {
        let paths = Paths::new("/srv/oneauth");
        for p in [
            paths.db(),
            paths.state(),
            paths.lock(),
            paths.backup_dir(),
            paths.logs_dir(),
        ] {
            assert!(p.starts_with("/srv/oneauth"));
        }
    }

    #[test]
    fn test_store_file_name_is_stable() {
        // The serving layer opens the same file by name; renaming it would
        // orphan every deployed installation.
        let paths = Paths::new("/tmp/x");
        assert_eq!(paths.db().file_name().unwrap(), "otp.db");
    }
}
