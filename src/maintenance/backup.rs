// Oneauth — Backup manager
//
// Full-copy snapshotting of the store file. A full copy is crash-safe for a
// single small store; retention keeps the 3 most recent snapshots so disk
// use stays bounded while tolerating a failed cycle or two. The pid suffix
// keeps two concurrent creators from colliding on a filename.

use std::path::{Path, PathBuf};

use chrono::Local;

use super::BACKUP_KEEP;

pub struct BackupManager {
    db_path: PathBuf,
    backup_dir: PathBuf,
    keep: usize,
}

impl BackupManager {
    pub fn new(db_path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            backup_dir: backup_dir.into(),
            keep: BACKUP_KEEP,
        }
    }

    /// Snapshot the store file. Returns the snapshot path, or `None` when
    /// the store does not exist yet (nothing to back up).
    pub fn snapshot(&self) -> Result<Option<PathBuf>, std::io::Error> {
        if !self.db_path.exists() {
            tracing::info!("Store file does not exist yet; skipping backup");
            return Ok(None);
        }

        std::fs::create_dir_all(&self.backup_dir)?;

        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let name = format!("otp_{}_pid{}.db", stamp, std::process::id());
        let target = self.backup_dir.join(name);

        std::fs::copy(&self.db_path, &target)?;
        tracing::info!(snapshot = %target.display(), "Store snapshot written");

        self.prune();
        Ok(Some(target))
    }

    /// Delete every snapshot beyond the `keep` most recent. A snapshot that
    /// cannot be pruned is not itself data loss, so failures are logged at
    /// high severity and the pass continues.
    fn prune(&self) {
        let mut snapshots = match self.list_snapshots() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Could not list backup directory for pruning");
                return;
            }
        };

        // Newest first by modification time.
        snapshots.sort_by(|a, b| b.1.cmp(&a.1));

        for (path, _) in snapshots.into_iter().skip(self.keep) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::info!(snapshot = %path.display(), "Pruned old snapshot"),
                Err(e) => tracing::error!(
                    snapshot = %path.display(),
                    error = %e,
                    "Failed to prune old snapshot"
                ),
            }
        }
    }

    fn list_snapshots(&self) -> Result<Vec<(PathBuf, std::time::SystemTime)>, std::io::Error> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.backup_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !Self::is_snapshot(&path) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            out.push((path, modified));
        }
        Ok(out)
    }

    fn is_snapshot(path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return false,
        };
        path.is_file() && name.starts_with("otp_") && name.ends_with(".db")
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
