// Oneauth — Maintenance lock
//
// Host-local execution gate for the maintenance cycle. The protocol is the
// token file's existence plus its modification time; the content (creator
// pid) is informational only. Multiple serving processes may share one data
// directory (a reloading dev server spawns a child), so in-process
// synchronization is not enough — the gate must hold across OS processes.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::time::Duration;

use super::LOCK_STALE_AFTER;

/// Exclusive, host-local maintenance gate with stale-token recovery.
pub struct MaintenanceLock {
    path: PathBuf,
    stale_after: Duration,
}

impl MaintenanceLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stale_after: LOCK_STALE_AFTER,
        }
    }

    /// Override the staleness threshold (tests).
    pub fn with_staleness(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            stale_after,
        }
    }

    /// Try to take the gate. Returns `false` on contention or on any I/O
    /// failure — the caller skips this cycle, it never blocks or crashes.
    pub fn acquire(&self) -> bool {
        // One retry: taken after unlinking a stale token, or when the token
        // vanished between the create attempt and the mtime probe.
        for attempt in 0..2 {
            match self.try_create() {
                Ok(()) => {
                    tracing::debug!(path = %self.path.display(), "Maintenance lock acquired");
                    return true;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if attempt > 0 {
                        return false;
                    }
                    match self.token_age() {
                        Some(age) if age > self.stale_after => {
                            tracing::warn!(
                                path = %self.path.display(),
                                age_secs = age.as_secs(),
                                "Reclaiming stale maintenance lock"
                            );
                            let _ = std::fs::remove_file(&self.path);
                        }
                        Some(_) => {
                            tracing::debug!("Maintenance lock held by another process; skipping");
                            return false;
                        }
                        // Token unreadable — most likely removed concurrently.
                        None => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not create maintenance lock token");
                    return false;
                }
            }
        }
        false
    }

    /// Drop the gate. Best-effort: a token already removed by a process that
    /// reclaimed it after staleness expiry is an accepted, logged race.
    pub fn release(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Maintenance lock released"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Maintenance lock token was already gone on release"
                );
            }
            Err(e) => tracing::warn!(error = %e, "Failed to remove maintenance lock token"),
        }
    }

    /// Atomically create the token; fails with `AlreadyExists` if present.
    fn try_create(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        // Informational only; liveness is judged by mtime.
        write!(file, "{}", std::process::id())?;
        Ok(())
    }

    fn token_age(&self) -> Option<Duration> {
        let modified = std::fs::metadata(&self.path).ok()?.modified().ok()?;
        modified.elapsed().ok()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_acquire_then_contend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maintenance.lock");

        let first = MaintenanceLock::new(&path);
        let second = MaintenanceLock::new(&path);

        assert!(first.acquire());
        assert!(!second.acquire(), "fresh token must not be reclaimable");
        first.release();
        assert!(second.acquire());
        second.release();
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let lock = MaintenanceLock::new(dir.path().join("maintenance.lock"));

        assert!(lock.acquire());
        lock.release();
        // Second release must not panic or error even though the token is gone.
        lock.release();
    }

    #[test]
    fn test_stale_token_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maintenance.lock");

        let holder = MaintenanceLock::new(&path);
        assert!(holder.acquire());

        // With a zero threshold any existing token counts as abandoned.
        let reclaimer = MaintenanceLock::with_staleness(&path, Duration::ZERO);
        assert!(reclaimer.acquire(), "stale token must be reclaimable");
        reclaimer.release();
    }

    #[test]
    fn test_token_records_creator_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maintenance.lock");

        let lock = MaintenanceLock::new(&path);
        assert!(lock.acquire());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, std::process::id().to_string());
        lock.release();
    }

    #[test]
    fn test_mutual_exclusion_under_race() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maintenance.lock");

        let winners = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                let winners = Arc::clone(&winners);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let lock = MaintenanceLock::new(&path);
                    barrier.wait();
                    if lock.acquire() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1, "exactly one racer may win");
    }
}
