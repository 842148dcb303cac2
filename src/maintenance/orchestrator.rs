// Oneauth — Maintenance orchestrator
//
// Sequences one maintenance cycle: idempotence check, lock, backup, the
// integrity sweep, compaction/housekeeping, state save, release. Every
// trigger source (scheduler tick, operator "run now") funnels into the
// same entry point so behavior is identical regardless of how a cycle
// starts.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Sender};

use crate::config::Paths;
use crate::logging;
use crate::store::Database;

use super::backup::BackupManager;
use super::integrity::{IntegrityChecker, PassOutcome};
use super::lock::MaintenanceLock;
use super::state::{day_bucket, hour_bucket, MaintenanceState, StateStore};
use super::DEFAULT_INTERVAL;

/// How one cycle ended. The two skips are deliberately distinct: one means
/// the work is already done for this hour, the other means a sibling
/// process is doing it right now.
#[derive(Debug)]
pub enum CycleOutcome {
    /// This hour-bucket already ran; the lock was never touched.
    SkippedAlreadyRan,
    /// Another process holds a fresh lock token.
    SkippedLockHeld,
    /// The cycle ran; partial pass failures are recorded in the summary.
    Completed(CycleSummary),
    /// The store could not be opened at all, so no pass could run.
    Failed(String),
}

/// Aggregated result of one completed cycle.
#[derive(Debug)]
pub struct CycleSummary {
    pub backup: Option<PathBuf>,
    pub canonicalized: usize,
    pub content_flags: usize,
    pub orphans: usize,
    pub account_flags: usize,
    pub structural_violations: usize,
    pub failed_passes: usize,
    pub compacted: bool,
    pub elapsed: Duration,
}

impl CycleSummary {
    /// Consolidated issue count across all passes.
    pub fn total_issues(&self) -> usize {
        self.canonicalized
            + self.content_flags
            + self.orphans
            + self.account_flags
            + self.structural_violations
    }
}

/// Releases the lock token on scope exit. This is the orchestrator's
/// outermost boundary: even a panic escaping per-pass containment must not
/// leave the token behind for 90 minutes.
struct ReleaseOnDrop<'a>(&'a MaintenanceLock);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

pub struct Maintenance {
    paths: Paths,
}

impl Maintenance {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    /// Operator "run now" trigger.
    pub fn run_now(&self) -> CycleOutcome {
        self.run(Local::now())
    }

    /// Run one full cycle against the injected clock.
    pub fn run(&self, now: DateTime<Local>) -> CycleOutcome {
        let state_store = StateStore::new(self.paths.state());
        if state_store.already_ran_this_hour(now) {
            tracing::info!(
                hour = %hour_bucket(now),
                "Maintenance already ran this hour; skipping"
            );
            return CycleOutcome::SkippedAlreadyRan;
        }

        let lock = MaintenanceLock::new(self.paths.lock());
        if !lock.acquire() {
            tracing::info!("Maintenance lock contended; skipping this cycle");
            return CycleOutcome::SkippedLockHeld;
        }
        let _release = ReleaseOnDrop(&lock);

        let started = Instant::now();
        tracing::info!(hour = %hour_bucket(now), "Maintenance cycle starting");

        let backup = match BackupManager::new(self.paths.db(), self.paths.backup_dir()).snapshot()
        {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(error = %e, "Backup pass failed");
                None
            }
        };

        let db = match Database::open(&self.paths.db()) {
            Ok(db) => db,
            Err(e) => {
                tracing::error!(error = %e, "Could not open store; aborting cycle");
                return CycleOutcome::Failed(e.to_string());
            }
        };

        let checker = IntegrityChecker::new(&db);
        let canonicalize = self.observe("canonicalize", checker.canonicalize_pass());
        let content = self.observe("content", checker.content_pass());
        let orphan = self.observe("orphan", checker.orphan_pass());
        let account = self.observe("account", checker.account_pass());
        let structural = self.observe("structural", checker.structural_pass());

        let compacted = self.compact_if_due(&db, &state_store, now);

        let previous = state_store.load();
        let next = MaintenanceState {
            last_maintenance_hour: hour_bucket(now),
            last_compaction_day: if compacted {
                day_bucket(now)
            } else {
                previous.last_compaction_day
            },
        };
        if let Err(e) = state_store.save(&next) {
            tracing::error!(error = %e, "Could not persist maintenance state");
        }

        let passes = [&canonicalize, &content, &orphan, &account, &structural];
        let summary = CycleSummary {
            backup,
            canonicalized: canonicalize.issues(),
            content_flags: content.issues(),
            orphans: orphan.issues(),
            account_flags: account.issues(),
            structural_violations: structural.issues(),
            failed_passes: passes.iter().filter(|p| p.failed()).count(),
            compacted,
            elapsed: started.elapsed(),
        };

        if summary.total_issues() > 0 || summary.failed_passes > 0 {
            tracing::warn!(
                elapsed_ms = summary.elapsed.as_millis() as u64,
                issues = summary.total_issues(),
                canonicalized = summary.canonicalized,
                content_flags = summary.content_flags,
                orphans = summary.orphans,
                account_flags = summary.account_flags,
                structural = summary.structural_violations,
                failed_passes = summary.failed_passes,
                "Maintenance cycle completed with findings"
            );
        } else {
            tracing::info!(
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Maintenance cycle completed clean"
            );
        }

        CycleOutcome::Completed(summary)
    }

    /// Log one pass's outcome with context. A failed pass never aborts its
    /// siblings; partial maintenance is preferable to none.
    fn observe(&self, pass: &str, outcome: PassOutcome) -> PassOutcome {
        match &outcome {
            PassOutcome::Completed { issues } if *issues > 0 => {
                tracing::warn!(pass = pass, issues = issues, "Integrity pass found issues");
            }
            PassOutcome::Completed { .. } => {
                tracing::debug!(pass = pass, "Integrity pass clean");
            }
            PassOutcome::Partial { issues, reason } => {
                tracing::error!(
                    pass = pass,
                    handled = issues,
                    reason = %reason,
                    "Integrity pass stopped early"
                );
            }
            PassOutcome::Failed { reason } => {
                tracing::error!(pass = pass, reason = %reason, "Integrity pass failed to run");
            }
        }
        outcome
    }

    /// Daily branch: reclaim space and refresh planner statistics, plus log
    /// retention housekeeping. All other hours run the lighter
    /// statistics-refresh-only step.
    fn compact_if_due(&self, db: &Database, state: &StateStore, now: DateTime<Local>) -> bool {
        if state.needs_daily_compaction(now) {
            match db.conn().execute_batch("VACUUM; ANALYZE;") {
                Ok(()) => {
                    tracing::info!("Daily compaction completed");
                    logging::prune_logs(&self.paths.logs_dir(), now.date_naive());
                    true
                }
                Err(e) => {
                    tracing::error!(error = %e, "Daily compaction failed");
                    false
                }
            }
        } else {
            if let Err(e) = db.conn().execute_batch("PRAGMA optimize;") {
                tracing::warn!(error = %e, "Statistics refresh failed");
            }
            false
        }
    }
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

/// Host-process wiring: a dedicated background loop that triggers a cycle
/// immediately on start and then on every tick. The hour-bucket check makes
/// the cadence idempotent, so a tick that fires twice in one hour is
/// harmless.
pub struct Scheduler;

pub struct SchedulerHandle {
    shutdown: Sender<()>,
    handle: std::thread::JoinHandle<()>,
}

impl Scheduler {
    pub fn spawn(maintenance: Maintenance, interval: Duration) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let handle = std::thread::spawn(move || {
            tracing::info!(interval_secs = interval.as_secs(), "Maintenance scheduler started");
            loop {
                maintenance.run_now();
                // The tick doubles as the shutdown wait, so stopping never
                // sits out the rest of the interval.
                match shutdown_rx.recv_timeout(interval) {
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
            tracing::info!("Maintenance scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }

    pub fn default_interval() -> Duration {
        DEFAULT_INTERVAL
    }
}

impl SchedulerHandle {
    /// Signal shutdown and wait for the loop to exit. A cycle that is
    /// already running always completes first; there is no mid-cycle
    /// cancellation.
    pub fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.join();
    }

    /// Block until the scheduler thread exits (daemon mode).
    pub fn join(self) {
        let _ = self.handle.join();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rusqlite::params;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, 5, 0).unwrap()
    }

    /// A store seeded the way the end-to-end scenario demands: one secret
    /// with messy material, one secret pointing at a vanished company.
    fn seed_store(paths: &Paths) {
        std::fs::create_dir_all(paths.data_dir()).unwrap();
        let db = Database::open(&paths.db()).unwrap();
        db.conn()
            .execute(
                "INSERT INTO otp_secrets (name, secret, otp_type, refresh_time)
                 VALUES ('Messy', 'abc def==', 'totp', 30)",
                [],
            )
            .unwrap();
        db.conn().pragma_update(None, "foreign_keys", "OFF").unwrap();
        db.conn()
            .execute(
                "INSERT INTO otp_secrets (name, secret, otp_type, refresh_time, company_id)
                 VALUES ('Orphaned', 'ABCDEF', 'totp', 30, 99)",
                [],
            )
            .unwrap();
        db.conn().pragma_update(None, "foreign_keys", "ON").unwrap();
    }

    #[test]
    fn test_full_cycle_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        seed_store(&paths);

        let now = at(2024, 1, 1, 14);
        let outcome = Maintenance::new(paths.clone()).run(now);

        let summary = match outcome {
            CycleOutcome::Completed(s) => s,
            other => panic!("expected completed cycle, got {:?}", other),
        };

        let backup = summary.backup.as_ref().expect("a backup file must be produced");
        assert!(backup.exists());
        assert_eq!(summary.canonicalized, 1);
        assert_eq!(summary.orphans, 1);
        // The orphan's dangling reference is also a foreign-key violation.
        assert_eq!(summary.structural_violations, 1);
        assert_eq!(summary.failed_passes, 0);
        assert!(summary.compacted, "first run of the day compacts");

        // Canonicalization really landed in the store.
        let db = Database::open(&paths.db()).unwrap();
        let material: String = db
            .conn()
            .query_row(
                "SELECT secret FROM otp_secrets WHERE name = 'Messy'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(material, "ABCDEF");

        // State records the invocation hour.
        let state = StateStore::new(paths.state()).load();
        assert_eq!(state.last_maintenance_hour, hour_bucket(now));
        assert_eq!(state.last_compaction_day, day_bucket(now));

        // The lock token is gone.
        assert!(!paths.lock().exists());
    }

    #[test]
    fn test_second_cycle_same_hour_skips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        seed_store(&paths);

        let maintenance = Maintenance::new(paths.clone());
        let now = at(2024, 1, 1, 14);

        assert!(matches!(maintenance.run(now), CycleOutcome::Completed(_)));
        assert!(matches!(maintenance.run(now), CycleOutcome::SkippedAlreadyRan));

        // Only the first cycle produced a backup.
        let backups = std::fs::read_dir(paths.backup_dir()).unwrap().count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn test_cycle_skips_when_lock_held() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        seed_store(&paths);

        let foreign = MaintenanceLock::new(paths.lock());
        assert!(foreign.acquire());

        let outcome = Maintenance::new(paths.clone()).run(at(2024, 1, 1, 14));
        assert!(matches!(outcome, CycleOutcome::SkippedLockHeld));

        // The contended token belongs to the holder; the skipped cycle must
        // not have removed it.
        assert!(paths.lock().exists());
        foreign.release();
    }

    #[test]
    fn test_compaction_runs_once_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        seed_store(&paths);

        let maintenance = Maintenance::new(paths.clone());

        let first = maintenance.run(at(2024, 1, 1, 9));
        let second = maintenance.run(at(2024, 1, 1, 10));
        let next_day = maintenance.run(at(2024, 1, 2, 9));

        let compacted = |o: &CycleOutcome| match o {
            CycleOutcome::Completed(s) => s.compacted,
            _ => panic!("expected completed cycle"),
        };
        assert!(compacted(&first));
        assert!(!compacted(&second), "same-day cycles run the light step only");
        assert!(compacted(&next_day));
    }

    #[test]
    fn test_first_run_bootstraps_missing_store() {
        // No store file at all: the backup pass skips, the store is created
        // empty, the sweep finds nothing, the lock is still released.
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().join("nested"));

        let outcome = Maintenance::new(paths.clone()).run(at(2024, 1, 1, 14));
        match outcome {
            CycleOutcome::Completed(summary) => {
                assert!(summary.backup.is_none());
                assert_eq!(summary.total_issues(), 0);
            }
            other => panic!("expected completed cycle, got {:?}", other),
        }
        assert!(!paths.lock().exists());
    }

    #[test]
    fn test_scheduler_runs_immediately_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        seed_store(&paths);

        let handle = Scheduler::spawn(Maintenance::new(paths.clone()), Duration::from_secs(3600));
        // The first cycle fires on spawn, not after the first interval.
        for _ in 0..100 {
            if paths.state().exists() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        handle.stop();

        let state = StateStore::new(paths.state()).load();
        assert!(!state.last_maintenance_hour.is_empty());
    }

    #[test]
    fn test_orphan_survives_cycles_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        seed_store(&paths);

        let maintenance = Maintenance::new(paths.clone());
        maintenance.run(at(2024, 1, 1, 14));
        maintenance.run(at(2024, 1, 1, 15));

        let db = Database::open(&paths.db()).unwrap();
        let company_id: i64 = db
            .conn()
            .query_row(
                "SELECT company_id FROM otp_secrets WHERE name = 'Orphaned'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(company_id, 99, "orphans are reported, never repaired");

        let count: i64 = db
            .conn()
            .query_row("SELECT count(*) FROM otp_secrets", params![], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
