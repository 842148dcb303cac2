// Oneauth — Maintenance Module
//
// The store maintenance and integrity engine: cross-process locking,
// retention-bounded backups, idempotent hourly scheduling and the layered
// integrity sweep. The serving layer never touches the files this module
// owns (lock token, state file, backups).

mod backup;
mod integrity;
mod lock;
mod orchestrator;
mod state;

pub use backup::BackupManager;
pub use integrity::{IntegrityChecker, PassOutcome};
pub use lock::MaintenanceLock;
pub use orchestrator::{CycleOutcome, CycleSummary, Maintenance, Scheduler, SchedulerHandle};
pub use state::{day_bucket, hour_bucket, MaintenanceState, StateStore};

use std::time::Duration;

/// Age beyond which a lock token is presumed abandoned and reclaimable.
pub const LOCK_STALE_AFTER: Duration = Duration::from_secs(90 * 60);

/// Number of backup snapshots kept after pruning.
pub const BACKUP_KEEP: usize = 3;

/// Rotated log files older than this many days are pruned by the daily
/// housekeeping step.
pub const LOG_KEEP_DAYS: i64 = 7;

/// Default wake interval of the scheduling loop.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Maximum structural violations logged verbatim before summarizing.
pub const VIOLATION_LOG_CAP: usize = 50;
