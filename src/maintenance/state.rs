// Oneauth — Maintenance state store
//
// A single mutable record, file-backed so it survives process restarts and
// is shared by every process on the host. Absence or corruption of the file
// is always treated as "first run" — the scheduler must be able to proceed
// from nothing.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Scheduling state persisted between cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceState {
    /// Hour-bucket of the last completed maintenance cycle, e.g. "2024-01-01 14".
    pub last_maintenance_hour: String,
    /// Calendar day of the last compaction pass, e.g. "2024-01-01".
    pub last_compaction_day: String,
}

/// Scheduling key for the hourly pass: date and hour of the local wall clock.
pub fn hour_bucket(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d %H").to_string()
}

/// Scheduling key for the daily compaction pass.
pub fn day_bucket(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d").to_string()
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the state record. Missing or unparseable files yield the empty
    /// state, never an error.
    pub fn load(&self) -> MaintenanceState {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return MaintenanceState::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "State file unreadable; starting from empty state"
                );
                MaintenanceState::default()
            }
        }
    }

    /// Persist the state record.
    pub fn save(&self, state: &MaintenanceState) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.path, json)
    }

    /// Whether the maintenance body already executed in the current
    /// hour-bucket.
    pub fn already_ran_this_hour(&self, now: DateTime<Local>) -> bool {
        self.load().last_maintenance_hour == hour_bucket(now)
    }

    /// Whether the once-daily compaction pass is still due today.
    pub fn needs_daily_compaction(&self, now: DateTime<Local>) -> bool {
        self.load().last_compaction_day != day_bucket(now)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
