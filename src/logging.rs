// Oneauth — Observability bootstrap and log retention
//
// Console plus a daily-rotated log file. Retention of rotated files is an
// explicit policy function over "now" and the file names — pruning happens
// as a scheduled housekeeping step of the daily maintenance branch, never
// as a side effect of a log call.

use std::path::Path;

use chrono::NaiveDate;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::maintenance::LOG_KEEP_DAYS;

/// Prefix of the rotated log files; the appender suffixes the date.
const LOG_FILE_PREFIX: &str = "oneauth.log";

/// Initialize tracing: console output plus a daily-rotated file under
/// `logs_dir`. Default filter is `oneauth=info`, overridable via `RUST_LOG`.
/// Returns the appender guard, which must stay alive for the process
/// lifetime; `None` if the log directory could not be created (console-only).
pub fn init(logs_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oneauth=info"));

    if let Err(e) = std::fs::create_dir_all(logs_dir) {
        eprintln!("warning: cannot create log directory {}: {e}", logs_dir.display());
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_target(false).with_ansi(false).with_writer(file_writer))
        .init();

    Some(guard)
}

/// Pure retention policy: which of the given rotated log file names are
/// older than `keep_days` as of `today`. Names that are not rotated log
/// files (no parseable date suffix) are never returned.
pub fn expired_log_files(today: NaiveDate, names: &[String], keep_days: i64) -> Vec<String> {
    names
        .iter()
        .filter(|name| {
            name.strip_prefix(LOG_FILE_PREFIX)
                .and_then(|rest| rest.strip_prefix('.'))
                .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
                .is_some_and(|date| (today - date).num_days() > keep_days)
        })
        .cloned()
        .collect()
}

/// Apply the retention policy to the log directory. Best-effort: a rotated
/// file that cannot be removed is logged and skipped.
pub fn prune_logs(logs_dir: &Path, today: NaiveDate) {
    let entries = match std::fs::read_dir(logs_dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    let names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();

    for name in expired_log_files(today, &names, LOG_KEEP_DAYS) {
        let path = logs_dir.join(&name);
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::info!(file = %name, "Pruned expired log file"),
            Err(e) => tracing::warn!(file = %name, error = %e, "Failed to prune log file"),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
