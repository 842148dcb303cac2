// Oneauth — Store file management
//
// Opens the shared SQLite store and applies the connection pragmas the
// whole system relies on: WAL journaling so maintenance writes never block
// the serving layer's readers, foreign-key enforcement, and NORMAL
// durability (a small durability window traded for throughput).

use std::path::Path;

use rusqlite::Connection;

use super::StoreError;

/// Wrapper around the shared SQLite connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the store at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::apply_pragmas(&conn)?;

        let db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory store (for testing only).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        // WAL has no meaning in memory; foreign keys still matter.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
        // journal_mode returns the resulting mode as a row, so it cannot go
        // through pragma_update.
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            tracing::warn!(journal_mode = %mode, "Store did not switch to WAL journaling");
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    /// Run schema migrations to create or update tables.
    fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS otp_secrets (
                id              INTEGER PRIMARY KEY,
                name            TEXT NOT NULL UNIQUE,
                email           TEXT,
                secret          TEXT NOT NULL,
                otp_type        TEXT NOT NULL DEFAULT 'totp',
                refresh_time    INTEGER NOT NULL DEFAULT 30,
                company_id      INTEGER,
                FOREIGN KEY (company_id) REFERENCES companies (id)
            );

            CREATE TABLE IF NOT EXISTS companies (
                id              INTEGER PRIMARY KEY,
                name            TEXT NOT NULL UNIQUE,
                customer_ref    TEXT,
                access_code     TEXT
            );

            CREATE TABLE IF NOT EXISTS users (
                id              INTEGER PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                last_login_time TEXT,
                session_token   TEXT,
                is_admin        INTEGER DEFAULT 0,
                show_timer      INTEGER DEFAULT 0,
                show_otp_type   INTEGER DEFAULT 1,
                show_emails     INTEGER DEFAULT 0,
                show_company    INTEGER DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS statistics (
                id              INTEGER PRIMARY KEY,
                logins_today    INTEGER NOT NULL,
                times_refreshed INTEGER NOT NULL,
                date            TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_secrets_company
                ON otp_secrets(company_id);
            ",
        )?;

        tracing::debug!("Store migrations completed");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
