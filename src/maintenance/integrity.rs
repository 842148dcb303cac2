// Oneauth — Integrity checker
//
// Layered read/verify/repair sweep over the secret store. The passes are
// independent: each reports a typed outcome and a failure in one never
// stops the others. Only the canonicalization pass mutates; every other
// defect requires an operator decision and is detected and logged only.

use rusqlite::params;

use crate::store::{canonicalize_material, Database, StoreError};

use super::VIOLATION_LOG_CAP;

/// Name fragments that suggest a stored string could be mistaken for an
/// executable fragment if ever interpolated unsafely downstream.
const NAME_DENYLIST: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "SELECT", "ALTER", "TRUNCATE", "EXEC", "UNION", "--",
    ";",
];

/// Outcome of one integrity pass. Local recoverability is explicit data,
/// not a swallowed exception: the orchestrator aggregates and decides log
/// levels from these.
#[derive(Debug)]
pub enum PassOutcome {
    /// Pass ran to completion; `issues` records found (or repaired).
    Completed { issues: usize },
    /// Pass stopped early; `issues` were handled before the failure.
    Partial { issues: usize, reason: String },
    /// Pass could not run at all.
    Failed { reason: String },
}

impl PassOutcome {
    pub fn issues(&self) -> usize {
        match self {
            PassOutcome::Completed { issues } | PassOutcome::Partial { issues, .. } => *issues,
            PassOutcome::Failed { .. } => 0,
        }
    }

    pub fn failed(&self) -> bool {
        !matches!(self, PassOutcome::Completed { .. })
    }
}

pub struct IntegrityChecker<'a> {
    db: &'a Database,
}

impl<'a> IntegrityChecker<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Repair every secret whose material is not in canonical form. Each
    /// repair is a row-level update committed individually, so the serving
    /// layer is never blocked behind the sweep and a failure partway leaves
    /// all previous repairs intact.
    pub fn canonicalize_pass(&self) -> PassOutcome {
        let rows: Vec<(i64, String)> = match self.secret_materials() {
            Ok(rows) => rows,
            Err(e) => return PassOutcome::Failed { reason: e.to_string() },
        };

        let mut fixed = 0usize;
        for (id, secret) in rows {
            let canonical = canonicalize_material(&secret);
            if canonical == secret {
                continue;
            }
            let update = self.db.conn().execute(
                "UPDATE otp_secrets SET secret = ?1 WHERE id = ?2",
                params![canonical, id],
            );
            match update {
                Ok(_) => {
                    tracing::debug!(secret_id = id, "Canonicalized secret material");
                    fixed += 1;
                }
                Err(e) => {
                    return PassOutcome::Partial {
                        issues: fixed,
                        reason: e.to_string(),
                    }
                }
            }
        }
        PassOutcome::Completed { issues: fixed }
    }

    /// Count secrets whose material is not canonical, without repairing.
    /// Used by the operator `check` command so inspection never mutates.
    pub fn non_canonical_count(&self) -> Result<usize, StoreError> {
        let rows = self.secret_materials()?;
        Ok(rows
            .iter()
            .filter(|(_, secret)| canonicalize_material(secret) != *secret)
            .count())
    }

    /// Flag secrets whose display name is empty or carries a denylisted
    /// SQL/control token. Detect and log only — never mutates or deletes.
    pub fn content_pass(&self) -> PassOutcome {
        let rows: Vec<(i64, String)> = match self.query_pairs(
            "SELECT id, name FROM otp_secrets ORDER BY id",
        ) {
            Ok(rows) => rows,
            Err(e) => return PassOutcome::Failed { reason: e.to_string() },
        };

        let mut flagged = 0usize;
        for (id, name) in rows {
            if name.trim().is_empty() {
                tracing::warn!(secret_id = id, "Secret has an empty display name");
                flagged += 1;
                continue;
            }
            let upper = name.to_uppercase();
            if let Some(token) = NAME_DENYLIST.iter().find(|t| upper.contains(*t)) {
                tracing::warn!(
                    secret_id = id,
                    name = %name,
                    token = %token,
                    "Secret name contains a denylisted token"
                );
                flagged += 1;
            }
        }
        PassOutcome::Completed { issues: flagged }
    }

    /// Find secrets whose company reference points at no existing company.
    /// Orphan resolution is an operator decision; nothing is repaired here.
    pub fn orphan_pass(&self) -> PassOutcome {
        let query = self.db.conn().prepare(
            "SELECT s.id, s.name, s.company_id
             FROM otp_secrets s
             LEFT JOIN companies c ON s.company_id = c.id
             WHERE s.company_id IS NOT NULL AND c.id IS NULL
             ORDER BY s.id",
        );
        let mut stmt = match query {
            Ok(stmt) => stmt,
            Err(e) => return PassOutcome::Failed { reason: e.to_string() },
        };

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        });
        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => return PassOutcome::Failed { reason: e.to_string() },
        };

        let mut orphans = 0usize;
        for row in rows {
            match row {
                Ok((id, name, company_id)) => {
                    tracing::error!(
                        secret_id = id,
                        name = %name,
                        company_id = company_id,
                        "Secret references a non-existent company"
                    );
                    orphans += 1;
                }
                Err(e) => {
                    return PassOutcome::Partial {
                        issues: orphans,
                        reason: e.to_string(),
                    }
                }
            }
        }
        PassOutcome::Completed { issues: orphans }
    }

    /// Flag user rows with empty or duplicate usernames. The UNIQUE
    /// constraint makes a duplicate a corruption symptom, which is exactly
    /// why the sweep re-checks it.
    pub fn account_pass(&self) -> PassOutcome {
        let rows: Vec<(i64, String)> = match self.query_pairs(
            "SELECT id, username FROM users ORDER BY id",
        ) {
            Ok(rows) => rows,
            Err(e) => return PassOutcome::Failed { reason: e.to_string() },
        };

        let mut seen = std::collections::HashSet::new();
        let mut flagged = 0usize;
        for (id, username) in rows {
            if username.trim().is_empty() {
                tracing::warn!(user_id = id, "User has an empty username");
                flagged += 1;
            } else if !seen.insert(username.clone()) {
                tracing::warn!(user_id = id, username = %username, "Duplicate username");
                flagged += 1;
            }
        }
        PassOutcome::Completed { issues: flagged }
    }

    /// Run the store engine's own consistency checks: `integrity_check` for
    /// page/btree structure and `foreign_key_check` across all tables.
    /// Violations are logged verbatim up to a cap, then summarized.
    pub fn structural_pass(&self) -> PassOutcome {
        let mut violations: Vec<String> = Vec::new();

        match self.query_strings("PRAGMA integrity_check") {
            Ok(messages) => {
                for message in messages {
                    if message != "ok" {
                        violations.push(message);
                    }
                }
            }
            Err(e) => return PassOutcome::Failed { reason: e.to_string() },
        }

        let fk_query = self.db.conn().prepare("PRAGMA foreign_key_check");
        let mut stmt = match fk_query {
            Ok(stmt) => stmt,
            Err(e) => return PassOutcome::Failed { reason: e.to_string() },
        };
        let fk_rows = stmt.query_map([], |row| {
            let table: String = row.get(0)?;
            let rowid: Option<i64> = row.get(1)?;
            let parent: String = row.get(2)?;
            Ok(format!(
                "foreign key violation: table {} rowid {:?} references missing row in {}",
                table, rowid, parent
            ))
        });
        match fk_rows {
            Ok(rows) => {
                for row in rows {
                    match row {
                        Ok(message) => violations.push(message),
                        Err(e) => {
                            return PassOutcome::Partial {
                                issues: violations.len(),
                                reason: e.to_string(),
                            }
                        }
                    }
                }
            }
            Err(e) => return PassOutcome::Failed { reason: e.to_string() },
        }

        if violations.is_empty() {
            tracing::info!("Structural check ok");
        } else {
            for violation in violations.iter().take(VIOLATION_LOG_CAP) {
                tracing::error!(violation = %violation, "Structural violation");
            }
            if violations.len() > VIOLATION_LOG_CAP {
                tracing::error!(
                    remainder = violations.len() - VIOLATION_LOG_CAP,
                    "Further structural violations suppressed"
                );
            }
            tracing::error!(
                total = violations.len(),
                "Store failed structural consistency checks"
            );
        }
        PassOutcome::Completed { issues: violations.len() }
    }

    // ─── Query helpers ───────────────────────────────────────────────────────

    fn secret_materials(&self) -> Result<Vec<(i64, String)>, StoreError> {
        self.query_pairs("SELECT id, secret FROM otp_secrets ORDER BY id")
    }

    fn query_pairs(&self, sql: &str) -> Result<Vec<(i64, String)>, StoreError> {
        let mut stmt = self.db.conn().prepare(sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn query_strings(&self, sql: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.db.conn().prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
