// Oneauth — Secret registry repository
//
// CRUD seam between the store file and everything that reads it: the
// operator CLI, the serving layer and the maintenance tests. Material is
// canonicalized on the way in, so the sweep's canonicalization pass only
// ever finds rows written by older or external writers.

use rusqlite::{params, OptionalExtension};
use zeroize::Zeroizing;

use super::db::Database;
use super::models::{
    canonicalize_material, CompanyRecord, NewCompany, NewSecret, OtpKind, SecretRecord,
    SecretSummary,
};
use super::StoreError;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over registry storage operations.
pub trait SecretStore {
    /// Add a new secret record. Material is canonicalized first; an entry
    /// that canonicalizes to nothing is rejected. Returns the new row id.
    fn add_secret(&self, secret: NewSecret) -> Result<i64, StoreError>;

    /// Add a new company record. Returns the new row id.
    fn add_company(&self, company: NewCompany) -> Result<i64, StoreError>;

    /// Get a secret by id, including its (private) material.
    fn get(&self, id: i64) -> Result<Option<SecretRecord>, StoreError>;

    /// Raw canonical material for one secret, for the serving layer's code
    /// computation. Wrapped in `Zeroizing` so it leaves memory on drop.
    fn material(&self, id: i64) -> Result<Option<Zeroizing<String>>, StoreError>;

    /// List all secrets (no material), joined with their company names.
    fn list(&self) -> Result<Vec<SecretSummary>, StoreError>;

    /// List all companies.
    fn list_companies(&self) -> Result<Vec<CompanyRecord>, StoreError>;

    /// Delete a secret by id. Returns true if it existed.
    fn delete_secret(&self, id: i64) -> Result<bool, StoreError>;

    /// Whether a company with the given id exists.
    fn company_exists(&self, id: i64) -> Result<bool, StoreError>;
}

// ─── SQLite Implementation ──────────────────────────────────────────────────

pub struct SqliteSecretStore<'a> {
    db: &'a Database,
}

impl<'a> SqliteSecretStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SecretRecord> {
        let kind_str: String = row.get(4)?;
        let otp_kind = OtpKind::parse(&kind_str).unwrap_or(OtpKind::Totp);

        Ok(SecretRecord::new(
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            otp_kind,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<SecretSummary> {
        let kind_str: String = row.get(3)?;

        Ok(SecretSummary {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            otp_kind: OtpKind::parse(&kind_str).unwrap_or(OtpKind::Totp),
            refresh_seconds: row.get(4)?,
            company_id: row.get(5)?,
            company_name: row.get(6)?,
        })
    }
}

impl<'a> SecretStore for SqliteSecretStore<'a> {
    fn add_secret(&self, secret: NewSecret) -> Result<i64, StoreError> {
        let canonical = canonicalize_material(&secret.secret);
        if canonical.is_empty() {
            return Err(StoreError::InvalidMaterial(
                "material is empty after canonicalization".to_string(),
            ));
        }
        if canonical != secret.secret {
            tracing::warn!(
                name = %secret.name,
                "Secret material was not canonical on entry; stored the cleaned form"
            );
        }

        self.db.conn().execute(
            "INSERT INTO otp_secrets (name, email, secret, otp_type, refresh_time, company_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                secret.name,
                secret.email,
                canonical,
                secret.otp_kind.as_str(),
                secret.refresh_seconds,
                secret.company_id,
            ],
        )?;

        let id = self.db.conn().last_insert_rowid();
        tracing::info!(secret_id = id, name = %secret.name, "Secret stored");
        Ok(id)
    }

    fn add_company(&self, company: NewCompany) -> Result<i64, StoreError> {
        self.db.conn().execute(
            "INSERT INTO companies (name, customer_ref, access_code) VALUES (?1, ?2, ?3)",
            params![company.name, company.customer_ref, company.access_code],
        )?;

        let id = self.db.conn().last_insert_rowid();
        tracing::info!(company_id = id, name = %company.name, "Company stored");
        Ok(id)
    }

    fn get(&self, id: i64) -> Result<Option<SecretRecord>, StoreError> {
        let record = self
            .db
            .conn()
            .query_row(
                "SELECT id, name, email, secret, otp_type, refresh_time, company_id
                 FROM otp_secrets WHERE id = ?1",
                params![id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn material(&self, id: i64) -> Result<Option<Zeroizing<String>>, StoreError> {
        let material: Option<String> = self
            .db
            .conn()
            .query_row(
                "SELECT secret FROM otp_secrets WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(material.map(Zeroizing::new))
    }

    fn list(&self) -> Result<Vec<SecretSummary>, StoreError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT s.id, s.name, s.email, s.otp_type, s.refresh_time, s.company_id, c.name
             FROM otp_secrets s
             LEFT JOIN companies c ON s.company_id = c.id
             ORDER BY s.name",
        )?;

        let rows = stmt.query_map([], Self::row_to_summary)?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    fn list_companies(&self) -> Result<Vec<CompanyRecord>, StoreError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, name, customer_ref, access_code FROM companies ORDER BY name",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(CompanyRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                customer_ref: row.get(2)?,
                access_code: row.get(3)?,
            })
        })?;

        let mut companies = Vec::new();
        for row in rows {
            companies.push(row?);
        }
        Ok(companies)
    }

    fn delete_secret(&self, id: i64) -> Result<bool, StoreError> {
        let affected = self
            .db
            .conn()
            .execute("DELETE FROM otp_secrets WHERE id = ?1", params![id])?;

        if affected > 0 {
            tracing::info!(secret_id = id, "Secret deleted");
        }
        Ok(affected > 0)
    }

    fn company_exists(&self, id: i64) -> Result<bool, StoreError> {
        let count: i64 = self.db.conn().query_row(
            "SELECT count(*) FROM companies WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
