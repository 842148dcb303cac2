// Oneauth — Store Module
//
// SQLite-backed registry of OTP secrets and the companies that own them.
// The users and statistics tables live in the same store file but are
// written by the serving layer; this module creates them and the
// maintenance sweep covers them structurally.

mod db;
mod error;
mod models;
mod repository;

pub use db::Database;
pub use error::StoreError;
pub use models::{
    canonicalize_material, CompanyRecord, NewCompany, NewSecret, OtpKind, SecretRecord,
    SecretSummary,
};
pub use repository::{SecretStore, SqliteSecretStore};
