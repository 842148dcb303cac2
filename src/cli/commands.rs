// Oneauth — CLI Command Handlers
//
// Each function handles one CLI subcommand. The check and repair commands
// mirror the operator workflow the maintenance cycle automates: check never
// mutates, repair goes one step further than the hourly sweep by replacing
// material that cannot decode at all.

use std::time::Duration;

use data_encoding::BASE32_NOPAD;
use rand::Rng;
use rusqlite::params;

use crate::config::Paths;
use crate::error::OneAuthError;
use crate::maintenance::{CycleOutcome, IntegrityChecker, Maintenance, Scheduler};
use crate::store::{
    canonicalize_material, Database, NewCompany, NewSecret, OtpKind, SecretStore,
    SqliteSecretStore, StoreError,
};

use super::Commands;

const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Length of generated placeholder material.
const PLACEHOLDER_LEN: usize = 32;

/// Execute the parsed CLI command.
pub fn execute(paths: Paths, command: Commands) -> Result<(), OneAuthError> {
    match command {
        Commands::Init => cmd_init(paths),
        Commands::Add {
            name,
            email,
            secret,
            refresh_seconds,
            company_id,
        } => cmd_add(paths, name, email, secret, refresh_seconds, company_id),
        Commands::AddCompany {
            name,
            customer_ref,
            access_code,
        } => cmd_add_company(paths, name, customer_ref, access_code),
        Commands::List => cmd_list(paths),
        Commands::Check => cmd_check(paths),
        Commands::Repair => cmd_repair(paths),
        Commands::Run => cmd_run(paths),
        Commands::Daemon { interval_secs } => cmd_daemon(paths, interval_secs),
    }
}

// ─── Store setup and records ─────────────────────────────────────────────────

fn cmd_init(paths: Paths) -> Result<(), OneAuthError> {
    let db_path = paths.db();
    let existed = db_path.exists();
    Database::open(&db_path)?;

    if existed {
        println!("Store already exists at {}", db_path.display());
    } else {
        println!("Store created at {}", db_path.display());
    }
    Ok(())
}

fn cmd_add(
    paths: Paths,
    name: String,
    email: Option<String>,
    secret: String,
    refresh_seconds: u32,
    company_id: Option<i64>,
) -> Result<(), OneAuthError> {
    let db = Database::open(&paths.db())?;
    let store = SqliteSecretStore::new(&db);

    if let Some(company) = company_id {
        if !store.company_exists(company)? {
            return Err(OneAuthError::Other(format!(
                "company {} does not exist; add it first",
                company
            )));
        }
    }

    let id = store.add_secret(NewSecret {
        name,
        email,
        secret,
        otp_kind: OtpKind::Totp,
        refresh_seconds,
        company_id,
    })?;
    println!("✓ Secret {} stored", id);
    Ok(())
}

fn cmd_add_company(
    paths: Paths,
    name: String,
    customer_ref: Option<String>,
    access_code: Option<String>,
) -> Result<(), OneAuthError> {
    let db = Database::open(&paths.db())?;
    let store = SqliteSecretStore::new(&db);

    let id = store.add_company(NewCompany {
        name,
        customer_ref,
        access_code,
    })?;
    println!("✓ Company {} stored", id);
    Ok(())
}

fn cmd_list(paths: Paths) -> Result<(), OneAuthError> {
    let db = Database::open(&paths.db())?;
    let store = SqliteSecretStore::new(&db);

    let summaries = store.list()?;
    if summaries.is_empty() {
        println!("No secrets stored.");
        return Ok(());
    }

    println!("{:-<72}", "");
    for s in summaries {
        let company = s.company_name.as_deref().unwrap_or("-");
        let email = s.email.as_deref().unwrap_or("-");
        println!(
            "[{:>4}] {:<28} {:<6} {:>4}s  company: {:<16} {}",
            s.id, s.name, s.otp_kind, s.refresh_seconds, company, email
        );
    }
    println!("{:-<72}", "");
    Ok(())
}

// ─── Check and repair ────────────────────────────────────────────────────────

fn cmd_check(paths: Paths) -> Result<(), OneAuthError> {
    let db = Database::open(&paths.db())?;
    let checker = IntegrityChecker::new(&db);

    println!("Running deep integrity check on {} ...", paths.db().display());

    let non_canonical = checker.non_canonical_count()?;
    report("non-canonical secrets", non_canonical);
    report("content-policy flags", checker.content_pass().issues());
    report("orphaned secrets", checker.orphan_pass().issues());
    report("account anomalies", checker.account_pass().issues());
    report("structural violations", checker.structural_pass().issues());

    println!("Deep integrity check complete.");
    Ok(())
}

fn report(label: &str, issues: usize) {
    if issues == 0 {
        println!("✓ no {}", label);
    } else {
        println!("✗ {} {}", issues, label);
    }
}

fn cmd_repair(paths: Paths) -> Result<(), OneAuthError> {
    let db = Database::open(&paths.db())?;
    let records = load_secret_rows(&db)?;
    println!("→ Found {} secrets.", records.len());

    let mut repaired = 0usize;
    for (id, secret, name) in records {
        let canonical = canonicalize_material(&secret);

        if canonical.is_empty() || BASE32_NOPAD.decode(canonical.as_bytes()).is_err() {
            // Material that cannot decode will never produce a code; swap in
            // a generated placeholder and tag the record for the operator.
            let placeholder = random_material(PLACEHOLDER_LEN);
            let tagged = if name.contains("(placeholder)") {
                name.clone()
            } else {
                format!("{} (placeholder)", name)
            };
            db.conn()
                .execute(
                    "UPDATE otp_secrets SET secret = ?1, name = ?2 WHERE id = ?3",
                    params![placeholder, tagged, id],
                )
                .map_err(StoreError::from)?;
            println!("✗ Secret {} ({}) was undecodable → replaced with placeholder", id, name);
            repaired += 1;
        } else if canonical != secret {
            db.conn()
                .execute(
                    "UPDATE otp_secrets SET secret = ?1 WHERE id = ?2",
                    params![canonical, id],
                )
                .map_err(StoreError::from)?;
            println!("→ Fixed formatting of secret {}", id);
            repaired += 1;
        }
    }

    println!("✓ Repaired {} secrets", repaired);
    Ok(())
}

fn load_secret_rows(db: &Database) -> Result<Vec<(i64, String, String)>, StoreError> {
    let mut stmt = db
        .conn()
        .prepare("SELECT id, secret, name FROM otp_secrets ORDER BY id")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn random_material(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE32_ALPHABET[rng.gen_range(0..BASE32_ALPHABET.len())] as char)
        .collect()
}

// ─── Maintenance triggers ────────────────────────────────────────────────────

fn cmd_run(paths: Paths) -> Result<(), OneAuthError> {
    match Maintenance::new(paths).run_now() {
        CycleOutcome::SkippedAlreadyRan => {
            println!("Skipped: maintenance already ran this hour.");
        }
        CycleOutcome::SkippedLockHeld => {
            println!("Skipped: another process is running maintenance.");
        }
        CycleOutcome::Completed(summary) => {
            println!(
                "Cycle completed in {:?}: {} issue(s), backup {}",
                summary.elapsed,
                summary.total_issues(),
                summary
                    .backup
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "skipped".to_string()),
            );
        }
        CycleOutcome::Failed(reason) => {
            return Err(OneAuthError::Other(format!("maintenance failed: {}", reason)));
        }
    }
    Ok(())
}

fn cmd_daemon(paths: Paths, interval_secs: u64) -> Result<(), OneAuthError> {
    // Make sure the store exists before the serving layer or the first
    // cycle touches it.
    Database::open(&paths.db())?;

    let interval = if interval_secs == 0 {
        Scheduler::default_interval()
    } else {
        Duration::from_secs(interval_secs)
    };

    let handle = Scheduler::spawn(Maintenance::new(paths), interval);
    handle.join();
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_material_is_canonical() {
        let material = random_material(PLACEHOLDER_LEN);
        assert_eq!(material.len(), PLACEHOLDER_LEN);
        assert_eq!(canonicalize_material(&material), material);
        assert!(BASE32_NOPAD.decode(material.as_bytes()).is_ok());
    }

    #[test]
    fn test_repair_replaces_undecodable_material() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());

        {
            let db = Database::open(&paths.db()).unwrap();
            // Canonicalizes to "ABCDEF": six characters is not a valid
            // base32 quantum, so no code can ever be derived from it.
            db.conn()
                .execute(
                    "INSERT INTO otp_secrets (name, secret, otp_type, refresh_time)
                     VALUES ('Broken', 'abc def==', 'totp', 30)",
                    [],
                )
                .unwrap();
            db.conn()
                .execute(
                    "INSERT INTO otp_secrets (name, secret, otp_type, refresh_time)
                     VALUES ('Spaced', 'jbsw y3dp ehpk 3pxp', 'totp', 30)",
                    [],
                )
                .unwrap();
        }

        cmd_repair(paths.clone()).unwrap();

        let db = Database::open(&paths.db()).unwrap();
        let (broken_secret, broken_name): (String, String) = db
            .conn()
            .query_row(
                "SELECT secret, name FROM otp_secrets WHERE name LIKE 'Broken%'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert!(broken_name.ends_with("(placeholder)"));
        assert_eq!(broken_secret.len(), PLACEHOLDER_LEN);
        assert!(BASE32_NOPAD.decode(broken_secret.as_bytes()).is_ok());

        // Decodable-but-messy material is canonicalized, not replaced.
        let spaced: String = db
            .conn()
            .query_row(
                "SELECT secret FROM otp_secrets WHERE name = 'Spaced'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(spaced, "JBSWY3DPEHPK3PXP");
    }

    #[test]
    fn test_repair_is_idempotent_on_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());

        {
            let db = Database::open(&paths.db()).unwrap();
            db.conn()
                .execute(
                    "INSERT INTO otp_secrets (name, secret, otp_type, refresh_time)
                     VALUES ('Broken', '!!!', 'totp', 30)",
                    [],
                )
                .unwrap();
        }

        cmd_repair(paths.clone()).unwrap();
        cmd_repair(paths.clone()).unwrap();

        let db = Database::open(&paths.db()).unwrap();
        let name: String = db
            .conn()
            .query_row("SELECT name FROM otp_secrets", [], |r| r.get(0))
            .unwrap();
        // The tag is applied once, not stacked by every repair run.
        assert_eq!(name.matches("(placeholder)").count(), 1);
    }
}
