// Oneauth — CLI Module
//
// Command-line interface using clap derive macros.
// Subcommands: init, add, add-company, list, check, repair, run, daemon.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::execute;

/// Oneauth — OTP-secret registry with a self-maintaining store.
#[derive(Parser, Debug)]
#[command(name = "oneauth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Data directory holding the store, state, lock, backups and logs.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the store file and its tables.
    Init,

    /// Add a new OTP secret to the registry.
    Add {
        /// Display name of the secret (unique).
        #[arg(long)]
        name: String,

        /// Contact email associated with the secret.
        #[arg(long)]
        email: Option<String>,

        /// The shared secret material. Canonicalized to base32 `A–Z2–7` on
        /// entry; spacing and padding are tolerated.
        #[arg(long)]
        secret: String,

        /// Code refresh interval in seconds.
        #[arg(long, default_value = "30")]
        refresh_seconds: u32,

        /// Id of the owning company, if any.
        #[arg(long)]
        company_id: Option<i64>,
    },

    /// Add a new company to the registry.
    AddCompany {
        /// Company name (unique).
        #[arg(long)]
        name: String,

        /// External customer reference.
        #[arg(long)]
        customer_ref: Option<String>,

        /// Access credential for the company's view.
        #[arg(long)]
        access_code: Option<String>,
    },

    /// List all stored secrets (metadata only, never material).
    List,

    /// Run the deep integrity check and report findings without changing
    /// anything.
    Check,

    /// Repair secret material: canonicalize every record and replace
    /// undecodable material with a generated placeholder.
    Repair,

    /// Run one full maintenance cycle now (backup, sweep, compaction).
    Run,

    /// Run the maintenance scheduling loop in the foreground.
    Daemon {
        /// Wake interval in seconds. The hourly state check makes shorter
        /// intervals idempotent.
        #[arg(long, default_value = "3600")]
        interval_secs: u64,
    },
}
