pub mod accounts;
pub mod import;
pub mod init;
pub mod inspect;
pub mod status;

use std::path::Path;

use clap::{Args, Parser, Subcommand};

use crate::committer::CommitStrategy;
use crate::db::get_connection;
use crate::error::{ExtratoError, Result};
use crate::importer::read_source;
use crate::models::Role;
use crate::session::ImportSession;
use crate::settings::Settings;

/// `role=column`, e.g. `description=Histórico`. `role=` unbinds the role.
pub(crate) fn parse_mapping_override(raw: &str) -> std::result::Result<(Role, Option<String>), String> {
    let (role, column) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ROLE=COLUMN, got '{raw}'"))?;
    let role = Role::from_key(role).ok_or_else(|| {
        let known: Vec<&str> = Role::ALL.iter().map(|r| r.key()).collect();
        format!("unknown role '{role}' (expected one of: {})", known.join(", "))
    })?;
    let column = column.trim();
    Ok((role, (!column.is_empty()).then(|| column.to_string())))
}

/// Open the ledger database, refusing to create one outside `extrato init`.
pub(crate) fn open_ledger(settings: &Settings) -> Result<rusqlite::Connection> {
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(ExtratoError::Settings(
            "Database not found. Run `extrato init` to set up.".to_string(),
        ));
    }
    get_connection(&db_path)
}

/// Read a file into a session and apply sheet and mapping choices.
pub(crate) fn open_session(
    file: &str,
    sheet: Option<&str>,
    overrides: &[(Role, Option<String>)],
    settings: &Settings,
) -> Result<ImportSession> {
    let path = Path::new(file);
    let bytes = read_source(path, settings.max_file_size)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.to_string());

    let mut session = ImportSession::load(bytes, &file_name, settings.max_file_size)?;
    if let Some(sheet) = sheet {
        session.select_sheet(sheet)?;
    }
    for (role, column) in overrides {
        match column {
            Some(column) => session.assign(*role, column)?,
            None => session.unassign(*role)?,
        }
    }
    Ok(session)
}

#[derive(Parser)]
#[command(
    name = "extrato",
    version,
    about = "Import bank statements into a church's ledger."
)]
pub struct Cli {
    /// Show debug diagnostics on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and tenant, and initialize the database.
    Init {
        /// Path for extrato data (default: ~/Documents/extrato)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Tenant (church) every import is written for
        #[arg(long)]
        tenant: Option<String>,
        /// Branch within the tenant; pass an empty value to clear it
        #[arg(long)]
        branch: Option<String>,
    },
    /// Work with destination accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Preview a statement file: columns, mapping and row problems.
    Inspect {
        #[command(flatten)]
        source: SourceArgs,
        /// Destination account, so the preview matches an import
        #[arg(long)]
        account: Option<String>,
        /// Number of rows to preview
        #[arg(long, default_value = "10")]
        rows: usize,
    },
    /// Import a statement file into an account.
    Import(ImportArgs),
    /// Show current settings and ledger statistics.
    Status,
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// List active accounts for the configured tenant and branch.
    List,
}

#[derive(Args)]
pub struct SourceArgs {
    /// Path to an OFX, CSV/TSV/TXT or spreadsheet file
    pub file: String,
    /// Worksheet to read (default: the first one)
    #[arg(long)]
    pub sheet: Option<String>,
    /// Bind a role to a column, e.g. --map description=Histórico (empty column unbinds)
    #[arg(long = "map", value_name = "ROLE=COLUMN", value_parser = parse_mapping_override)]
    pub overrides: Vec<(Role, Option<String>)>,
}

#[derive(Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Destination account name or ID
    #[arg(long)]
    pub account: String,
    /// Import a flagged row anyway (1-based row number, repeatable)
    #[arg(long, value_name = "ROW", value_parser = clap::value_parser!(u64).range(1..))]
    pub include: Vec<u64>,
    /// Leave a row out (1-based row number, repeatable)
    #[arg(long, value_name = "ROW", value_parser = clap::value_parser!(u64).range(1..))]
    pub exclude: Vec<u64>,
    /// Flip a row between included and excluded (1-based row number, repeatable)
    #[arg(long, value_name = "ROW", value_parser = clap::value_parser!(u64).range(1..))]
    pub toggle: Vec<u64>,
    /// Import every flagged row that can still be stored
    #[arg(long = "include-flagged")]
    pub include_flagged: bool,
    /// Movements per insert (default from settings)
    #[arg(long = "chunk-size", value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size: Option<u64>,
    /// How chunks are committed (default from settings)
    #[arg(long, value_enum)]
    pub strategy: Option<CommitStrategy>,
    /// Show what would be imported without writing anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}
