use rusqlite::OptionalExtension;

use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::{format_bytes, money};
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    let tenant = if settings.tenant_id.is_empty() { "(not set)" } else { &settings.tenant_id };
    println!("Tenant:     {tenant}");
    println!("Branch:     {}", settings.branch_id.as_deref().unwrap_or("(all)"));
    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Max file:   {}", format_bytes(settings.max_file_size));
    println!("Chunks:     {} movements, {}", settings.chunk_size, settings.commit_strategy.key());

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `extrato init` to set up.");
        return Ok(());
    }

    let size = std::fs::metadata(&db_path)?.len();
    println!("DB size:    {}", format_bytes(size));

    let conn = get_connection(&db_path)?;
    let tenant_id = settings.tenant_id.as_str();
    let accounts: i64 = conn.query_row(
        "SELECT count(*) FROM accounts WHERE tenant_id = ?1 AND is_active = 1",
        [tenant_id],
        |r| r.get(0),
    )?;
    let (movements, total): (i64, f64) = conn.query_row(
        "SELECT count(*), COALESCE(SUM(amount), 0) FROM movements WHERE tenant_id = ?1",
        [tenant_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let unreconciled: i64 = conn.query_row(
        "SELECT count(*) FROM movements WHERE tenant_id = ?1 AND reconciled = 0",
        [tenant_id],
        |r| r.get(0),
    )?;
    let imports: i64 = conn.query_row(
        "SELECT count(*) FROM imports WHERE tenant_id = ?1",
        [tenant_id],
        |r| r.get(0),
    )?;
    let last_import: Option<(String, String)> = conn
        .query_row(
            "SELECT filename, import_date FROM imports WHERE tenant_id = ?1 ORDER BY id DESC LIMIT 1",
            [tenant_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    println!();
    println!("Accounts:      {accounts}");
    println!("Movements:     {movements} ({})", money(total));
    println!("Unreconciled:  {unreconciled}");
    println!("Imports:       {imports}");
    if let Some((file, when)) = last_import {
        println!("Last import:   {file} on {when}");
    }
    Ok(())
}
