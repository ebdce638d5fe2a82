use colored::Colorize;

use crate::cli::{open_ledger, open_session, ImportArgs};
use crate::committer::CommitOptions;
use crate::db::{find_active_account, previous_import, record_import, ImportLogEntry, SqliteLedger};
use crate::error::{ExtratoError, Result};
use crate::importer::checksum;
use crate::settings::load_settings;

fn row_index(row: u64) -> usize {
    (row as usize).saturating_sub(1)
}

pub fn run(args: &ImportArgs) -> Result<()> {
    let settings = load_settings();
    let scope = settings.scope()?;
    let conn = open_ledger(&settings)?;
    let account = find_active_account(&conn, &scope, &args.account)?;
    let account_id = account.id;
    let account_name = account.name.clone();

    let mut session = open_session(
        &args.source.file,
        args.source.sheet.as_deref(),
        &args.source.overrides,
        &settings,
    )?;

    let digest = checksum(session.bytes());
    if let Some(when) = previous_import(&conn, account_id, &digest)? {
        println!(
            "{}",
            format!("This file was already imported into {account_name} on {when}.").yellow()
        );
    }

    session.set_destination(Some(account));
    session.validate();
    if let Some(blocking) = session.issues().iter().find(|i| i.is_blocking()) {
        return Err(ExtratoError::Blocked(blocking.messages.clone()));
    }
    for issue in session.issues() {
        println!(
            "{} row {}: {}",
            "flagged".yellow(),
            issue.index() + 1,
            issue.messages.join("; ")
        );
    }

    if args.include_flagged {
        session.unmark_all_issues();
    } else {
        session.mark_all_issues();
    }
    for row in &args.include {
        session.set_excluded(row_index(*row), false)?;
    }
    for row in &args.exclude {
        session.set_excluded(row_index(*row), true)?;
    }
    for row in &args.toggle {
        session.toggle(row_index(*row))?;
    }

    let opts = CommitOptions {
        chunk_size: args
            .chunk_size
            .map(|n| n as usize)
            .unwrap_or(settings.chunk_size),
        strategy: args.strategy.unwrap_or(settings.commit_strategy),
    };

    if args.dry_run {
        let batch = session.build_batch(&scope)?;
        println!(
            "Dry run: {} movements would be imported into {account_name}, {} excluded, {} skipped",
            batch.movements.len(),
            session.exclusion().excluded_count(),
            batch.skipped_rows.len()
        );
        return Ok(());
    }

    let mut ledger = SqliteLedger::new(&conn);
    let outcome = session.commit(&mut ledger, &scope, opts)?;

    record_import(
        &conn,
        &ImportLogEntry {
            filename: session.file_name(),
            account_id,
            tenant_id: &scope.tenant_id,
            record_count: outcome.imported,
            date_range: outcome
                .date_range
                .as_ref()
                .map(|(a, b)| (a.as_str(), b.as_str())),
            checksum: &digest,
        },
    )?;

    println!(
        "{}",
        format!(
            "{} imported into {account_name}, {} excluded",
            outcome.imported, outcome.excluded
        )
        .green()
    );
    if !outcome.skipped.is_empty() {
        let rows: Vec<String> = outcome.skipped.iter().map(|r| (r + 1).to_string()).collect();
        println!(
            "{}",
            format!("Skipped rows without a valid date or amount: {}", rows.join(", ")).yellow()
        );
    }
    Ok(())
}
