use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{open_ledger, open_session, SourceArgs};
use crate::committer::build_movement;
use crate::db::find_active_account;
use crate::error::Result;
use crate::fmt::money;
use crate::models::{Role, SourceKind};
use crate::normalizer::cell_text;
use crate::settings::load_settings;
use crate::validator::row_messages;

pub fn run(source: &SourceArgs, account: Option<&str>, preview_rows: usize) -> Result<()> {
    let settings = load_settings();
    let mut session = open_session(
        &source.file,
        source.sheet.as_deref(),
        &source.overrides,
        &settings,
    )?;

    if let Some(key) = account {
        let scope = settings.scope()?;
        let conn = open_ledger(&settings)?;
        session.set_destination(Some(find_active_account(&conn, &scope, key)?));
    }

    let dataset = session.dataset();
    let kind = match dataset.kind {
        SourceKind::TaggedText => "OFX statement",
        SourceKind::Workbook => "spreadsheet",
        SourceKind::Delimited => "delimited text",
    };
    println!("File:     {} ({kind})", session.file_name());
    if !dataset.sheets.is_empty() {
        let current = dataset.sheet.as_deref().unwrap_or_default();
        let sheets: Vec<String> = dataset
            .sheets
            .iter()
            .map(|s| if s == current { format!("[{s}]") } else { s.clone() })
            .collect();
        println!("Sheets:   {}", sheets.join(", "));
    }
    if let Some(account) = session.destination() {
        println!("Account:  {} (#{})", account.name, account.id);
    }
    println!("Rows:     {}", dataset.rows.len());
    println!("Columns:  {}", dataset.columns.join(", "));

    let mut mapping_table = Table::new();
    mapping_table.set_header(vec!["Role", "Column"]);
    for role in Role::ALL {
        let column = match session.mapping().column(role) {
            Some(c) => c.to_string(),
            None if role.is_required() => "(not mapped)".red().to_string(),
            None => "-".to_string(),
        };
        let label = if role.is_required() {
            format!("{}*", role.key())
        } else {
            role.key().to_string()
        };
        mapping_table.add_row(vec![Cell::new(label), Cell::new(column)]);
    }
    println!("\nMapping\n{mapping_table}");

    if let Some(blocking) = session.validate().iter().find(|i| i.is_blocking()) {
        println!("\n{}", "Not ready to import:".yellow().bold());
        for message in &blocking.messages {
            println!("  - {message}");
        }
    }

    let dataset = session.dataset();
    let mapping = session.mapping();
    let can_check_rows = mapping.missing_required().is_empty();

    let mut preview = Table::new();
    preview.set_header(vec!["#", "Date", "Description", "Amount", "Direction", "Problems"]);
    for (idx, row) in dataset.rows.iter().enumerate().take(preview_rows) {
        let problems = if can_check_rows {
            row_messages(row, mapping).join("; ")
        } else {
            String::new()
        };
        let cells = match build_movement(idx, row, mapping) {
            Some(m) => vec![
                Cell::new(idx + 1),
                Cell::new(m.date),
                Cell::new(m.description),
                Cell::new(money(m.amount)),
                Cell::new(m.direction),
                Cell::new(problems.red()),
            ],
            None => vec![
                Cell::new(idx + 1),
                Cell::new(cell_text(mapping.cell(row, Role::Date))),
                Cell::new(cell_text(mapping.cell(row, Role::Description))),
                Cell::new(cell_text(mapping.cell(row, Role::Amount))),
                Cell::new("-"),
                Cell::new(problems.red()),
            ],
        };
        preview.add_row(cells);
    }
    println!("\nPreview\n{preview}");
    if dataset.rows.len() > preview_rows {
        println!("... {} more rows", dataset.rows.len() - preview_rows);
    }

    if can_check_rows {
        let flagged = dataset
            .rows
            .iter()
            .filter(|row| !row_messages(row, mapping).is_empty())
            .count();
        println!("\n{} rows ok, {} flagged", dataset.rows.len() - flagged, flagged);
    }
    Ok(())
}
