use std::io::IsTerminal;
use std::path::PathBuf;

use colored::Colorize;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path, Settings};

pub fn run(data_dir: Option<String>, tenant: Option<String>, branch: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    let defaults = Settings::default();

    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    } else if settings.data_dir == defaults.data_dir
        && settings.tenant_id.is_empty()
        && std::io::stdin().is_terminal()
    {
        // First run: offer to move the data directory
        println!("Data directory [{}]: ", settings.data_dir);
        let mut input = String::new();
        std::io::stdin().read_line(&mut input).ok();
        let chosen = input.trim();
        if !chosen.is_empty() {
            settings.data_dir = shellexpand_path(chosen);
        }
    }

    if let Some(tenant) = tenant {
        settings.tenant_id = tenant.trim().to_string();
    }
    if let Some(branch) = branch {
        let branch = branch.trim();
        settings.branch_id = (!branch.is_empty()).then(|| branch.to_string());
    }

    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;

    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;

    println!("Initialized extrato at {}", resolved.display());
    if settings.tenant_id.is_empty() {
        println!(
            "{}",
            "No tenant set yet. Run `extrato init --tenant <id>` before importing.".yellow()
        );
    } else {
        println!(
            "Tenant: {}{}",
            settings.tenant_id,
            settings
                .branch_id
                .as_deref()
                .map(|b| format!(" / branch {b}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}
