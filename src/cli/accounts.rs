use comfy_table::{Cell, Table};

use crate::cli::open_ledger;
use crate::db::list_active_accounts;
use crate::error::Result;
use crate::settings::load_settings;

pub fn list() -> Result<()> {
    let settings = load_settings();
    let scope = settings.scope()?;
    let conn = open_ledger(&settings)?;
    let accounts = list_active_accounts(&conn, &scope)?;

    if accounts.is_empty() {
        println!("No active accounts for tenant {}.", scope.tenant_id);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Institution", "Branch"]);
    for account in accounts {
        table.add_row(vec![
            Cell::new(account.id),
            Cell::new(account.name),
            Cell::new(account.institution.unwrap_or_default()),
            Cell::new(account.branch_id.unwrap_or_else(|| "(all)".to_string())),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}
