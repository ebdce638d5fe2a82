use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use crate::committer::LedgerStore;
use crate::error::{ExtratoError, Result};
use crate::models::{Account, LedgerRecord, TenantScope};

pub const DB_FILE: &str = "extrato.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    branch_id TEXT,
    name TEXT NOT NULL,
    institution TEXT,
    is_active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS movements (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL,
    tenant_id TEXT NOT NULL,
    branch_id TEXT,
    date TEXT NOT NULL,
    description TEXT NOT NULL,
    amount REAL NOT NULL CHECK (amount <> 0),
    balance REAL,
    document TEXT,
    direction TEXT NOT NULL CHECK (direction IN ('credito', 'debito')),
    reconciled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (account_id) REFERENCES accounts(id)
);

CREATE INDEX IF NOT EXISTS idx_movements_scope ON movements (tenant_id, account_id, date);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    account_id INTEGER NOT NULL,
    tenant_id TEXT NOT NULL,
    import_date TEXT DEFAULT (datetime('now')),
    record_count INTEGER,
    date_range_start TEXT,
    date_range_end TEXT,
    checksum TEXT,
    FOREIGN KEY (account_id) REFERENCES accounts(id)
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

fn account_from_row(row: &rusqlite::Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        branch_id: row.get(1)?,
        name: row.get(2)?,
        institution: row.get(3)?,
    })
}

const ACCOUNT_COLUMNS: &str = "id, branch_id, name, institution";

// Branch-less accounts are shared by every branch of the tenant.
const SCOPE_FILTER: &str =
    "tenant_id = ?1 AND (?2 IS NULL OR branch_id IS NULL OR branch_id = ?2) AND is_active = 1";

pub fn list_active_accounts(conn: &Connection, scope: &TenantScope) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {SCOPE_FILTER} ORDER BY name"
    ))?;
    let accounts = stmt
        .query_map(rusqlite::params![scope.tenant_id, scope.branch_id], account_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(accounts)
}

/// Look up an active account in scope by id or by exact name.
pub fn find_active_account(conn: &Connection, scope: &TenantScope, key: &str) -> Result<Account> {
    let by_id = key.trim().parse::<i64>().ok();
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {SCOPE_FILTER} \
         AND (id = ?3 OR name = ?4) ORDER BY id = ?3 DESC LIMIT 1"
    ))?;
    let account = stmt
        .query_row(
            rusqlite::params![scope.tenant_id, scope.branch_id, by_id, key.trim()],
            account_from_row,
        )
        .optional()?;
    account.ok_or_else(|| ExtratoError::UnknownAccount(key.to_string()))
}

fn insert_records(conn: &Connection, records: &[LedgerRecord]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO movements (account_id, tenant_id, branch_id, date, description, amount, balance, document, direction, reconciled) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for r in records {
        stmt.execute(rusqlite::params![
            r.account_id,
            r.tenant_id,
            r.branch_id,
            r.date,
            r.description,
            r.amount,
            r.balance,
            r.document,
            r.direction.as_str(),
            r.reconciled as i32,
        ])?;
    }
    Ok(())
}

/// SQLite ledger. Each chunk is written in its own transaction.
pub struct SqliteLedger<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteLedger<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl LedgerStore for SqliteLedger<'_> {
    fn insert_chunk(&mut self, records: &[LedgerRecord]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_records(&tx, records)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_atomic(&mut self, records: &[LedgerRecord], chunk_size: usize) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for chunk in records.chunks(chunk_size.max(1)) {
            insert_records(&tx, chunk)?;
        }
        tx.commit()?;
        Ok(())
    }
}

pub struct ImportLogEntry<'a> {
    pub filename: &'a str,
    pub account_id: i64,
    pub tenant_id: &'a str,
    pub record_count: usize,
    pub date_range: Option<(&'a str, &'a str)>,
    pub checksum: &'a str,
}

pub fn record_import(conn: &Connection, entry: &ImportLogEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO imports (filename, account_id, tenant_id, record_count, date_range_start, date_range_end, checksum) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            entry.filename,
            entry.account_id,
            entry.tenant_id,
            entry.record_count as i64,
            entry.date_range.map(|(start, _)| start),
            entry.date_range.map(|(_, end)| end),
            entry.checksum,
        ],
    )?;
    Ok(())
}

/// When the same file was imported into this account before, the import date.
pub fn previous_import(conn: &Connection, account_id: i64, checksum: &str) -> Result<Option<String>> {
    let date = conn
        .query_row(
            "SELECT import_date FROM imports WHERE account_id = ?1 AND checksum = ?2 \
             ORDER BY id DESC LIMIT 1",
            rusqlite::params![account_id, checksum],
            |row| row.get(0),
        )
        .optional()?;
    Ok(date)
}
