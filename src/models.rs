use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub branch_id: Option<String>,
    pub name: String,
    pub institution: Option<String>,
}

/// Tenant and branch every ledger write is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    pub tenant_id: String,
    pub branch_id: Option<String>,
}

/// One raw spreadsheet or statement cell, before any coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    /// Days since the 1899-12-30 spreadsheet epoch.
    DateSerial(f64),
    Empty,
}

impl Cell {
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// A source row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: HashMap<String, Cell>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, cell: Cell) {
        self.cells.insert(column.into(), cell);
    }

    pub fn get(&self, column: &str) -> &Cell {
        self.cells.get(column).unwrap_or(&Cell::Empty)
    }

    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.values().all(Cell::is_blank)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    TaggedText,
    Workbook,
    Delimited,
}

/// Columns and rows pulled out of one file (or one sheet of a workbook).
#[derive(Debug, Clone)]
pub struct Dataset {
    pub kind: SourceKind,
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
    pub sheets: Vec<String>,
    pub sheet: Option<String>,
}

impl Dataset {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Date,
    Description,
    Amount,
    Balance,
    Document,
    Type,
}

impl Role {
    pub const REQUIRED: [Role; 3] = [Role::Date, Role::Description, Role::Amount];
    pub const ALL: [Role; 6] = [
        Role::Date,
        Role::Description,
        Role::Amount,
        Role::Balance,
        Role::Document,
        Role::Type,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Description => "description",
            Self::Amount => "amount",
            Self::Balance => "balance",
            Self::Document => "document",
            Self::Type => "type",
        }
    }

    pub fn from_key(key: &str) -> Option<Role> {
        Self::ALL.iter().find(|r| r.key() == key.trim().to_lowercase()).copied()
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}

/// Role → column binding. Inference and manual edits share this structure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMapping {
    bindings: BTreeMap<Role, String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, role: Role, column: impl Into<String>) {
        self.bindings.insert(role, column.into());
    }

    pub fn clear(&mut self, role: Role) {
        self.bindings.remove(&role);
    }

    pub fn column(&self, role: Role) -> Option<&str> {
        self.bindings.get(&role).map(String::as_str)
    }

    pub fn missing_required(&self) -> Vec<Role> {
        Role::REQUIRED
            .into_iter()
            .filter(|r| self.column(*r).is_none())
            .collect()
    }

    /// Cell bound to `role` in `row`, or `Empty` when the role is unbound.
    pub fn cell<'a>(&self, row: &'a RawRow, role: Role) -> &'a Cell {
        match self.column(role) {
            Some(col) => row.get(col),
            None => &Cell::Empty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credito,
    Debito,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credito => "credito",
            Self::Debito => "debito",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMovement {
    pub row: usize,
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub balance: Option<f64>,
    pub document: Option<String>,
    pub direction: Direction,
}

/// Problems found on one row. `row` is `None` for a configuration issue.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub row: Option<usize>,
    pub messages: Vec<String>,
}

impl ValidationIssue {
    /// Index as shown to users: the row number, or -1 for configuration.
    pub fn index(&self) -> i64 {
        self.row.map_or(-1, |r| r as i64)
    }

    pub fn is_blocking(&self) -> bool {
        self.row.is_none()
    }
}

/// Row index → excluded flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExclusionSet {
    flags: BTreeMap<usize, bool>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, row: usize, excluded: bool) {
        self.flags.insert(row, excluded);
    }

    pub fn toggle(&mut self, row: usize) {
        let flag = self.flags.entry(row).or_insert(false);
        *flag = !*flag;
    }

    pub fn is_excluded(&self, row: usize) -> bool {
        self.flags.get(&row).copied().unwrap_or(false)
    }

    pub fn excluded_rows(&self) -> Vec<usize> {
        self.flags
            .iter()
            .filter(|(_, excluded)| **excluded)
            .map(|(row, _)| *row)
            .collect()
    }

    pub fn excluded_count(&self) -> usize {
        self.flags.values().filter(|e| **e).count()
    }
}

/// Snapshot handed to the committer; dropped once the commit finishes.
#[derive(Debug, Clone)]
pub struct ImportBatch {
    pub account_id: i64,
    pub scope: TenantScope,
    pub movements: Vec<NormalizedMovement>,
    pub excluded_rows: Vec<usize>,
    pub skipped_rows: Vec<usize>,
}

/// Shape of one row written to the ledger store.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    pub account_id: i64,
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub balance: Option<f64>,
    pub document: Option<String>,
    pub direction: Direction,
    pub reconciled: bool,
}

impl LedgerRecord {
    pub fn from_movement(m: &NormalizedMovement, account_id: i64, scope: &TenantScope) -> Self {
        Self {
            account_id,
            tenant_id: scope.tenant_id.clone(),
            branch_id: scope.branch_id.clone(),
            date: m.date.clone(),
            description: m.description.clone(),
            amount: m.amount,
            balance: m.balance,
            document: m.document.clone(),
            direction: m.direction,
            reconciled: false,
        }
    }
}
