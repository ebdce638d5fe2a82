use thiserror::Error;

/// Why a source file could not be turned into rows.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    #[error("Unsupported file type: {0}")]
    UnsupportedExtension(String),

    #[error("Could not read file contents: {0}")]
    CorruptContent(String),

    #[error("No rows found in file")]
    EmptyDataset,

    #[error("File is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
}

/// A ledger write failed. Under the sequential strategy, chunks written
/// before the failure stay in the ledger.
#[derive(Error, Debug)]
#[error("Failed to save movements: {source}")]
pub struct CommitError {
    #[source]
    pub source: Box<ExtratoError>,
}

#[derive(Error, Debug)]
pub enum ExtratoError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("No destination account selected")]
    NoDestination,

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),

    #[error("Row {} does not exist", .0 + 1)]
    UnknownRow(usize),

    #[error("Statement files use a fixed column mapping")]
    FixedMapping,

    #[error("Nothing to import: every row is excluded or invalid")]
    NothingToImport,

    #[error("Import is not configured: {}", .0.join("; "))]
    Blocked(Vec<String>),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ExtratoError>;
