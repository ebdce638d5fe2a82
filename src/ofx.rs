use std::collections::HashMap;

use regex::Regex;

use crate::error::FormatError;
use crate::importer::decode_text;
use crate::models::{Cell, ColumnMapping, Dataset, RawRow, Role, SourceKind};

pub const COL_DATE: &str = "date";
pub const COL_DESCRIPTION: &str = "description";
pub const COL_AMOUNT: &str = "amount";
pub const COL_DOCUMENT: &str = "document";
pub const COL_TYPE: &str = "type";

const COLUMNS: [&str; 5] = [COL_DATE, COL_DESCRIPTION, COL_AMOUNT, COL_DOCUMENT, COL_TYPE];

const TXN_OPEN: &str = "<STMTTRN>";
const BLOCK_ENDS: &[&str] = &["<STMTTRN>", "</STMTTRN>", "</BANKTRANLIST>"];
const DOCUMENT_TAGS: &[&str] = &["CHECKNUM", "REFNUM", "FITID"];

/// Day, month and year cut out of a `YYYYMMDD[HHMMSS]` bank timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDate {
    pub day: String,
    pub month: String,
    pub year: String,
}

impl StatementDate {
    pub fn to_dmy(&self) -> String {
        format!("{}/{}/{}", self.day, self.month, self.year)
    }
}

pub fn split_statement_date(raw: &str) -> Option<StatementDate> {
    let raw = raw.trim();
    let head = raw.get(0..8)?;
    if !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(StatementDate {
        year: head[0..4].to_string(),
        month: head[4..6].to_string(),
        day: head[6..8].to_string(),
    })
}

/// Mapping used for every tagged-text file; never inferred.
pub fn fixed_mapping() -> ColumnMapping {
    let mut mapping = ColumnMapping::new();
    mapping.assign(Role::Date, COL_DATE);
    mapping.assign(Role::Description, COL_DESCRIPTION);
    mapping.assign(Role::Amount, COL_AMOUNT);
    mapping.assign(Role::Document, COL_DOCUMENT);
    mapping.assign(Role::Type, COL_TYPE);
    mapping
}

pub fn extract(bytes: &[u8]) -> Result<Dataset, FormatError> {
    let text = decode_text(bytes);
    let upper = text.to_ascii_uppercase();
    if !upper.contains("<OFX>") && !upper.contains(TXN_OPEN) {
        return Err(FormatError::CorruptContent(
            "no <OFX> or <STMTTRN> section found".to_string(),
        ));
    }

    let field_re = Regex::new(r"<([A-Za-z0-9.]+)>([^<\r\n]*)")
        .map_err(|e| FormatError::CorruptContent(e.to_string()))?;

    let mut rows = Vec::new();
    let mut cursor = 0;
    while let Some(found) = upper[cursor..].find(TXN_OPEN) {
        let start = cursor + found + TXN_OPEN.len();
        let len = BLOCK_ENDS
            .iter()
            .filter_map(|end| upper[start..].find(end))
            .min()
            .unwrap_or(upper.len() - start);
        let block = &text[start..start + len];
        rows.push(transaction_row(&block_fields(&field_re, block)));
        cursor = start + len;
    }

    if rows.is_empty() {
        return Err(FormatError::EmptyDataset);
    }
    tracing::debug!(transactions = rows.len(), "parsed tagged-text statement");

    Ok(Dataset {
        kind: SourceKind::TaggedText,
        columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows,
        sheets: Vec::new(),
        sheet: None,
    })
}

fn block_fields(field_re: &Regex, block: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for caps in field_re.captures_iter(block) {
        let tag = caps[1].to_ascii_uppercase();
        let value = unescape(caps[2].trim());
        fields.entry(tag).or_insert(value);
    }
    fields
}

fn transaction_row(fields: &HashMap<String, String>) -> RawRow {
    let non_empty = |tag: &str| fields.get(tag).filter(|v| !v.is_empty()).cloned();

    let date = match fields.get("DTPOSTED") {
        Some(raw) => match split_statement_date(raw) {
            Some(d) => Cell::Text(d.to_dmy()),
            None => Cell::Text(raw.clone()),
        },
        None => Cell::Empty,
    };

    let description = non_empty("MEMO")
        .or_else(|| non_empty("NAME"))
        .map_or(Cell::Empty, Cell::Text);

    let amount = non_empty("TRNAMT").map(|raw| parse_statement_amount(&raw));

    let document = DOCUMENT_TAGS
        .iter()
        .find_map(|tag| non_empty(*tag))
        .map_or(Cell::Empty, Cell::Text);

    let kind = if amount.unwrap_or(0.0) < 0.0 { "debito" } else { "credito" };

    let mut row = RawRow::new();
    row.insert(COL_DATE, date);
    row.insert(COL_DESCRIPTION, description);
    row.insert(COL_AMOUNT, amount.map_or(Cell::Empty, Cell::Number));
    row.insert(COL_DOCUMENT, document);
    row.insert(COL_TYPE, Cell::Text(kind.to_string()));
    row
}

// TRNAMT uses `.` for decimals; some banks emit `,` instead.
fn parse_statement_amount(raw: &str) -> f64 {
    let s = raw.trim().replace('+', "");
    let s = if s.contains('.') { s.replace(',', "") } else { s.replace(',', ".") };
    s.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}
