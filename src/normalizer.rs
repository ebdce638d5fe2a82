use chrono::{NaiveDate, NaiveDateTime};

use crate::models::{Cell, Direction};

const CURRENCY_SYMBOLS: &[&str] = &["R$", "US$", "$", "€", "£"];

const DEBIT_MARKERS: &[&str] = &["deb", "déb"];
const DEBIT_CODES: &[&str] = &["d", "dr"];
const CREDIT_MARKERS: &[&str] = &["cred", "créd"];
const CREDIT_CODES: &[&str] = &["c", "cr"];

// Tried in order after the dd/mm/yyyy and ISO fast paths.
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%d/%m/%y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y/%m/%d",
    "%Y%m%d",
    "%d %b %Y",
    "%b %d, %Y",
];
const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Brazilian-style amount: `.` groups thousands, `,` marks decimals.
/// Anything unparseable is `0.0`.
pub fn parse_amount(raw: &str) -> f64 {
    let mut s = raw.replace('"', "");
    for symbol in CURRENCY_SYMBOLS {
        s = s.replace(symbol, "");
    }
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return 0.0;
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return -parse_amount(inner);
    }
    if let Some(inner) = s.strip_suffix('-') {
        return -parse_amount(inner);
    }
    let s = s.replace('.', "").replace(',', ".");
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Day-first `dd/mm/yyyy`, ISO, or one of a few common layouts, as `yyyy-mm-dd`.
pub fn parse_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(date) = parse_date_dmy(raw) {
        return Some(date);
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d.format("%Y-%m-%d").to_string());
    }
    parse_date_fallback(raw).map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_date_dmy(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 3 || parts[2].len() != 4 {
        return None;
    }
    let d: u32 = parts[0].parse().ok()?;
    let m: u32 = parts[1].parse().ok()?;
    let y: i32 = parts[2].parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d).map(|dt| dt.format("%Y-%m-%d").to_string())
}

fn parse_date_fallback(raw: &str) -> Option<NaiveDate> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for fmt in FALLBACK_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

// Excel's calendar runs from serial 1 (1900-01-01) to 2958465 (9999-12-31).
const MIN_EXCEL_SERIAL: f64 = 1.0;
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

pub fn excel_serial_to_date(serial: f64) -> Option<String> {
    if !(MIN_EXCEL_SERIAL..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = chrono::Duration::try_days(serial.trunc() as i64)?;
    let date = base.checked_add_signed(days)?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Whole numbers with eight digits are read as `YYYYMMDD`, anything else as a serial.
fn number_to_date(n: f64) -> Option<String> {
    if n.fract() == 0.0 && (10_000_000.0..100_000_000.0).contains(&n) {
        let digits = format!("{}", n as i64);
        return NaiveDate::parse_from_str(&digits, "%Y%m%d")
            .ok()
            .map(|d| d.format("%Y-%m-%d").to_string());
    }
    excel_serial_to_date(n)
}

/// An explicit type marker wins; otherwise the sign of `amount` decides.
pub fn infer_direction(amount: f64, type_text: Option<&str>) -> Direction {
    if let Some(direction) = type_text.and_then(direction_from_text) {
        return direction;
    }
    if amount < 0.0 {
        Direction::Debito
    } else {
        Direction::Credito
    }
}

fn direction_from_text(text: &str) -> Option<Direction> {
    let t = text.trim().to_lowercase();
    if t.is_empty() {
        return None;
    }
    if DEBIT_MARKERS.iter().any(|m| t.contains(m)) {
        return Some(Direction::Debito);
    }
    if CREDIT_MARKERS.iter().any(|m| t.contains(m)) {
        return Some(Direction::Credito);
    }
    if DEBIT_CODES.contains(&t.as_str()) {
        return Some(Direction::Debito);
    }
    if CREDIT_CODES.contains(&t.as_str()) {
        return Some(Direction::Credito);
    }
    None
}

/// Debits are stored negative. Credits keep whatever sign they came with.
pub fn resolve_signed_amount(amount: f64, direction: Direction) -> f64 {
    match direction {
        Direction::Debito if amount > 0.0 => -amount,
        _ => amount,
    }
}

// ---------------------------------------------------------------------------
// Cell coercion
// ---------------------------------------------------------------------------

pub fn cell_text(cell: &Cell) -> String {
    match cell {
        Cell::Text(s) => s.trim().to_string(),
        Cell::Number(n) => format_number(*n),
        Cell::DateSerial(n) => excel_serial_to_date(*n).unwrap_or_default(),
        Cell::Empty => String::new(),
    }
}

pub fn cell_amount(cell: &Cell) -> f64 {
    match cell {
        Cell::Number(n) if n.is_finite() => *n,
        Cell::Text(s) => parse_amount(s),
        _ => 0.0,
    }
}

pub fn cell_optional_amount(cell: &Cell) -> Option<f64> {
    if cell.is_blank() {
        None
    } else {
        Some(cell_amount(cell))
    }
}

pub fn cell_date(cell: &Cell) -> Option<String> {
    match cell {
        Cell::DateSerial(n) => excel_serial_to_date(*n),
        Cell::Number(n) => number_to_date(*n),
        Cell::Text(s) => parse_date(s),
        Cell::Empty => None,
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
