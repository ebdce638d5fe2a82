use std::collections::HashMap;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{FormatError, Result};
use crate::models::{Cell, Dataset, RawRow, SourceKind};
use crate::normalizer::cell_text;
use crate::ofx;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bank exports are frequently Windows-1252; fall back to it when UTF-8 fails.
pub fn decode_text(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Spreadsheet-style column name: 0 → A, 25 → Z, 26 → AA.
pub fn column_letter(mut idx: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}

fn check_size(size: u64, limit: u64) -> std::result::Result<(), FormatError> {
    if size > limit {
        return Err(FormatError::TooLarge { size, limit });
    }
    Ok(())
}

/// Read a source file, refusing oversized files before touching their bytes.
pub fn read_source(path: &Path, max_file_size: u64) -> Result<Vec<u8>> {
    let size = std::fs::metadata(path)?.len();
    check_size(size, max_file_size)?;
    Ok(std::fs::read(path)?)
}

// ---------------------------------------------------------------------------
// Importer kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImporterKind {
    TaggedText,
    Delimited,
    #[cfg(feature = "xlsx")]
    Workbook,
}

impl ImporterKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::TaggedText => "ofx",
            Self::Delimited => "delimited",
            #[cfg(feature = "xlsx")]
            Self::Workbook => "workbook",
        }
    }

    pub fn extensions(&self) -> &[&str] {
        match self {
            Self::TaggedText => &["ofx", "qfx"],
            Self::Delimited => &["csv", "tsv", "txt"],
            #[cfg(feature = "xlsx")]
            Self::Workbook => &["xlsx", "xlsm", "xls", "xlsb", "ods"],
        }
    }

    pub fn detect(&self, bytes: &[u8]) -> bool {
        match self {
            Self::TaggedText => {
                let head = &bytes[..bytes.len().min(4096)];
                decode_text(head).to_ascii_uppercase().contains("<OFX>")
            }
            _ => false,
        }
    }

    #[cfg_attr(not(feature = "xlsx"), allow(unused_variables))]
    pub fn extract(&self, bytes: &[u8], sheet: Option<&str>) -> std::result::Result<Dataset, FormatError> {
        match self {
            Self::TaggedText => ofx::extract(bytes),
            Self::Delimited => extract_delimited(bytes),
            #[cfg(feature = "xlsx")]
            Self::Workbook => extract_workbook(bytes, sheet),
        }
    }
}

const ALL_IMPORTERS: &[ImporterKind] = &[
    ImporterKind::TaggedText,
    ImporterKind::Delimited,
    #[cfg(feature = "xlsx")]
    ImporterKind::Workbook,
];

/// Pick an importer from the file extension; plain-text files that carry an
/// OFX envelope are read as statements.
pub fn get_for_file(file_name: &str, bytes: &[u8]) -> std::result::Result<ImporterKind, FormatError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let importer = ALL_IMPORTERS
        .iter()
        .find(|i| i.extensions().contains(&ext.as_str()))
        .copied()
        .ok_or_else(|| FormatError::UnsupportedExtension(ext.clone()))?;
    if importer == ImporterKind::Delimited && ImporterKind::TaggedText.detect(bytes) {
        return Ok(ImporterKind::TaggedText);
    }
    Ok(importer)
}

/// Turn file bytes into columns and rows. `sheet` only applies to workbooks.
pub fn extract_file(
    bytes: &[u8],
    file_name: &str,
    sheet: Option<&str>,
    max_file_size: u64,
) -> std::result::Result<Dataset, FormatError> {
    check_size(bytes.len() as u64, max_file_size)?;
    let importer = get_for_file(file_name, bytes)?;
    let dataset = importer.extract(bytes, sheet)?;
    tracing::info!(
        file = file_name,
        importer = importer.key(),
        sheet = dataset.sheet.as_deref().unwrap_or("-"),
        columns = dataset.columns.len(),
        rows = dataset.rows.len(),
        "extracted rows"
    );
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// Header row → columns
// ---------------------------------------------------------------------------

/// Row 0 is the header. When every header cell is blank, columns are named
/// after the non-empty positions of the first data row instead. Columns
/// without a name are dropped, and fully blank data rows are skipped.
pub fn tabulate(grid: &[Vec<Cell>]) -> std::result::Result<(Vec<String>, Vec<RawRow>), FormatError> {
    let Some((header, data)) = grid.split_first() else {
        return Err(FormatError::EmptyDataset);
    };

    let names: Vec<String> = header.iter().map(cell_text).collect();

    let positions: Vec<(usize, String)> = if names.iter().all(|n| n.is_empty()) {
        let first = data.first().ok_or(FormatError::EmptyDataset)?;
        first
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_blank())
            .map(|(i, _)| (i, column_letter(i)))
            .collect()
    } else {
        dedupe_names(&names)
    };

    let columns: Vec<String> = positions.iter().map(|(_, n)| n.clone()).collect();
    let mut rows = Vec::new();
    for cells in data {
        let mut row = RawRow::new();
        for (i, name) in &positions {
            row.insert(name.clone(), cells.get(*i).cloned().unwrap_or(Cell::Empty));
        }
        if row.is_empty() {
            continue;
        }
        rows.push(row);
    }

    if columns.is_empty() || rows.is_empty() {
        return Err(FormatError::EmptyDataset);
    }
    Ok((columns, rows))
}

// Repeated headers get a numeric suffix: Valor, Valor_1, Valor_2.
fn dedupe_names(names: &[String]) -> Vec<(usize, String)> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut out = Vec::new();
    for (i, name) in names.iter().enumerate() {
        if name.is_empty() {
            continue;
        }
        let count = seen.entry(name.as_str()).or_insert(0);
        let unique = if *count == 0 { name.clone() } else { format!("{name}_{count}") };
        *count += 1;
        out.push((i, unique));
    }
    out
}

// ---------------------------------------------------------------------------
// Delimited text
// ---------------------------------------------------------------------------

fn sniff_delimiter(text: &str) -> u8 {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut best = (b',', line.matches(',').count());
    for candidate in [b';', b'\t'] {
        let count = line.matches(candidate as char).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

fn extract_delimited(bytes: &[u8]) -> std::result::Result<Dataset, FormatError> {
    let text = decode_text(bytes);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(&text))
        .from_reader(text.as_bytes());

    let mut grid = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| FormatError::CorruptContent(e.to_string()))?;
        grid.push(
            record
                .iter()
                .map(|f| {
                    let f = f.trim();
                    if f.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(f.to_string())
                    }
                })
                .collect(),
        );
    }

    let (columns, rows) = tabulate(&grid)?;
    Ok(Dataset {
        kind: SourceKind::Delimited,
        columns,
        rows,
        sheets: Vec::new(),
        sheet: None,
    })
}

// ---------------------------------------------------------------------------
// Workbooks (feature-gated)
// ---------------------------------------------------------------------------

#[cfg(feature = "xlsx")]
fn data_to_cell(data: &calamine::Data) -> Cell {
    use calamine::Data;
    #[allow(unreachable_patterns)]
    match data {
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => Cell::DateSerial(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) | Data::Empty => Cell::Empty,
        _ => Cell::Empty,
    }
}

/// Lay a worksheet range out as a grid anchored at column A.
#[cfg(feature = "xlsx")]
pub fn range_to_grid(range: &calamine::Range<calamine::Data>) -> Vec<Vec<Cell>> {
    let col_offset = range.start().map_or(0, |(_, c)| c as usize);
    range
        .rows()
        .map(|row| {
            let mut cells = vec![Cell::Empty; col_offset];
            cells.extend(row.iter().map(data_to_cell));
            cells
        })
        .collect()
}

#[cfg(feature = "xlsx")]
fn extract_workbook(bytes: &[u8], sheet: Option<&str>) -> std::result::Result<Dataset, FormatError> {
    use calamine::Reader;

    let mut workbook = calamine::open_workbook_auto_from_rs(std::io::Cursor::new(bytes.to_vec()))
        .map_err(|e| FormatError::CorruptContent(format!("Failed to open workbook: {e}")))?;

    let sheets = workbook.sheet_names();
    let name = match sheet {
        Some(s) => s.to_string(),
        None => sheets.first().cloned().ok_or(FormatError::EmptyDataset)?,
    };
    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| FormatError::CorruptContent(format!("Failed to read sheet {name}: {e}")))?;

    let (columns, rows) = tabulate(&range_to_grid(&range))?;
    Ok(Dataset {
        kind: SourceKind::Workbook,
        columns,
        rows,
        sheets,
        sheet: Some(name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_tabulate_uses_header_row() {
        let grid = vec![
            vec![text("Data"), text("Descrição"), text("Valor")],
            vec![text("01/02/2024"), text("Dízimo"), Cell::Number(150.0)],
        ];
        let (columns, rows) = tabulate(&grid).unwrap();
        assert_eq!(columns, vec!["Data", "Descrição", "Valor"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Valor"), &Cell::Number(150.0));
    }

    #[test]
    fn test_tabulate_blank_header_uses_first_row_keys() {
        let grid = vec![
            vec![Cell::Empty, text("  "), Cell::Empty, Cell::Empty],
            vec![text("01/02/2024"), Cell::Empty, text("Oferta"), Cell::Number(10.0)],
            vec![text("02/02/2024"), text("x"), text("Luz"), Cell::Number(-5.0)],
        ];
        let (columns, rows) = tabulate(&grid).unwrap();
        assert_eq!(columns, vec!["A", "C", "D"]);
        let first_keys: HashSet<&str> = rows[0].keys().collect();
        let column_set: HashSet<&str> = columns.iter().map(String::as_str).collect();
        assert_eq!(first_keys, column_set);
        assert_eq!(rows[1].get("C"), &text("Luz"));
    }

    #[test]
    fn test_tabulate_drops_blank_header_columns_and_empty_rows() {
        let grid = vec![
            vec![text("Data"), Cell::Empty, text("Valor")],
            vec![text("01/02/2024"), text("ignored"), text("10,00")],
            vec![Cell::Empty, Cell::Empty, text(" ")],
        ];
        let (columns, rows) = tabulate(&grid).unwrap();
        assert_eq!(columns, vec!["Data", "Valor"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].keys().count(), 2);
    }

    #[test]
    fn test_tabulate_dedupes_repeated_headers() {
        let grid = vec![
            vec![text("Valor"), text("Valor")],
            vec![text("1"), text("2")],
        ];
        let (columns, _) = tabulate(&grid).unwrap();
        assert_eq!(columns, vec!["Valor", "Valor_1"]);
    }

    #[test]
    fn test_tabulate_header_only_is_empty() {
        let grid = vec![vec![text("Data"), text("Valor")]];
        assert_eq!(tabulate(&grid).unwrap_err(), FormatError::EmptyDataset);
        assert_eq!(tabulate(&[]).unwrap_err(), FormatError::EmptyDataset);
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("Data;Descrição;Valor\n01/01/2024;x;1,00"), b';');
        assert_eq!(sniff_delimiter("Data,Descricao,Valor"), b',');
        assert_eq!(sniff_delimiter("Data\tDescricao\tValor"), b'\t');
        assert_eq!(sniff_delimiter("\n\nData;Valor"), b';');
    }

    #[test]
    fn test_extract_semicolon_csv() {
        let content = "Data;Descrição;Valor;Saldo\n\
31/01/2024;Dízimo João;1.234,56;5.000,00\n\
01/02/2024;Conta de luz;-320,10;4.679,90\n";
        let ds = extract_file(content.as_bytes(), "extrato.csv", None, DEFAULT_MAX_FILE_SIZE).unwrap();
        assert_eq!(ds.kind, SourceKind::Delimited);
        assert_eq!(ds.columns, vec!["Data", "Descrição", "Valor", "Saldo"]);
        assert_eq!(ds.rows.len(), 2);
        assert_eq!(ds.rows[0].get("Valor"), &text("1.234,56"));
    }

    #[test]
    fn test_extract_latin1_csv() {
        let mut bytes = b"Data;Descri".to_vec();
        bytes.push(0xE7); // ç
        bytes.extend_from_slice(b"ao;Valor\n01/01/2024;Oferta;10,00\n");
        let ds = extract_file(&bytes, "extrato.csv", None, DEFAULT_MAX_FILE_SIZE).unwrap();
        assert_eq!(ds.columns[1], "Descriçao");
    }

    #[test]
    fn test_windows_1252_punctuation() {
        let mut bytes = b"PIX ".to_vec();
        bytes.push(0x96);
        bytes.extend_from_slice(b" ");
        bytes.push(0x93);
        bytes.extend_from_slice(b"Oferta");
        bytes.push(0x94);
        bytes.extend_from_slice(b" ");
        bytes.push(0x80);
        assert_eq!(decode_text(&bytes), "PIX \u{2013} \u{201c}Oferta\u{201d} \u{20ac}");
    }

    #[test]
    fn test_txt_with_ofx_envelope_is_statement() {
        let content = "<OFX><STMTTRN><DTPOSTED>20240131<TRNAMT>-5.00<MEMO>TARIFA\n</OFX>";
        let ds = extract_file(content.as_bytes(), "extrato.txt", None, DEFAULT_MAX_FILE_SIZE).unwrap();
        assert_eq!(ds.kind, SourceKind::TaggedText);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = extract_file(b"%PDF-1.4", "extrato.pdf", None, DEFAULT_MAX_FILE_SIZE).unwrap_err();
        assert_eq!(err, FormatError::UnsupportedExtension("pdf".to_string()));
    }

    #[test]
    fn test_oversized_file_rejected_before_parsing() {
        let content = "not,a,valid\"csv";
        let err = extract_file(content.as_bytes(), "big.csv", None, 4).unwrap_err();
        assert!(matches!(err, FormatError::TooLarge { size: 15, limit: 4 }));
    }

    #[test]
    fn test_read_source_checks_size_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.csv");
        std::fs::write(&path, vec![b'a'; 64]).unwrap();
        assert!(read_source(&path, 32).is_err());
        assert_eq!(read_source(&path, 64).unwrap().len(), 64);
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(checksum(b"abc"), checksum(b"abc"));
        assert_ne!(checksum(b"abc"), checksum(b"abd"));
        assert_eq!(checksum(b"").len(), 64);
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_range_to_grid_keeps_cell_kinds() {
        use calamine::{Data, Range};
        let mut range = Range::new((0, 1), (1, 3));
        range.set_value((0, 1), Data::String("Data".into()));
        range.set_value((0, 2), Data::String("Descrição".into()));
        range.set_value((0, 3), Data::String("Valor".into()));
        range.set_value((1, 1), Data::String("31/01/2024".into()));
        range.set_value((1, 2), Data::String("Oferta".into()));
        range.set_value((1, 3), Data::Float(99.9));

        let grid = range_to_grid(&range);
        assert_eq!(grid[0][0], Cell::Empty);
        assert_eq!(grid[1][3], Cell::Number(99.9));

        let (columns, rows) = tabulate(&grid).unwrap();
        assert_eq!(columns, vec!["Data", "Descrição", "Valor"]);
        assert_eq!(rows[0].get("Descrição"), &text("Oferta"));
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_corrupt_workbook() {
        let err = extract_file(b"not a zip", "extrato.xlsx", None, DEFAULT_MAX_FILE_SIZE).unwrap_err();
        assert!(matches!(err, FormatError::CorruptContent(_)));
    }
}
