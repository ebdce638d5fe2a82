use crate::models::{ColumnMapping, ExclusionSet, RawRow, Role, ValidationIssue};
use crate::normalizer::{cell_amount, cell_date, cell_text};

pub const MSG_INVALID_DATE: &str = "Data inválida";
pub const MSG_MISSING_DESCRIPTION: &str = "Descrição ausente";
pub const MSG_INVALID_AMOUNT: &str = "Valor inválido";
pub const MSG_NO_DESTINATION: &str = "Conta de destino não selecionada";

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Date => "data",
        Role::Description => "descrição",
        Role::Amount => "valor",
        Role::Balance => "saldo",
        Role::Document => "documento",
        Role::Type => "tipo",
    }
}

pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub exclusion: ExclusionSet,
}

/// Everything that must be in place before rows are checked.
pub fn config_problems(mapping: &ColumnMapping, has_destination: bool) -> Vec<String> {
    let mut problems: Vec<String> = mapping
        .missing_required()
        .into_iter()
        .map(|role| format!("Coluna de {} não mapeada", role_label(role)))
        .collect();
    if !has_destination {
        problems.push(MSG_NO_DESTINATION.to_string());
    }
    problems
}

pub fn date_is_valid(row: &RawRow, mapping: &ColumnMapping) -> bool {
    cell_date(mapping.cell(row, Role::Date)).is_some()
}

pub fn amount_is_zero(row: &RawRow, mapping: &ColumnMapping) -> bool {
    cell_amount(mapping.cell(row, Role::Amount)) == 0.0
}

/// True when a row cannot become a ledger movement at all.
pub fn is_unstorable(row: &RawRow, mapping: &ColumnMapping) -> bool {
    !date_is_valid(row, mapping) || amount_is_zero(row, mapping)
}

pub fn row_messages(row: &RawRow, mapping: &ColumnMapping) -> Vec<String> {
    let mut messages = Vec::new();
    if !date_is_valid(row, mapping) {
        messages.push(MSG_INVALID_DATE.to_string());
    }
    if cell_text(mapping.cell(row, Role::Description)).is_empty() {
        messages.push(MSG_MISSING_DESCRIPTION.to_string());
    }
    if amount_is_zero(row, mapping) {
        messages.push(MSG_INVALID_AMOUNT.to_string());
    }
    messages
}

/// Recompute issues and default exclusion from scratch.
pub fn validate(rows: &[RawRow], mapping: &ColumnMapping, has_destination: bool) -> ValidationReport {
    let problems = config_problems(mapping, has_destination);
    if !problems.is_empty() {
        tracing::warn!(problems = ?problems, "import is not configured");
        return ValidationReport {
            issues: vec![ValidationIssue {
                row: None,
                messages: problems,
            }],
            exclusion: ExclusionSet::new(),
        };
    }

    let mut issues = Vec::new();
    let mut exclusion = ExclusionSet::new();
    for (idx, row) in rows.iter().enumerate() {
        let messages = row_messages(row, mapping);
        exclusion.set(idx, !messages.is_empty());
        if !messages.is_empty() {
            issues.push(ValidationIssue {
                row: Some(idx),
                messages,
            });
        }
    }
    tracing::info!(rows = rows.len(), issues = issues.len(), "validated rows");
    ValidationReport { issues, exclusion }
}

/// Bulk mark/unmark, limited to rows that are listed as issues.
pub fn set_all_issues(exclusion: &mut ExclusionSet, issues: &[ValidationIssue], excluded: bool) {
    for row in issues.iter().filter_map(|i| i.row) {
        exclusion.set(row, excluded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cell;

    fn mapping() -> ColumnMapping {
        let mut m = ColumnMapping::new();
        m.assign(Role::Date, "Data");
        m.assign(Role::Description, "Descrição");
        m.assign(Role::Amount, "Valor");
        m
    }

    fn row(date: &str, desc: &str, amount: &str) -> RawRow {
        let mut r = RawRow::new();
        r.insert("Data", Cell::Text(date.into()));
        r.insert("Descrição", Cell::Text(desc.into()));
        r.insert("Valor", Cell::Text(amount.into()));
        r
    }

    #[test]
    fn test_clean_rows_are_not_excluded() {
        let rows = vec![row("31/01/2024", "Dízimo", "100,00")];
        let report = validate(&rows, &mapping(), true);
        assert!(report.issues.is_empty());
        assert!(!report.exclusion.is_excluded(0));
        assert_eq!(report.exclusion.excluded_count(), 0);
    }

    #[test]
    fn test_row_with_every_problem_gets_three_messages() {
        let rows = vec![row("ontem", "  ", "0,00")];
        let report = validate(&rows, &mapping(), true);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].index(), 0);
        assert_eq!(
            report.issues[0].messages,
            vec![MSG_INVALID_DATE, MSG_MISSING_DESCRIPTION, MSG_INVALID_AMOUNT]
        );
        assert!(report.exclusion.is_excluded(0));
    }

    #[test]
    fn test_out_of_range_numeric_date_is_invalid() {
        let mut huge = row("", "Oferta", "10,00");
        huge.insert("Data", Cell::Number(123456789012345678.0));
        let mut compact = row("", "Dízimo", "20,00");
        compact.insert("Data", Cell::Number(20240131.0));
        let report = validate(&[huge, compact], &mapping(), true);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].row, Some(0));
        assert_eq!(report.issues[0].messages, vec![MSG_INVALID_DATE]);
    }

    #[test]
    fn test_unparseable_amount_is_invalid() {
        let rows = vec![row("31/01/2024", "Oferta", "abc")];
        let report = validate(&rows, &mapping(), true);
        assert_eq!(report.issues[0].messages, vec![MSG_INVALID_AMOUNT]);
    }

    #[test]
    fn test_missing_roles_and_destination_block_row_checks() {
        let mut m = mapping();
        m.clear(Role::Amount);
        m.clear(Role::Date);
        let rows = vec![row("ontem", "", "0")];
        let report = validate(&rows, &m, false);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].index(), -1);
        assert_eq!(
            report.issues[0].messages,
            vec![
                "Coluna de data não mapeada".to_string(),
                "Coluna de valor não mapeada".to_string(),
                MSG_NO_DESTINATION.to_string(),
            ]
        );
        assert!(report.issues[0].is_blocking());
        assert_eq!(report.exclusion.excluded_count(), 0);
    }

    #[test]
    fn test_missing_destination_alone_blocks() {
        let rows = vec![row("31/01/2024", "Oferta", "10")];
        let report = validate(&rows, &mapping(), false);
        assert!(report.issues[0].is_blocking());
        assert_eq!(report.issues[0].messages, vec![MSG_NO_DESTINATION.to_string()]);
    }

    #[test]
    fn test_validate_is_idempotent() {
        let rows = vec![
            row("31/01/2024", "Dízimo", "100,00"),
            row("xx", "Oferta", "5,00"),
            row("01/02/2024", "", "-3,00"),
        ];
        let m = mapping();
        let a = validate(&rows, &m, true);
        let b = validate(&rows, &m, true);
        assert_eq!(a.issues, b.issues);
        assert_eq!(a.exclusion, b.exclusion);
        let rows: Vec<usize> = a.issues.iter().filter_map(|i| i.row).collect();
        assert_eq!(rows, vec![1, 2]);
    }

    #[test]
    fn test_revalidate_discards_user_toggles() {
        let rows = vec![row("xx", "Oferta", "5,00")];
        let m = mapping();
        let mut first = validate(&rows, &m, true);
        first.exclusion.set(0, false);
        let second = validate(&rows, &m, true);
        assert!(second.exclusion.is_excluded(0));
    }

    #[test]
    fn test_set_all_issues_only_touches_listed_rows() {
        let rows = vec![
            row("31/01/2024", "Dízimo", "100,00"),
            row("xx", "Oferta", "5,00"),
        ];
        let mut report = validate(&rows, &mapping(), true);
        set_all_issues(&mut report.exclusion, &report.issues, false);
        assert_eq!(report.exclusion.excluded_count(), 0);
        set_all_issues(&mut report.exclusion, &report.issues, true);
        assert_eq!(report.exclusion.excluded_rows(), vec![1]);
    }

    #[test]
    fn test_is_unstorable() {
        let m = mapping();
        assert!(is_unstorable(&row("xx", "a", "1"), &m));
        assert!(is_unstorable(&row("31/01/2024", "a", "0"), &m));
        assert!(!is_unstorable(&row("31/01/2024", "", "1"), &m));
    }
}
