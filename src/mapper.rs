use crate::models::{ColumnMapping, Role};

/// Header keywords per role, evaluated in this order. A column is bound to
/// at most one role.
pub const RULES: &[(Role, &[&str])] = &[
    (Role::Date, &["data"]),
    (Role::Description, &["descri"]),
    (Role::Amount, &["valor"]),
    (Role::Balance, &["saldo"]),
    (Role::Document, &["doc", "numero"]),
    (Role::Type, &["tipo", "deb", "cred"]),
];

/// Guess a mapping from header names. Always succeeds; unbound required
/// roles are reported by the validator.
pub fn infer_mapping(columns: &[String]) -> ColumnMapping {
    let lowered: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
    let mut taken = vec![false; columns.len()];
    let mut mapping = ColumnMapping::new();

    for (role, keywords) in RULES {
        let hit = lowered
            .iter()
            .enumerate()
            .find(|(i, name)| !taken[*i] && keywords.iter().any(|k| name.contains(k)));
        if let Some((i, _)) = hit {
            taken[i] = true;
            mapping.assign(*role, columns[i].clone());
        }
    }
    tracing::debug!(?mapping, "inferred column mapping");
    mapping
}
