use serde::{Deserialize, Serialize};

use crate::error::{CommitError, ExtratoError, Result};
use crate::models::{
    ColumnMapping, ExclusionSet, ImportBatch, LedgerRecord, NormalizedMovement, RawRow, Role,
    TenantScope,
};
use crate::normalizer::{
    cell_amount, cell_date, cell_optional_amount, cell_text, infer_direction,
    resolve_signed_amount,
};
use crate::validator::is_unstorable;

pub const DEFAULT_CHUNK_SIZE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CommitStrategy {
    /// Insert chunk by chunk; chunks saved before a failure stay saved.
    #[default]
    Sequential,
    /// All chunks inside one store transaction; a failure saves nothing.
    Transactional,
}

impl CommitStrategy {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Transactional => "transactional",
        }
    }
}

/// Destination ledger. Implementations must treat each call as one write.
pub trait LedgerStore {
    fn insert_chunk(&mut self, records: &[LedgerRecord]) -> Result<()>;

    /// Insert every chunk or none of them.
    fn insert_atomic(&mut self, records: &[LedgerRecord], chunk_size: usize) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct CommitOptions {
    pub chunk_size: usize,
    pub strategy: CommitStrategy,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            strategy: CommitStrategy::Sequential,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub imported: usize,
    pub excluded: usize,
    /// Included rows that could not become movements (no date or zero amount).
    pub skipped: Vec<usize>,
    /// Earliest and latest movement date, ISO formatted.
    pub date_range: Option<(String, String)>,
}

pub fn build_movement(idx: usize, row: &RawRow, mapping: &ColumnMapping) -> Option<NormalizedMovement> {
    if is_unstorable(row, mapping) {
        return None;
    }
    let date = cell_date(mapping.cell(row, Role::Date))?;
    let raw_amount = cell_amount(mapping.cell(row, Role::Amount));
    let type_text = cell_text(mapping.cell(row, Role::Type));
    let type_text = (!type_text.is_empty()).then_some(type_text);
    let direction = infer_direction(raw_amount, type_text.as_deref());
    let document = cell_text(mapping.cell(row, Role::Document));

    Some(NormalizedMovement {
        row: idx,
        date,
        description: cell_text(mapping.cell(row, Role::Description)),
        amount: resolve_signed_amount(raw_amount, direction),
        balance: cell_optional_amount(mapping.cell(row, Role::Balance)),
        document: (!document.is_empty()).then_some(document),
        direction,
    })
}

/// Snapshot the accepted rows as movements. Fails before any write when
/// nothing is left to import.
pub fn build_batch(
    rows: &[RawRow],
    mapping: &ColumnMapping,
    exclusion: &ExclusionSet,
    account_id: i64,
    scope: &TenantScope,
) -> Result<ImportBatch> {
    let mut movements = Vec::new();
    let mut skipped = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        if exclusion.is_excluded(idx) {
            continue;
        }
        match build_movement(idx, row, mapping) {
            Some(m) => movements.push(m),
            None => skipped.push(idx),
        }
    }
    if !skipped.is_empty() {
        tracing::warn!(rows = ?skipped, "included rows have no valid date or a zero amount; not importing them");
    }
    if movements.is_empty() {
        return Err(ExtratoError::NothingToImport);
    }
    Ok(ImportBatch {
        account_id,
        scope: scope.clone(),
        movements,
        excluded_rows: exclusion
            .excluded_rows()
            .into_iter()
            .filter(|r| *r < rows.len())
            .collect(),
        skipped_rows: skipped,
    })
}

/// Persist a batch. Chunks run strictly in order and stop at the first failure.
pub fn commit<S: LedgerStore>(batch: &ImportBatch, store: &mut S, opts: CommitOptions) -> Result<CommitOutcome> {
    if batch.movements.is_empty() {
        return Err(ExtratoError::NothingToImport);
    }
    let records: Vec<LedgerRecord> = batch
        .movements
        .iter()
        .map(|m| LedgerRecord::from_movement(m, batch.account_id, &batch.scope))
        .collect();
    let chunk_size = opts.chunk_size.max(1);

    match opts.strategy {
        CommitStrategy::Sequential => {
            for (i, chunk) in records.chunks(chunk_size).enumerate() {
                tracing::debug!(chunk = i, size = chunk.len(), "inserting chunk");
                if let Err(e) = store.insert_chunk(chunk) {
                    tracing::error!(chunk = i, error = %e, "chunk insert failed; remaining chunks skipped");
                    return Err(CommitError { source: Box::new(e) }.into());
                }
            }
        }
        CommitStrategy::Transactional => {
            tracing::debug!(records = records.len(), chunk_size, "inserting batch in one transaction");
            if let Err(e) = store.insert_atomic(&records, chunk_size) {
                tracing::error!(error = %e, "transactional insert failed; nothing saved");
                return Err(CommitError { source: Box::new(e) }.into());
            }
        }
    }

    let first = batch.movements.iter().map(|m| m.date.as_str()).min();
    let last = batch.movements.iter().map(|m| m.date.as_str()).max();
    let date_range = first.zip(last).map(|(a, b)| (a.to_string(), b.to_string()));

    tracing::info!(
        account = batch.account_id,
        imported = records.len(),
        strategy = opts.strategy.key(),
        "committed batch"
    );
    Ok(CommitOutcome {
        imported: records.len(),
        excluded: batch.excluded_rows.len(),
        skipped: batch.skipped_rows.clone(),
        date_range,
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::MemoryLedger;
    use super::*;
    use crate::models::{Cell, Direction};

    fn scope() -> TenantScope {
        TenantScope {
            tenant_id: "igreja-1".to_string(),
            branch_id: Some("sede".to_string()),
        }
    }

    fn mapping() -> ColumnMapping {
        let mut m = ColumnMapping::new();
        m.assign(Role::Date, "Data");
        m.assign(Role::Description, "Descrição");
        m.assign(Role::Amount, "Valor");
        m.assign(Role::Type, "Tipo");
        m.assign(Role::Balance, "Saldo");
        m.assign(Role::Document, "Doc");
        m
    }

    fn row(date: &str, desc: &str, amount: &str, kind: &str) -> RawRow {
        let mut r = RawRow::new();
        r.insert("Data", Cell::Text(date.into()));
        r.insert("Descrição", Cell::Text(desc.into()));
        r.insert("Valor", Cell::Text(amount.into()));
        r.insert("Tipo", Cell::Text(kind.into()));
        r
    }

    fn valid_rows(n: usize) -> Vec<RawRow> {
        (0..n)
            .map(|i| row("31/01/2024", &format!("Oferta {i}"), "10,00", ""))
            .collect()
    }

    #[test]
    fn test_build_movement_resolves_sign_from_type() {
        let mut r = row("31/01/2024", "Conta de luz", "320,10", "Débito");
        r.insert("Saldo", Cell::Text("1.000,00".into()));
        r.insert("Doc", Cell::Number(4455.0));
        let m = build_movement(0, &r, &mapping()).unwrap();
        assert_eq!(m.date, "2024-01-31");
        assert_eq!(m.direction, Direction::Debito);
        assert_eq!(m.amount, -320.1);
        assert_eq!(m.balance, Some(1000.0));
        assert_eq!(m.document.as_deref(), Some("4455"));
    }

    #[test]
    fn test_build_movement_keeps_negative_credit() {
        let r = row("31/01/2024", "Estorno", "-50,00", "C");
        let m = build_movement(0, &r, &mapping()).unwrap();
        assert_eq!(m.direction, Direction::Credito);
        assert_eq!(m.amount, -50.0);
    }

    #[test]
    fn test_build_movement_without_type_uses_sign() {
        let r = row("31/01/2024", "Tarifa", "-5,00", "");
        let m = build_movement(0, &r, &mapping()).unwrap();
        assert_eq!(m.direction, Direction::Debito);
        assert_eq!(m.document, None);
        assert_eq!(m.balance, None);
    }

    #[test]
    fn test_build_batch_skips_excluded_and_unstorable_rows() {
        let rows = vec![
            row("31/01/2024", "Dízimo", "100,00", ""),
            row("31/01/2024", "Zero", "0,00", ""),
            row("sem data", "Oferta", "5,00", ""),
            row("01/02/2024", "Excluída", "7,00", ""),
        ];
        let mut exclusion = ExclusionSet::new();
        exclusion.set(3, true);
        let batch = build_batch(&rows, &mapping(), &exclusion, 7, &scope()).unwrap();
        assert_eq!(batch.movements.len(), 1);
        assert_eq!(batch.movements[0].row, 0);
        assert_eq!(batch.skipped_rows, vec![1, 2]);
        assert_eq!(batch.excluded_rows, vec![3]);
    }

    #[test]
    fn test_everything_excluded_is_nothing_to_import() {
        let rows = valid_rows(3);
        let mut exclusion = ExclusionSet::new();
        for i in 0..3 {
            exclusion.set(i, true);
        }
        let err = build_batch(&rows, &mapping(), &exclusion, 7, &scope()).unwrap_err();
        assert!(matches!(err, ExtratoError::NothingToImport));
    }

    #[test]
    fn test_commit_refuses_empty_batch_without_writes() {
        let batch = ImportBatch {
            account_id: 7,
            scope: scope(),
            movements: Vec::new(),
            excluded_rows: vec![0, 1],
            skipped_rows: Vec::new(),
        };
        let mut store = MemoryLedger::default();
        let err = commit(&batch, &mut store, CommitOptions::default()).unwrap_err();
        assert!(matches!(err, ExtratoError::NothingToImport));
        assert!(store.calls.is_empty());
    }

    #[test]
    fn test_commit_chunks_in_order() {
        let batch = build_batch(&valid_rows(450), &mapping(), &ExclusionSet::new(), 7, &scope()).unwrap();
        let mut store = MemoryLedger::default();
        let outcome = commit(&batch, &mut store, CommitOptions::default()).unwrap();
        assert_eq!(store.calls, vec![200, 200, 50]);
        assert_eq!(outcome.imported, 450);
        assert_eq!(
            outcome.date_range,
            Some(("2024-01-31".to_string(), "2024-01-31".to_string()))
        );
        assert_eq!(store.saved.len(), 450);
        assert_eq!(store.saved[0].description, "Oferta 0");
        assert_eq!(store.saved[449].description, "Oferta 449");
    }

    #[test]
    fn test_commit_stops_at_first_failed_chunk() {
        let batch = build_batch(&valid_rows(450), &mapping(), &ExclusionSet::new(), 7, &scope()).unwrap();
        let mut store = MemoryLedger::failing_on(2);
        let err = commit(&batch, &mut store, CommitOptions::default()).unwrap_err();
        assert!(matches!(err, ExtratoError::Commit(_)));
        assert_eq!(store.calls, vec![200, 200]);
        assert_eq!(store.saved.len(), 200);
    }

    #[test]
    fn test_transactional_failure_saves_nothing() {
        let batch = build_batch(&valid_rows(450), &mapping(), &ExclusionSet::new(), 7, &scope()).unwrap();
        let mut store = MemoryLedger::failing_on(2);
        let opts = CommitOptions {
            chunk_size: 200,
            strategy: CommitStrategy::Transactional,
        };
        assert!(commit(&batch, &mut store, opts).is_err());
        assert!(store.saved.is_empty());
    }

    #[test]
    fn test_records_carry_scope_and_unreconciled_flag() {
        let batch = build_batch(&valid_rows(1), &mapping(), &ExclusionSet::new(), 7, &scope()).unwrap();
        let mut store = MemoryLedger::default();
        commit(&batch, &mut store, CommitOptions::default()).unwrap();
        let rec = &store.saved[0];
        assert_eq!(rec.account_id, 7);
        assert_eq!(rec.tenant_id, "igreja-1");
        assert_eq!(rec.branch_id.as_deref(), Some("sede"));
        assert!(!rec.reconciled);
        assert_eq!(rec.direction, Direction::Credito);
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let batch = build_batch(&valid_rows(3), &mapping(), &ExclusionSet::new(), 7, &scope()).unwrap();
        let mut store = MemoryLedger::default();
        let opts = CommitOptions {
            chunk_size: 0,
            strategy: CommitStrategy::Sequential,
        };
        commit(&batch, &mut store, opts).unwrap();
        assert_eq!(store.calls, vec![1, 1, 1]);
    }
}
