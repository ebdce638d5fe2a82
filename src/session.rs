use crate::committer::{self, CommitOptions, CommitOutcome, LedgerStore};
use crate::error::{ExtratoError, Result};
use crate::importer;
use crate::mapper::infer_mapping;
use crate::models::{
    Account, ColumnMapping, Dataset, ExclusionSet, ImportBatch, Role, SourceKind, TenantScope,
    ValidationIssue,
};
use crate::ofx;
use crate::validator;

/// One file on its way into the ledger: the parsed rows plus every choice the
/// user has made about them so far.
pub struct ImportSession {
    bytes: Vec<u8>,
    file_name: String,
    max_file_size: u64,
    dataset: Dataset,
    mapping: ColumnMapping,
    exclusion: ExclusionSet,
    issues: Vec<ValidationIssue>,
    destination: Option<Account>,
    validated: bool,
}

fn initial_mapping(dataset: &Dataset) -> ColumnMapping {
    match dataset.kind {
        SourceKind::TaggedText => ofx::fixed_mapping(),
        _ => infer_mapping(&dataset.columns),
    }
}

impl ImportSession {
    pub fn load(bytes: Vec<u8>, file_name: &str, max_file_size: u64) -> Result<Self> {
        let dataset = importer::extract_file(&bytes, file_name, None, max_file_size)?;
        let mapping = initial_mapping(&dataset);
        Ok(Self {
            bytes,
            file_name: file_name.to_string(),
            max_file_size,
            dataset,
            mapping,
            exclusion: ExclusionSet::new(),
            issues: Vec::new(),
            destination: None,
            validated: false,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn exclusion(&self) -> &ExclusionSet {
        &self.exclusion
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn destination(&self) -> Option<&Account> {
        self.destination.as_ref()
    }

    /// Re-read the file from another sheet. Mapping and exclusions start over.
    pub fn select_sheet(&mut self, sheet: &str) -> Result<()> {
        if !self.dataset.sheets.iter().any(|s| s == sheet) {
            return Err(ExtratoError::UnknownSheet(sheet.to_string()));
        }
        let dataset =
            importer::extract_file(&self.bytes, &self.file_name, Some(sheet), self.max_file_size)?;
        self.mapping = initial_mapping(&dataset);
        self.dataset = dataset;
        self.exclusion = ExclusionSet::new();
        self.issues.clear();
        self.validated = false;
        Ok(())
    }

    /// Direct access to the mapping. Any prior validation is dropped.
    pub fn mapping_mut(&mut self) -> &mut ColumnMapping {
        self.validated = false;
        &mut self.mapping
    }

    pub fn assign(&mut self, role: Role, column: &str) -> Result<()> {
        if self.dataset.kind == SourceKind::TaggedText {
            return Err(ExtratoError::FixedMapping);
        }
        if !self.dataset.has_column(column) {
            return Err(ExtratoError::UnknownColumn(column.to_string()));
        }
        self.mapping_mut().assign(role, column);
        Ok(())
    }

    pub fn unassign(&mut self, role: Role) -> Result<()> {
        if self.dataset.kind == SourceKind::TaggedText {
            return Err(ExtratoError::FixedMapping);
        }
        self.mapping_mut().clear(role);
        Ok(())
    }

    pub fn set_destination(&mut self, account: Option<Account>) {
        self.destination = account;
        self.validated = false;
    }

    /// Run every check again; user toggles are replaced by the defaults.
    pub fn validate(&mut self) -> &[ValidationIssue] {
        let report = validator::validate(
            &self.dataset.rows,
            &self.mapping,
            self.destination.is_some(),
        );
        self.issues = report.issues;
        self.exclusion = report.exclusion;
        self.validated = true;
        &self.issues
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.dataset.rows.len() {
            return Err(ExtratoError::UnknownRow(row));
        }
        Ok(())
    }

    pub fn set_excluded(&mut self, row: usize, excluded: bool) -> Result<()> {
        self.check_row(row)?;
        self.exclusion.set(row, excluded);
        Ok(())
    }

    pub fn toggle(&mut self, row: usize) -> Result<()> {
        self.check_row(row)?;
        self.exclusion.toggle(row);
        Ok(())
    }

    pub fn mark_all_issues(&mut self) {
        validator::set_all_issues(&mut self.exclusion, &self.issues, true);
    }

    pub fn unmark_all_issues(&mut self) {
        validator::set_all_issues(&mut self.exclusion, &self.issues, false);
    }

    /// Snapshot the accepted rows. Validates first when the current result is stale.
    pub fn build_batch(&mut self, scope: &TenantScope) -> Result<ImportBatch> {
        if !self.validated {
            self.validate();
        }
        if let Some(issue) = self.issues.iter().find(|i| i.is_blocking()) {
            return Err(ExtratoError::Blocked(issue.messages.clone()));
        }
        let account = self.destination.as_ref().ok_or(ExtratoError::NoDestination)?;
        committer::build_batch(
            &self.dataset.rows,
            &self.mapping,
            &self.exclusion,
            account.id,
            scope,
        )
    }

    pub fn commit<S: LedgerStore>(
        &mut self,
        store: &mut S,
        scope: &TenantScope,
        opts: CommitOptions,
    ) -> Result<CommitOutcome> {
        let batch = self.build_batch(scope)?;
        committer::commit(&batch, store, opts)
    }
}
