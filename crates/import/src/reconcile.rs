use quitus_core::{PaymentRecord, RecordStatus, ReferenceRow, RemittanceAddress, FUND_NOT_REGISTERED};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::columns::{
    resolve_columns, ReferenceColumn, SchemaError, UserColumn, REFERENCE_COLUMNS, USER_COLUMNS,
};
use crate::normalize::{
    account_key_fallback, account_key_primary, clean_text, digits_only, money_sentinel_suffix,
    normalize_branch_code, normalize_date, ParseError,
};
use crate::table::Table;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("Invalid payment date: {0}")]
    InvalidDate(#[from] ParseError),
}

/// Which join tier produced the reference row for a user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTier {
    Primary,
    Fallback,
    Unmatched,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    pub total: usize,
    pub ok: usize,
    pub pending: usize,
    pub matched_primary: usize,
    pub matched_fallback: usize,
    pub unmatched: usize,
    pub blank_amounts: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub ok: Vec<PaymentRecord>,
    pub pending: Vec<PaymentRecord>,
    pub summary: ReconciliationSummary,
}

/// Fund registry indexed by both account keys. The first row seen for a key
/// owns it.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    rows: Vec<ReferenceRow>,
    by_primary: HashMap<String, usize>,
    by_fallback: HashMap<String, usize>,
}

impl Registry {
    pub fn from_table(table: &Table) -> Result<Self, SchemaError> {
        let cols = resolve_columns(&table.headers, REFERENCE_COLUMNS)?;
        let mut registry = Registry::default();

        for i in 0..table.len() {
            let row = ReferenceRow {
                tax_id: table.cell(i, cols.get(ReferenceColumn::TaxId)).to_string(),
                name: table.cell(i, cols.get(ReferenceColumn::Name)).to_string(),
                bank: table.cell(i, cols.get(ReferenceColumn::Bank)).to_string(),
                branch: table.cell(i, cols.get(ReferenceColumn::Branch)).to_string(),
                account: table.cell(i, cols.get(ReferenceColumn::Account)).to_string(),
            };
            registry.insert(row);
        }

        tracing::debug!(rows = registry.len(), "fund registry loaded");
        Ok(registry)
    }

    /// Adds `row` unless its primary key is already taken or it has no
    /// account digits at all.
    pub fn insert(&mut self, row: ReferenceRow) {
        if digits_only(&row.account).is_empty() {
            return;
        }
        let primary = account_key_primary(&row.account);
        if self.by_primary.contains_key(&primary) {
            tracing::debug!(account = %row.account, "duplicate registry row skipped");
            return;
        }

        let idx = self.rows.len();
        self.by_primary.insert(primary, idx);
        self.by_fallback.entry(account_key_fallback(&row.account)).or_insert(idx);
        self.rows.push(row);
    }

    /// Primary key first; the fallback key only when the primary misses.
    /// An account without digits never joins.
    pub fn lookup(&self, account: &str) -> (Option<&ReferenceRow>, JoinTier) {
        if digits_only(account).is_empty() {
            return (None, JoinTier::Unmatched);
        }
        if let Some(&idx) = self.by_primary.get(&account_key_primary(account)) {
            return (Some(&self.rows[idx]), JoinTier::Primary);
        }
        let fallback = account_key_fallback(account);
        if !fallback.is_empty() {
            if let Some(&idx) = self.by_fallback.get(&fallback) {
                return (Some(&self.rows[idx]), JoinTier::Fallback);
            }
        }
        (None, JoinTier::Unmatched)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Joins user payment rows to the fund registry and splits the result into
/// payable and pending records.
pub struct ReconciliationEngine {
    address: RemittanceAddress,
}

impl ReconciliationEngine {
    pub fn new(address: RemittanceAddress) -> Self {
        Self { address }
    }

    pub fn reconcile(
        &self,
        user: &Table,
        reference: &Table,
        payment_date: &str,
    ) -> Result<Reconciliation, ReconcileError> {
        let registry = Registry::from_table(reference)?;
        self.reconcile_with_registry(user, &registry, payment_date)
    }

    pub fn reconcile_with_registry(
        &self,
        user: &Table,
        registry: &Registry,
        payment_date: &str,
    ) -> Result<Reconciliation, ReconcileError> {
        let cols = resolve_columns(&user.headers, USER_COLUMNS)?;
        let payment_date = normalize_date(payment_date)?;

        let mut result = Reconciliation::default();
        for i in 0..user.len() {
            let cell = |c: UserColumn| user.cell(i, cols.get(c));

            let (reference, tier) = registry.lookup(cell(UserColumn::FundAccount));
            match tier {
                JoinTier::Primary => result.summary.matched_primary += 1,
                JoinTier::Fallback => result.summary.matched_fallback += 1,
                JoinTier::Unmatched => {
                    result.summary.unmatched += 1;
                    tracing::debug!(row = i + 1, account = %cell(UserColumn::FundAccount), "fund not registered");
                }
            }

            let raw_amount = cell(UserColumn::Amount);
            let amount = if raw_amount.trim().is_empty() {
                String::new()
            } else {
                money_sentinel_suffix(raw_amount).unwrap_or_else(|e| {
                    tracing::warn!(row = i + 1, error = %e, "amount left blank");
                    String::new()
                })
            };
            if amount.is_empty() {
                result.summary.blank_amounts += 1;
            }

            let record = PaymentRecord {
                fund_tax_id: reference
                    .map(|r| digits_only(&r.tax_id))
                    .unwrap_or_else(|| FUND_NOT_REGISTERED.to_string()),
                fund_bank: reference.map(|r| digits_only(&r.bank)).unwrap_or_default(),
                fund_branch: reference.map(|r| normalize_branch_code(&r.branch)).unwrap_or_default(),
                fund_account: reference.map(|r| digits_only(&r.account)).unwrap_or_default(),
                beneficiary_name: clean_text(cell(UserColumn::BeneficiaryName)),
                beneficiary_document: digits_only(cell(UserColumn::BeneficiaryDocument)),
                beneficiary_bank: digits_only(cell(UserColumn::BeneficiaryBank)),
                beneficiary_branch: normalize_branch_code(cell(UserColumn::BeneficiaryBranch)),
                beneficiary_account: digits_only(cell(UserColumn::BeneficiaryAccount)),
                amount,
                address_street: clean_text(&self.address.street),
                address_number: clean_text(&self.address.number),
                address_complement: clean_text(cell(UserColumn::Complement)),
                address_city: clean_text(&self.address.city),
                address_state: clean_text(&self.address.state),
                address_zip: digits_only(&self.address.zip),
                payment_date: payment_date.clone(),
            };

            match record.status() {
                RecordStatus::Ok => result.ok.push(record),
                RecordStatus::Pending => result.pending.push(record),
            }
        }

        result.summary.total = user.len();
        result.summary.ok = result.ok.len();
        result.summary.pending = result.pending.len();

        tracing::info!(
            total = result.summary.total,
            ok = result.summary.ok,
            pending = result.summary.pending,
            fallback = result.summary.matched_fallback,
            unmatched = result.summary.unmatched,
            "reconciliation finished"
        );

        Ok(result)
    }
}
