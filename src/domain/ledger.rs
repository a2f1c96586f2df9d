use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{Amount, ContractId, FundCategory, FundEntry};

/// Outstanding balance for a contract: the unsettled remainder of every
/// non-terminal entry. Recomputed from entries, never stored.
pub fn outstanding_balance(contract_id: ContractId, entries: &[FundEntry]) -> Amount {
    entries
        .iter()
        .filter(|e| e.contract_id == contract_id)
        .map(FundEntry::outstanding)
        .fold(0, Amount::saturating_add)
}

/// Per-category slice of a contract's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBalance {
    pub category: FundCategory,
    pub deposited: Amount,
    pub paid: Amount,
    pub outstanding: Amount,
    pub open_entries: i64,
    pub total_entries: i64,
}

/// Break a contract's entries down by category. Every category is present,
/// even without entries.
pub fn balance_by_category(contract_id: ContractId, entries: &[FundEntry]) -> Vec<CategoryBalance> {
    let mut by_category: BTreeMap<FundCategory, CategoryBalance> = FundCategory::ALL
        .into_iter()
        .map(|category| {
            (
                category,
                CategoryBalance {
                    category,
                    deposited: 0,
                    paid: 0,
                    outstanding: 0,
                    open_entries: 0,
                    total_entries: 0,
                },
            )
        })
        .collect();

    for entry in entries.iter().filter(|e| e.contract_id == contract_id) {
        if let Some(slot) = by_category.get_mut(&entry.category) {
            slot.deposited = slot.deposited.saturating_add(entry.amount);
            slot.paid = slot.paid.saturating_add(entry.paid_amount);
            slot.outstanding = slot.outstanding.saturating_add(entry.outstanding());
            slot.total_entries += 1;
            if !entry.status.is_terminal() {
                slot.open_entries += 1;
            }
        }
    }

    by_category.into_values().collect()
}

/// A contract's entries across all categories, newest deposit first.
/// Deposits on the same instant keep insertion order.
pub fn contract_history(contract_id: ContractId, entries: &[FundEntry]) -> Vec<FundEntry> {
    let mut history: Vec<FundEntry> = entries
        .iter()
        .filter(|e| e.contract_id == contract_id)
        .cloned()
        .collect();

    history.sort_by(|a, b| {
        b.deposited_at
            .cmp(&a.deposited_at)
            .then(a.sequence.cmp(&b.sequence))
    });
    history
}

/// Result of scanning the store for broken invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub contract_count: i64,
    pub entry_count: i64,
    pub total_outstanding: Amount,
    pub outstanding_by_category: BTreeMap<FundCategory, Amount>,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check every entry against the ledger invariants.
///
/// `stored_outstanding` is the balance as aggregated by the store; it must
/// agree with the in-memory recomputation.
pub fn build_integrity_report(
    entries: &[FundEntry],
    known_contracts: &HashSet<ContractId>,
    stored_outstanding: Amount,
    has_sequence_gaps: bool,
) -> IntegrityReport {
    let mut issues = Vec::new();
    let mut outstanding_by_category: BTreeMap<FundCategory, Amount> =
        FundCategory::ALL.into_iter().map(|c| (c, 0)).collect();

    for entry in entries {
        issues.extend(entry.invariant_violations());

        if !known_contracts.contains(&entry.contract_id) {
            issues.push(format!(
                "entry {} references unknown contract {}",
                entry.id, entry.contract_id
            ));
        }

        let slot = outstanding_by_category.entry(entry.category).or_insert(0);
        *slot = slot.saturating_add(entry.outstanding());
    }

    let total_outstanding = outstanding_by_category
        .values()
        .fold(0, |total: Amount, v| total.saturating_add(*v));
    if total_outstanding != stored_outstanding {
        issues.push(format!(
            "stored outstanding balance {} differs from recomputed {}",
            stored_outstanding, total_outstanding
        ));
    }
    if has_sequence_gaps {
        issues.push("entry sequence numbers have gaps".to_string());
    }

    IntegrityReport {
        contract_count: known_contracts.len() as i64,
        entry_count: entries.len() as i64,
        total_outstanding,
        outstanding_by_category,
        issues,
    }
}
