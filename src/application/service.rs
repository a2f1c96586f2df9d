use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    Amount, Contract, ContractId, EntryEvent, FundCategory, FundEntry, FundEntryId, FundError,
    IntegrityReport, Settlement, balance_by_category, build_integrity_report, contract_history,
    outstanding_balance,
};
use crate::storage::{EntryQuery, Repository};

use super::{AppError, BalanceSummary, ContractHistory, EntryFilter, Page};

/// Largest page the listing will return.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Application service providing the trust-fund ledger operations.
/// This is the primary interface for any client (CLI, API, report screens).
pub struct LedgerService {
    repo: Repository,
}

/// Input for a new deposit.
#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub contract_number: String,
    pub category: FundCategory,
    pub amount: Amount,
    pub note: Option<String>,
    /// Defaults to now
    pub deposited_at: Option<DateTime<Utc>>,
}

impl DepositRequest {
    pub fn new(contract_number: impl Into<String>, category: FundCategory, amount: Amount) -> Self {
        Self {
            contract_number: contract_number.into(),
            category,
            amount,
            note: None,
            deposited_at: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn on(mut self, deposited_at: DateTime<Utc>) -> Self {
        self.deposited_at = Some(deposited_at);
        self
    }
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Open (creating if needed) the database at the given path and migrate it.
    pub async fn init(database_path: &str, busy_timeout: Duration) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url, busy_timeout).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, busy_timeout: Duration) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url, busy_timeout).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Contract operations
    // ========================

    /// Register a loan contract so deposits can be made against it.
    #[instrument(name = "contract.register", skip(self), err(level = "warn"))]
    pub async fn register_contract(
        &self,
        number: &str,
        debtor_name: &str,
    ) -> Result<Contract, AppError> {
        if number.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Contract number must not be empty".to_string(),
            ));
        }
        if self.repo.get_contract_by_number(number).await?.is_some() {
            return Err(AppError::ContractAlreadyExists(number.trim().to_string()));
        }

        let contract = Contract::new(number, debtor_name);
        self.repo.save_contract(&contract).await?;
        info!(contract = %contract.number, "contract registered");
        Ok(contract)
    }

    /// Get a contract by number.
    pub async fn get_contract(&self, number: &str) -> Result<Contract, AppError> {
        self.repo
            .get_contract_by_number(number)
            .await?
            .ok_or_else(|| AppError::ContractNotFound(number.trim().to_string()))
    }

    pub async fn list_contracts(&self) -> Result<Vec<Contract>, AppError> {
        Ok(self.repo.list_contracts().await?)
    }

    /// Map of contract IDs to numbers (useful for display).
    pub async fn get_contract_numbers(&self) -> Result<HashMap<ContractId, String>, AppError> {
        let contracts = self.repo.list_contracts().await?;
        Ok(contracts.into_iter().map(|c| (c.id, c.number)).collect())
    }

    // ========================
    // Deposit / settlement / return
    // ========================

    /// Record a new deposit against a contract.
    #[instrument(name = "fund.deposit", skip(self), err(level = "warn"))]
    pub async fn create_entry(
        &self,
        request: DepositRequest,
        actor: &str,
    ) -> Result<FundEntry, AppError> {
        let contract = self.get_contract(&request.contract_number).await?;

        let mut entry = FundEntry::deposit(
            contract.id,
            request.category,
            request.amount,
            request.deposited_at.unwrap_or_else(Utc::now),
            actor,
        )?;
        if let Some(note) = request.note.filter(|n| !n.trim().is_empty()) {
            entry = entry.with_note(note);
        }

        let mut event = EntryEvent::deposited(&entry);
        self.repo.insert_entry(&mut entry, &mut event).await?;

        info!(
            entry_id = %entry.id,
            contract = %contract.number,
            category = %entry.category,
            amount = entry.amount,
            "fund entry deposited"
        );
        Ok(entry)
    }

    /// Get a live entry by ID.
    pub async fn get_entry(&self, id: FundEntryId) -> Result<FundEntry, AppError> {
        self.repo
            .get_entry(id)
            .await?
            .ok_or(AppError::EntryNotFound(id))
    }

    /// Apply a payment against an entry.
    ///
    /// The overpayment check runs against the version that was read; if
    /// another writer got there first the update is refused with
    /// `ConcurrentModification` and nothing is written.
    #[instrument(name = "fund.settle", skip(self), err(level = "warn"))]
    pub async fn settle_entry(
        &self,
        entry_id: FundEntryId,
        settlement: &Settlement,
        actor: &str,
    ) -> Result<FundEntry, AppError> {
        let entry = self
            .apply_change(entry_id, |current| {
                let updated = current.settle(settlement)?;
                if updated.paid_amount - current.paid_amount != settlement.amount {
                    debug!(
                        requested = settlement.amount,
                        settled = updated.paid_amount - current.paid_amount,
                        "single-shot settlement ignores requested amount"
                    );
                }
                let event = EntryEvent::settled(current, &updated, actor);
                Ok((updated, event))
            })
            .await?;

        info!(
            entry_id = %entry.id,
            status = %entry.status,
            paid = entry.paid_amount,
            amount = entry.amount,
            "fund entry settled"
        );
        Ok(entry)
    }

    /// Attach a notary deed number, before or after settlement.
    #[instrument(name = "fund.attach_reference", skip(self), err(level = "warn"))]
    pub async fn attach_reference(
        &self,
        entry_id: FundEntryId,
        deed_number: &str,
        actor: &str,
    ) -> Result<FundEntry, AppError> {
        let entry = self
            .apply_change(entry_id, |current| {
                let updated = current.attach_reference(deed_number)?;
                let event = EntryEvent::reference_attached(&updated, actor);
                Ok((updated, event))
            })
            .await?;

        info!(entry_id = %entry.id, "deed number attached");
        Ok(entry)
    }

    /// Refund an unsettled deposit to the customer.
    #[instrument(name = "fund.return", skip(self), err(level = "warn"))]
    pub async fn return_entry(
        &self,
        entry_id: FundEntryId,
        reason: &str,
        actor: &str,
    ) -> Result<FundEntry, AppError> {
        let entry = self
            .apply_change(entry_id, |current| {
                let updated = current.return_funds(reason, Utc::now())?;
                let event = EntryEvent::returned(&updated, actor);
                Ok((updated, event))
            })
            .await?;

        info!(entry_id = %entry.id, refunded = entry.remaining(), "fund entry returned");
        Ok(entry)
    }

    /// Administrative removal of an entry. This sits outside the status
    /// lifecycle: the row is hidden from every view but kept, and the
    /// deletion is recorded in the entry's event log.
    #[instrument(name = "fund.delete", skip(self), err(level = "warn"))]
    pub async fn delete_entry(
        &self,
        entry_id: FundEntryId,
        reason: &str,
        actor: &str,
    ) -> Result<FundEntry, AppError> {
        if reason.trim().is_empty() {
            return Err(FundError::MissingReference("deletion reason").into());
        }

        let entry = self.get_entry(entry_id).await?;
        let mut event = EntryEvent::deleted(&entry, actor, reason.trim(), Utc::now());

        if !self.repo.delete_entry(&entry, &mut event).await? {
            warn!(entry_id = %entry_id, "delete lost a race with another writer");
            return Err(AppError::ConcurrentModification(entry_id));
        }

        warn!(entry_id = %entry.id, actor, reason = reason.trim(), "fund entry deleted by administrator");
        Ok(entry)
    }

    /// Change history of one entry, oldest first. Deleted entries keep theirs.
    pub async fn get_entry_events(&self, entry_id: FundEntryId) -> Result<Vec<EntryEvent>, AppError> {
        let events = self.repo.list_events(entry_id).await?;
        if events.is_empty() {
            return Err(AppError::EntryNotFound(entry_id));
        }
        Ok(events)
    }

    /// Read an entry, let `change` validate and produce its new state, then
    /// persist it with a version check.
    async fn apply_change<F>(&self, entry_id: FundEntryId, change: F) -> Result<FundEntry, AppError>
    where
        F: FnOnce(&FundEntry) -> Result<(FundEntry, EntryEvent), FundError>,
    {
        let current = self.get_entry(entry_id).await?;
        let (mut updated, mut event) = change(&current)?;

        if !self.repo.update_entry(&mut updated, &mut event).await? {
            warn!(entry_id = %entry_id, version = current.version, "stale fund entry version");
            return Err(AppError::ConcurrentModification(entry_id));
        }

        Ok(updated)
    }

    // ========================
    // Read-side projections
    // ========================

    /// Outstanding balance of a contract across all categories.
    pub async fn get_balance(&self, contract_number: &str) -> Result<Amount, AppError> {
        let contract = self.get_contract(contract_number).await?;
        let entries = self.repo.list_entries_for_contract(contract.id).await?;
        Ok(outstanding_balance(contract.id, &entries))
    }

    /// Outstanding balance with per-category breakdown.
    pub async fn get_balance_summary(&self, contract_number: &str) -> Result<BalanceSummary, AppError> {
        let contract = self.get_contract(contract_number).await?;
        let entries = self.repo.list_entries_for_contract(contract.id).await?;

        Ok(BalanceSummary {
            outstanding: outstanding_balance(contract.id, &entries),
            categories: balance_by_category(contract.id, &entries),
            contract,
        })
    }

    /// All of a contract's entries across categories, newest deposit first.
    pub async fn get_history(&self, contract_number: &str) -> Result<ContractHistory, AppError> {
        let contract = self.get_contract(contract_number).await?;
        let entries = self.repo.list_entries_for_contract(contract.id).await?;

        Ok(ContractHistory {
            entries: contract_history(contract.id, &entries),
            contract,
        })
    }

    /// Paginated listing for report screens, newest recorded first.
    pub async fn list_entries(&self, filter: &EntryFilter) -> Result<Page<FundEntry>, AppError> {
        if filter.per_page == 0 || filter.per_page > MAX_PAGE_SIZE {
            return Err(AppError::InvalidInput(format!(
                "Page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let contract_id = match &filter.contract {
            Some(number) => Some(self.get_contract(number).await?.id),
            None => None,
        };
        let page = filter.page.max(1);

        let query = EntryQuery {
            contract_id,
            category: filter.category,
            status: filter.status,
            search: filter.search.as_deref(),
            limit: i64::from(filter.per_page),
            offset: i64::from(page - 1) * i64::from(filter.per_page),
        };
        let (items, total) = self.repo.list_entries_filtered(&query).await?;

        Ok(Page {
            items,
            page,
            per_page: filter.per_page,
            total,
        })
    }

    /// Every live entry in insertion order, for exports.
    pub async fn list_all_entries(&self) -> Result<Vec<FundEntry>, AppError> {
        Ok(self.repo.list_entries().await?)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Check every live entry against the ledger invariants.
    #[instrument(name = "fund.check_integrity", skip(self), err)]
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let stats = self.repo.get_integrity_stats().await?;
        let entries = self.repo.list_entries().await?;
        let known: HashSet<ContractId> = stats.contract_ids.into_iter().collect();

        let report = build_integrity_report(
            &entries,
            &known,
            stats.stored_outstanding,
            stats.has_sequence_gaps,
        );

        if report.is_healthy() {
            debug!(entries = report.entry_count, "ledger is consistent");
        } else {
            warn!(issues = report.issues.len(), "ledger integrity issues found");
        }
        Ok(report)
    }
}
