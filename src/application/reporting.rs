use serde::{Deserialize, Serialize};

use crate::domain::{Amount, CategoryBalance, Contract, FundCategory, FundEntry, FundStatus};

/// Outstanding balance of one contract with its per-category breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub contract: Contract,
    pub outstanding: Amount,
    pub categories: Vec<CategoryBalance>,
}

/// A contract's full history, newest deposit first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractHistory {
    pub contract: Contract,
    pub entries: Vec<FundEntry>,
}

/// Filter for the entry listing that feeds report screens.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub contract: Option<String>,
    pub category: Option<FundCategory>,
    pub status: Option<FundStatus>,
    pub search: Option<String>,
    /// 1-based page number; 0 is treated as 1
    pub page: u32,
    pub per_page: u32,
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 {
            return 0;
        }
        let per_page = i64::from(self.per_page);
        u32::try_from(self.total.saturating_add(per_page - 1) / per_page).unwrap_or(u32::MAX)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}
