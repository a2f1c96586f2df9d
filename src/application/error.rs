use thiserror::Error;

use crate::domain::{FundEntryId, FundError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("Contract already exists: {0}")]
    ContractAlreadyExists(String),

    #[error("Fund entry not found: {0}")]
    EntryNotFound(FundEntryId),

    #[error(transparent)]
    Fund(#[from] FundError),

    #[error("Fund entry {0} was modified concurrently; reload it and try again")]
    ConcurrentModification(FundEntryId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// Whether re-reading the entry and resubmitting may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrentModification(_))
    }
}
