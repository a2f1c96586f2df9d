use thiserror::Error;

use super::{Amount, FundCategory, FundStatus};

/// Operation attempted against a fund entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundAction {
    Settle,
    Return,
    AttachReference,
}

impl std::fmt::Display for FundAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FundAction::Settle => "settle",
            FundAction::Return => "return",
            FundAction::AttachReference => "attach a reference to",
        };
        write!(f, "{}", s)
    }
}

/// Validation failures raised by fund entry rules. All of them are detected
/// before the entry is changed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FundError {
    #[error("Invalid amount: {0} (must be positive and within the per-entry limit)")]
    InvalidAmount(Amount),

    #[error("Payment of {requested} exceeds remaining {remaining} (amount {amount}, already paid {paid})")]
    OverpaymentRejected {
        amount: Amount,
        paid: Amount,
        remaining: Amount,
        requested: Amount,
    },

    #[error("Missing required reference: {0}")]
    MissingReference(&'static str),

    #[error("Cannot {action} {category} entry in status {status}")]
    InvalidTransition {
        category: FundCategory,
        status: FundStatus,
        action: FundAction,
    },
}
