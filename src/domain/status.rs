use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{FundCategory, SettlementMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundStatus {
    Unpaid,
    PartiallySettled,
    FullySettled,
    Returned,
}

/// Something that happens to an entry and may move it to another status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundEvent {
    /// A payment that leaves part of the amount outstanding
    PartialPayment,
    /// A payment that settles the remaining amount
    FinalPayment,
    /// Deposit refunded to the customer
    Return,
}

use FundEvent::*;
use FundStatus::*;
use SettlementMode::*;

/// Every legal (mode, from, event) -> to move. Anything absent is rejected.
const TRANSITIONS: &[(SettlementMode, FundStatus, FundEvent, FundStatus)] = &[
    (Partial, Unpaid, PartialPayment, PartiallySettled),
    (Partial, Unpaid, FinalPayment, FullySettled),
    (Partial, PartiallySettled, PartialPayment, PartiallySettled),
    (Partial, PartiallySettled, FinalPayment, FullySettled),
    (Partial, Unpaid, Return, Returned),
    (Partial, PartiallySettled, Return, Returned),
    (SingleShot, Unpaid, FinalPayment, FullySettled),
    (SingleShot, Unpaid, Return, Returned),
];

/// Look up the status an event leads to, or `None` if the move is illegal.
pub fn transition(mode: SettlementMode, from: FundStatus, event: FundEvent) -> Option<FundStatus> {
    TRANSITIONS
        .iter()
        .find(|(m, f, e, _)| *m == mode && *f == from && *e == event)
        .map(|(_, _, _, to)| *to)
}

impl FundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundStatus::Unpaid => "unpaid",
            FundStatus::PartiallySettled => "partially_settled",
            FundStatus::FullySettled => "fully_settled",
            FundStatus::Returned => "returned",
        }
    }

    /// Status name as shown for a given category. Installment deposits that are
    /// still waiting to be released are "pending" rather than "unpaid".
    pub fn label(&self, category: FundCategory) -> &'static str {
        match (self, category) {
            (FundStatus::Unpaid, FundCategory::Installment) => "pending",
            _ => self.as_str(),
        }
    }

    /// No further state-changing operation succeeds from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FundStatus::FullySettled | FundStatus::Returned)
    }
}

impl FromStr for FundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "unpaid" | "pending" => Ok(FundStatus::Unpaid),
            "partially_settled" | "partial" => Ok(FundStatus::PartiallySettled),
            "fully_settled" | "settled" | "paid" => Ok(FundStatus::FullySettled),
            "returned" => Ok(FundStatus::Returned),
            other => Err(format!("unknown fund status '{}'", other)),
        }
    }
}

impl std::fmt::Display for FundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
