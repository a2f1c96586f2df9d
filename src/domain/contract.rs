use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ContractId = Uuid;

/// A loan contract that trust-fund deposits are earmarked against.
/// Contracts are looked up by their human-facing `number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    /// Contract number as printed on the loan agreement (unique)
    pub number: String,
    pub debtor_name: String,
    pub registered_at: DateTime<Utc>,
}

impl Contract {
    pub fn new(number: impl Into<String>, debtor_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            number: number.into().trim().to_string(),
            debtor_name: debtor_name.into().trim().to_string(),
            registered_at: Utc::now(),
        }
    }
}
