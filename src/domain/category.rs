use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a trust-fund deposit is earmarked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundCategory {
    /// Notary fees (deed drafting, fiduciary registration)
    Notary,
    /// Insurance premiums, paid against the annual coverage value
    Insurance,
    /// Loan installment or payoff released from the deposit
    Installment,
}

/// How a category consumes its deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettlementMode {
    /// Payments accumulate until the full amount is settled.
    Partial,
    /// One disbursement settles the whole amount at once.
    SingleShot,
}

impl FundCategory {
    pub const ALL: [FundCategory; 3] = [
        FundCategory::Notary,
        FundCategory::Insurance,
        FundCategory::Installment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FundCategory::Notary => "notary",
            FundCategory::Insurance => "insurance",
            FundCategory::Installment => "installment",
        }
    }

    pub fn settlement_mode(&self) -> SettlementMode {
        match self {
            FundCategory::Insurance => SettlementMode::Partial,
            FundCategory::Notary | FundCategory::Installment => SettlementMode::SingleShot,
        }
    }
}

impl FromStr for FundCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "notary" | "notaris" => Ok(FundCategory::Notary),
            "insurance" | "asuransi" => Ok(FundCategory::Insurance),
            "installment" | "angsuran" => Ok(FundCategory::Installment),
            other => Err(format!("unknown fund category '{}'", other)),
        }
    }
}

impl std::fmt::Display for FundCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for category in FundCategory::ALL {
            let parsed: FundCategory = category.as_str().parse().unwrap();
            assert_eq!(category, parsed);
        }
    }

    #[test]
    fn test_local_aliases() {
        assert_eq!("Asuransi".parse::<FundCategory>(), Ok(FundCategory::Insurance));
        assert_eq!("notaris".parse::<FundCategory>(), Ok(FundCategory::Notary));
        assert_eq!("angsuran".parse::<FundCategory>(), Ok(FundCategory::Installment));
        assert!("premium".parse::<FundCategory>().is_err());
    }

    #[test]
    fn test_only_insurance_settles_partially() {
        assert_eq!(
            FundCategory::Insurance.settlement_mode(),
            SettlementMode::Partial
        );
        assert_eq!(
            FundCategory::Notary.settlement_mode(),
            SettlementMode::SingleShot
        );
        assert_eq!(
            FundCategory::Installment.settlement_mode(),
            SettlementMode::SingleShot
        );
    }
}
