// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tempfile::TempDir;
use titipan::application::{DepositRequest, LedgerService};
use titipan::domain::{Amount, FundCategory, FundEntry, Settlement, whole};

pub const ACTOR: &str = "finance-admin";

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap(), Duration::from_secs(5)).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Shorthand for whole rupiah amounts
pub fn rp(units: i64) -> Amount {
    whole(units)
}

/// Test fixture: Standard contracts
pub struct StandardContracts;

impl StandardContracts {
    /// Register KR-001 (Budi Santoso) and KR-002 (Siti Aminah)
    pub async fn create_basic(service: &LedgerService) -> Result<()> {
        service.register_contract("KR-001", "Budi Santoso").await?;
        service.register_contract("KR-002", "Siti Aminah").await?;
        Ok(())
    }
}

/// Record a deposit dated today
pub async fn deposit(
    service: &LedgerService,
    contract: &str,
    category: FundCategory,
    amount: Amount,
) -> Result<FundEntry> {
    Ok(service
        .create_entry(DepositRequest::new(contract, category, amount), ACTOR)
        .await?)
}

/// A complete insurance settlement for `amount`
pub fn insurance_payment(amount: Amount, proof: &str) -> Settlement {
    Settlement::new(amount)
        .on(parse_date("2024-03-01"))
        .with_policy_number("POL-2024-001")
        .with_proof_of_payment(proof)
}
