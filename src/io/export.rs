use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{Contract, ContractId, FundEntry, format_amount};

/// Full dump of contracts and live entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub contracts: Vec<Contract>,
    pub entries: Vec<FundEntry>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export every live entry to CSV, in insertion order.
    pub async fn export_entries_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let entries = self.service.list_all_entries().await?;
        let numbers = self.service.get_contract_numbers().await?;
        write_entries_csv(&entries, &numbers, writer)
    }

    /// Export all contracts and live entries as pretty JSON.
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            contracts: self.service.list_contracts().await?,
            entries: self.service.list_all_entries().await?,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;

        Ok(snapshot)
    }
}

/// Write entries as CSV rows, one per entry. Amounts are in display form.
pub fn write_entries_csv<W: Write>(
    entries: &[FundEntry],
    contract_numbers: &HashMap<ContractId, String>,
    writer: W,
) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record([
        "id",
        "sequence",
        "contract",
        "category",
        "amount",
        "paid",
        "remaining",
        "status",
        "references",
        "deposited_at",
        "settled_at",
        "returned_at",
        "return_reason",
        "note",
        "created_by",
    ])?;

    for entry in entries {
        csv_writer.write_record([
            entry.id.to_string(),
            entry.sequence.to_string(),
            contract_numbers
                .get(&entry.contract_id)
                .cloned()
                .unwrap_or_else(|| entry.contract_id.to_string()),
            entry.category.to_string(),
            format_amount(entry.amount),
            format_amount(entry.paid_amount),
            format_amount(entry.remaining()),
            entry.status_label().to_string(),
            entry.references.numbers().join(";"),
            entry.deposited_at.to_rfc3339(),
            entry.settled_at.map(|dt| dt.to_rfc3339()).unwrap_or_default(),
            entry.returned_at.map(|dt| dt.to_rfc3339()).unwrap_or_default(),
            entry.return_reason.clone().unwrap_or_default(),
            entry.note.clone().unwrap_or_default(),
            entry.created_by.clone(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FundCategory, whole};

    #[test]
    fn test_write_entries_csv() {
        let contract = Contract::new("KR-001", "Budi");
        let entry = FundEntry::deposit(
            contract.id,
            FundCategory::Notary,
            whole(1_500_000),
            Utc::now(),
            "admin",
        )
        .unwrap()
        .with_note("deed fee");

        let numbers = HashMap::from([(contract.id, contract.number.clone())]);
        let mut buffer = Vec::new();
        let count = write_entries_csv(&[entry], &numbers, &mut buffer).unwrap();
        assert_eq!(count, 1);

        let output = String::from_utf8(buffer).unwrap();
        let mut lines = output.lines();
        assert!(lines.next().unwrap().starts_with("id,sequence,contract,category"));
        let row = lines.next().unwrap();
        assert!(row.contains("KR-001"));
        assert!(row.contains("notary"));
        assert!(row.contains("\"1,500,000.00\""));
        assert!(row.contains("deed fee"));
    }
}
