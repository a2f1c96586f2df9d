use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Amount, Contract, ContractId, EntryEvent, EntryEventKind, FundCategory, FundEntry,
    FundEntryId, FundStatus, References, SettlementReferences,
};

use super::{MIGRATION_001_INITIAL, MIGRATION_002_ENTRY_EVENTS};

const ENTRY_COLUMNS: &str = "e.id, e.sequence, e.version, e.contract_id, e.category, e.amount, \
    e.paid_amount, e.status, e.policy_number, e.proof_of_payment, e.deed_number, e.deposited_at, \
    e.settled_at, e.returned_at, e.return_reason, e.note, e.created_by, e.recorded_at";

const EVENT_COLUMNS: &str = "id, sequence, entry_id, kind, amount, policy_number, \
    proof_of_payment, deed_number, reason, actor, occurred_at, recorded_at";

const SEARCH_COLUMN_COUNT: usize = 7;

/// Statistics for ledger integrity verification.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub contract_ids: Vec<ContractId>,
    pub stored_outstanding: Amount,
    pub has_sequence_gaps: bool,
}

/// Filters for listing entries. `None` means "don't filter".
#[derive(Debug, Clone, Default)]
pub struct EntryQuery<'a> {
    pub contract_id: Option<ContractId>,
    pub category: Option<FundCategory>,
    pub status: Option<FundStatus>,
    /// Matched against contract number, debtor name, note, creator and reference numbers
    pub search: Option<&'a str>,
    pub limit: i64,
    pub offset: i64,
}

/// Repository for persisting and querying contracts, fund entries and their events.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database. Writers wait up to `busy_timeout`
    /// for each other instead of failing immediately.
    pub async fn connect(database_url: &str, busy_timeout: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .busy_timeout(busy_timeout);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations. Every migration is idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_ENTRY_EVENTS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str, busy_timeout: Duration) -> Result<Self> {
        let repo = Self::connect(database_url, busy_timeout).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Contract operations
    // ========================

    pub async fn save_contract(&self, contract: &Contract) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contracts (id, number, debtor_name, registered_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(contract.id.to_string())
        .bind(&contract.number)
        .bind(&contract.debtor_name)
        .bind(contract.registered_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save contract")?;
        Ok(())
    }

    pub async fn get_contract(&self, id: ContractId) -> Result<Option<Contract>> {
        let row = sqlx::query(
            "SELECT id, number, debtor_name, registered_at FROM contracts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch contract")?;

        row.as_ref().map(Self::row_to_contract).transpose()
    }

    pub async fn get_contract_by_number(&self, number: &str) -> Result<Option<Contract>> {
        let row = sqlx::query(
            "SELECT id, number, debtor_name, registered_at FROM contracts WHERE number = ?",
        )
        .bind(number.trim())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch contract by number")?;

        row.as_ref().map(Self::row_to_contract).transpose()
    }

    pub async fn list_contracts(&self) -> Result<Vec<Contract>> {
        let rows = sqlx::query(
            "SELECT id, number, debtor_name, registered_at FROM contracts ORDER BY number",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list contracts")?;

        rows.iter().map(Self::row_to_contract).collect()
    }

    fn row_to_contract(row: &SqliteRow) -> Result<Contract> {
        let id_str: String = row.get("id");
        let registered_at_str: String = row.get("registered_at");

        Ok(Contract {
            id: Uuid::parse_str(&id_str).context("Invalid contract ID")?,
            number: row.get("number"),
            debtor_name: row.get("debtor_name"),
            registered_at: parse_timestamp(&registered_at_str)
                .context("Invalid registered_at timestamp")?,
        })
    }

    // ========================
    // Fund entry operations
    // ========================

    /// Insert a new entry together with its deposit event, in one transaction.
    /// Assigns the entry's sequence number and initial version.
    pub async fn insert_entry(&self, entry: &mut FundEntry, event: &mut EntryEvent) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        entry.sequence = next_sequence(&mut tx, "entry_sequence").await?;
        entry.version = 1;

        sqlx::query(
            r#"
            INSERT INTO fund_entries (
                id, sequence, version, contract_id, category, amount, paid_amount, status,
                policy_number, proof_of_payment, deed_number, deposited_at, settled_at,
                returned_at, return_reason, note, created_by, recorded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.sequence)
        .bind(entry.version)
        .bind(entry.contract_id.to_string())
        .bind(entry.category.as_str())
        .bind(entry.amount)
        .bind(entry.paid_amount)
        .bind(entry.status.as_str())
        .bind(entry.references.policy_number())
        .bind(entry.references.proof_of_payment())
        .bind(entry.references.deed_number())
        .bind(entry.deposited_at.to_rfc3339())
        .bind(entry.settled_at.map(|dt| dt.to_rfc3339()))
        .bind(entry.returned_at.map(|dt| dt.to_rfc3339()))
        .bind(&entry.return_reason)
        .bind(&entry.note)
        .bind(&entry.created_by)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to save fund entry")?;

        insert_event(&mut tx, event).await?;

        tx.commit().await.context("Failed to commit fund entry")?;
        Ok(())
    }

    /// Persist a changed entry if nobody else changed it first.
    ///
    /// `entry.version` must be the version that was read. The update only
    /// applies if the stored row still has that version; on success the
    /// version is bumped and the event is appended in the same transaction.
    /// Returns `false` (and writes nothing) when the version no longer matches.
    pub async fn update_entry(&self, entry: &mut FundEntry, event: &mut EntryEvent) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let result = sqlx::query(
            r#"
            UPDATE fund_entries
            SET paid_amount = ?, status = ?, policy_number = ?, proof_of_payment = ?,
                deed_number = ?, settled_at = ?, returned_at = ?, return_reason = ?, note = ?,
                version = version + 1
            WHERE id = ? AND version = ? AND deleted_at IS NULL
            "#,
        )
        .bind(entry.paid_amount)
        .bind(entry.status.as_str())
        .bind(entry.references.policy_number())
        .bind(entry.references.proof_of_payment())
        .bind(entry.references.deed_number())
        .bind(entry.settled_at.map(|dt| dt.to_rfc3339()))
        .bind(entry.returned_at.map(|dt| dt.to_rfc3339()))
        .bind(&entry.return_reason)
        .bind(&entry.note)
        .bind(entry.id.to_string())
        .bind(entry.version)
        .execute(&mut *tx)
        .await
        .context("Failed to update fund entry")?;

        if result.rows_affected() == 0 {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(false);
        }

        insert_event(&mut tx, event).await?;
        tx.commit().await.context("Failed to commit fund entry update")?;

        entry.version += 1;
        Ok(true)
    }

    /// Soft-delete an entry, guarded by the same version check as updates.
    pub async fn delete_entry(
        &self,
        entry: &FundEntry,
        event: &mut EntryEvent,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let result = sqlx::query(
            r#"
            UPDATE fund_entries
            SET deleted_at = ?, deleted_by = ?, deletion_reason = ?, version = version + 1
            WHERE id = ? AND version = ? AND deleted_at IS NULL
            "#,
        )
        .bind(event.occurred_at.to_rfc3339())
        .bind(&event.actor)
        .bind(&event.reason)
        .bind(entry.id.to_string())
        .bind(entry.version)
        .execute(&mut *tx)
        .await
        .context("Failed to delete fund entry")?;

        if result.rows_affected() == 0 {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(false);
        }

        insert_event(&mut tx, event).await?;
        tx.commit().await.context("Failed to commit fund entry deletion")?;
        Ok(true)
    }

    /// Get a live (not deleted) entry by ID.
    pub async fn get_entry(&self, id: FundEntryId) -> Result<Option<FundEntry>> {
        let query = format!(
            "SELECT {} FROM fund_entries e WHERE e.id = ? AND e.deleted_at IS NULL",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch fund entry")?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    /// All live entries for one contract, in insertion order.
    pub async fn list_entries_for_contract(&self, contract_id: ContractId) -> Result<Vec<FundEntry>> {
        let query = format!(
            "SELECT {} FROM fund_entries e \
             WHERE e.contract_id = ? AND e.deleted_at IS NULL ORDER BY e.sequence",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(contract_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list fund entries for contract")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// All live entries, in insertion order.
    pub async fn list_entries(&self) -> Result<Vec<FundEntry>> {
        let query = format!(
            "SELECT {} FROM fund_entries e WHERE e.deleted_at IS NULL ORDER BY e.sequence",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list fund entries")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// One page of live entries matching the query, newest first,
    /// plus the total number of matches.
    pub async fn list_entries_filtered(&self, filter: &EntryQuery<'_>) -> Result<(Vec<FundEntry>, i64)> {
        let mut conditions = String::from(" WHERE e.deleted_at IS NULL");

        // Collect all string bindings first so they live long enough
        let contract_id_str = filter.contract_id.map(|id| id.to_string());
        let pattern = filter
            .search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        if filter.contract_id.is_some() {
            conditions.push_str(" AND e.contract_id = ?");
        }
        if filter.category.is_some() {
            conditions.push_str(" AND e.category = ?");
        }
        if filter.status.is_some() {
            conditions.push_str(" AND e.status = ?");
        }
        if pattern.is_some() {
            let columns: [&str; SEARCH_COLUMN_COUNT] = [
                "c.number",
                "c.debtor_name",
                "e.note",
                "e.created_by",
                "e.policy_number",
                "e.proof_of_payment",
                "e.deed_number",
            ];
            let clauses: Vec<String> = columns
                .iter()
                .map(|column| format!("{} LIKE ? ESCAPE '\\'", column))
                .collect();
            conditions.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }

        let from = " FROM fund_entries e JOIN contracts c ON c.id = e.contract_id";
        let count_sql = format!("SELECT COUNT(*) as count{}{}", from, conditions);
        let page_sql = format!(
            "SELECT {}{}{} ORDER BY e.sequence DESC LIMIT ? OFFSET ?",
            ENTRY_COLUMNS, from, conditions
        );

        let mut count_query = sqlx::query(&count_sql);
        let mut page_query = sqlx::query(&page_sql);

        if let Some(ref id) = contract_id_str {
            count_query = count_query.bind(id);
            page_query = page_query.bind(id);
        }
        if let Some(category) = filter.category {
            count_query = count_query.bind(category.as_str());
            page_query = page_query.bind(category.as_str());
        }
        if let Some(status) = filter.status {
            count_query = count_query.bind(status.as_str());
            page_query = page_query.bind(status.as_str());
        }
        if let Some(ref pattern) = pattern {
            for _ in 0..SEARCH_COLUMN_COUNT {
                count_query = count_query.bind(pattern);
                page_query = page_query.bind(pattern);
            }
        }

        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await
            .context("Failed to count fund entries")?
            .get("count");

        let rows = page_query
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list filtered fund entries")?;

        let entries = rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<Result<Vec<_>>>()?;
        Ok((entries, total))
    }

    /// Ledger-wide outstanding balance aggregated in SQL. Used to cross-check
    /// the in-memory recomputation.
    pub async fn sum_outstanding(&self) -> Result<Amount> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount - paid_amount), 0) as outstanding
            FROM fund_entries
            WHERE deleted_at IS NULL AND status IN ('unpaid', 'partially_settled')
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum outstanding balance")?;
        Ok(row.get("outstanding"))
    }

    /// Events for one entry, oldest first. Deleted entries keep their events.
    pub async fn list_events(&self, entry_id: FundEntryId) -> Result<Vec<EntryEvent>> {
        let query = format!(
            "SELECT {} FROM entry_events WHERE entry_id = ? ORDER BY sequence",
            EVENT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(entry_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list entry events")?;

        rows.iter().map(Self::row_to_event).collect()
    }

    /// Get statistics for integrity checking.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let contract_rows = sqlx::query("SELECT id FROM contracts")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list contract IDs")?;
        let contract_ids = contract_rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                Uuid::parse_str(&id).context("Invalid contract ID")
            })
            .collect::<Result<Vec<_>>>()?;

        let stored_outstanding = self.sum_outstanding().await?;

        // Deleted entries keep their sequence numbers, so include them here
        let sequence_check = sqlx::query(
            r#"
            SELECT
                MIN(sequence) as min_seq,
                MAX(sequence) as max_seq,
                COUNT(*) as count
            FROM fund_entries
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to check entry sequence")?;

        let min_seq: Option<i64> = sequence_check.get("min_seq");
        let max_seq: Option<i64> = sequence_check.get("max_seq");
        let count: i64 = sequence_check.get("count");

        let has_sequence_gaps = match (min_seq, max_seq) {
            (Some(min), Some(max)) => (max - min + 1) != count,
            _ => false,
        };

        Ok(IntegrityStats {
            contract_ids,
            stored_outstanding,
            has_sequence_gaps,
        })
    }

    fn row_to_entry(row: &SqliteRow) -> Result<FundEntry> {
        let id_str: String = row.get("id");
        let contract_id_str: String = row.get("contract_id");
        let category_str: String = row.get("category");
        let status_str: String = row.get("status");
        let deposited_at_str: String = row.get("deposited_at");
        let settled_at_str: Option<String> = row.get("settled_at");
        let returned_at_str: Option<String> = row.get("returned_at");
        let recorded_at_str: String = row.get("recorded_at");

        let category = FundCategory::from_str(&category_str).map_err(anyhow::Error::msg)?;
        let references = match category {
            FundCategory::Notary => References::Notary {
                deed_number: row.get("deed_number"),
            },
            FundCategory::Insurance => References::Insurance {
                policy_number: row.get("policy_number"),
                proof_of_payment: row.get("proof_of_payment"),
            },
            FundCategory::Installment => References::Installment,
        };

        Ok(FundEntry {
            id: Uuid::parse_str(&id_str).context("Invalid fund entry ID")?,
            sequence: row.get("sequence"),
            version: row.get("version"),
            contract_id: Uuid::parse_str(&contract_id_str).context("Invalid contract ID")?,
            category,
            amount: row.get("amount"),
            paid_amount: row.get("paid_amount"),
            status: FundStatus::from_str(&status_str).map_err(anyhow::Error::msg)?,
            references,
            deposited_at: parse_timestamp(&deposited_at_str).context("Invalid deposited_at")?,
            settled_at: parse_optional_timestamp(settled_at_str).context("Invalid settled_at")?,
            returned_at: parse_optional_timestamp(returned_at_str)
                .context("Invalid returned_at")?,
            return_reason: row.get("return_reason"),
            note: row.get("note"),
            created_by: row.get("created_by"),
            recorded_at: parse_timestamp(&recorded_at_str).context("Invalid recorded_at")?,
        })
    }

    fn row_to_event(row: &SqliteRow) -> Result<EntryEvent> {
        let id_str: String = row.get("id");
        let entry_id_str: String = row.get("entry_id");
        let kind_str: String = row.get("kind");
        let occurred_at_str: String = row.get("occurred_at");
        let recorded_at_str: String = row.get("recorded_at");

        Ok(EntryEvent {
            id: Uuid::parse_str(&id_str).context("Invalid event ID")?,
            sequence: row.get("sequence"),
            entry_id: Uuid::parse_str(&entry_id_str).context("Invalid entry ID")?,
            kind: EntryEventKind::from_str(&kind_str).map_err(anyhow::Error::msg)?,
            amount: row.get("amount"),
            references: SettlementReferences {
                policy_number: row.get("policy_number"),
                proof_of_payment: row.get("proof_of_payment"),
                deed_number: row.get("deed_number"),
            },
            reason: row.get("reason"),
            actor: row.get("actor"),
            occurred_at: parse_timestamp(&occurred_at_str).context("Invalid occurred_at")?,
            recorded_at: parse_timestamp(&recorded_at_str).context("Invalid recorded_at")?,
        })
    }
}

/// Get the next value of a named counter and increment it.
async fn next_sequence(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    let row = sqlx::query(
        r#"
        UPDATE sequence_counter
        SET value = value + 1
        WHERE name = ?
        RETURNING value
        "#,
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("Failed to get next {} number", name))?;

    Ok(row.get("value"))
}

async fn insert_event(conn: &mut SqliteConnection, event: &mut EntryEvent) -> Result<()> {
    event.sequence = next_sequence(&mut *conn, "event_sequence").await?;

    sqlx::query(
        r#"
        INSERT INTO entry_events (
            id, sequence, entry_id, kind, amount, policy_number, proof_of_payment,
            deed_number, reason, actor, occurred_at, recorded_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id.to_string())
    .bind(event.sequence)
    .bind(event.entry_id.to_string())
    .bind(event.kind.as_str())
    .bind(event.amount)
    .bind(&event.references.policy_number)
    .bind(&event.references.proof_of_payment)
    .bind(&event.references.deed_number)
    .bind(&event.reason)
    .bind(&event.actor)
    .bind(event.occurred_at.to_rfc3339())
    .bind(event.recorded_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .context("Failed to save entry event")?;

    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_optional_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_timestamp).transpose()
}

/// Wrap user text in `%...%`, escaping LIKE wildcards.
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
