use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, FundEntry, FundEntryId, SettlementReferences};

pub type EntryEventId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryEventKind {
    Deposited,
    Settled,
    ReferenceAttached,
    Returned,
    Deleted,
}

impl EntryEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryEventKind::Deposited => "deposited",
            EntryEventKind::Settled => "settled",
            EntryEventKind::ReferenceAttached => "reference_attached",
            EntryEventKind::Returned => "returned",
            EntryEventKind::Deleted => "deleted",
        }
    }
}

impl FromStr for EntryEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposited" => Ok(EntryEventKind::Deposited),
            "settled" => Ok(EntryEventKind::Settled),
            "reference_attached" => Ok(EntryEventKind::ReferenceAttached),
            "returned" => Ok(EntryEventKind::Returned),
            "deleted" => Ok(EntryEventKind::Deleted),
            other => Err(format!("unknown event kind '{}'", other)),
        }
    }
}

impl std::fmt::Display for EntryEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One change to a fund entry, kept forever. Unlike the entry itself, the
/// event log keeps the reference numbers of every settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryEvent {
    pub id: EntryEventId,
    /// Assigned by the repository
    pub sequence: i64,
    pub entry_id: FundEntryId,
    pub kind: EntryEventKind,
    /// Money moved by this event, if any
    pub amount: Option<Amount>,
    pub references: SettlementReferences,
    pub reason: Option<String>,
    pub actor: String,
    /// Business date of the event (deposit, settlement or return date)
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl EntryEvent {
    fn new(entry_id: FundEntryId, kind: EntryEventKind, actor: &str, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            entry_id,
            kind,
            amount: None,
            references: SettlementReferences::default(),
            reason: None,
            actor: actor.to_string(),
            occurred_at,
            recorded_at: Utc::now(),
        }
    }

    pub fn deposited(entry: &FundEntry) -> Self {
        let mut event = Self::new(
            entry.id,
            EntryEventKind::Deposited,
            &entry.created_by,
            entry.deposited_at,
        );
        event.amount = Some(entry.amount);
        event.reason = entry.note.clone();
        event
    }

    /// Record the difference between an entry before and after settlement.
    pub fn settled(before: &FundEntry, after: &FundEntry, actor: &str) -> Self {
        let mut event = Self::new(
            after.id,
            EntryEventKind::Settled,
            actor,
            after.settled_at.unwrap_or_else(Utc::now),
        );
        event.amount = Some(after.paid_amount - before.paid_amount);
        event.references = references_of(after);
        event
    }

    pub fn reference_attached(after: &FundEntry, actor: &str) -> Self {
        let mut event = Self::new(
            after.id,
            EntryEventKind::ReferenceAttached,
            actor,
            Utc::now(),
        );
        event.references = references_of(after);
        event
    }

    pub fn returned(after: &FundEntry, actor: &str) -> Self {
        let mut event = Self::new(
            after.id,
            EntryEventKind::Returned,
            actor,
            after.returned_at.unwrap_or_else(Utc::now),
        );
        event.amount = Some(after.remaining());
        event.reason = after.return_reason.clone();
        event
    }

    pub fn deleted(entry: &FundEntry, actor: &str, reason: &str, at: DateTime<Utc>) -> Self {
        let mut event = Self::new(entry.id, EntryEventKind::Deleted, actor, at);
        event.reason = Some(reason.to_string());
        event
    }
}

fn references_of(entry: &FundEntry) -> SettlementReferences {
    SettlementReferences {
        policy_number: entry.references.policy_number().map(str::to_string),
        proof_of_payment: entry.references.proof_of_payment().map(str::to_string),
        deed_number: entry.references.deed_number().map(str::to_string),
    }
}
