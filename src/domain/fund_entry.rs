use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    Amount, ContractId, FundAction, FundCategory, FundError, FundEvent, FundStatus, MAX_AMOUNT,
    SettlementMode, transition,
};

pub type FundEntryId = Uuid;

/// Category-specific identifiers acquired when an entry is settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum References {
    Notary {
        deed_number: Option<String>,
    },
    Insurance {
        policy_number: Option<String>,
        proof_of_payment: Option<String>,
    },
    Installment,
}

impl References {
    pub fn empty(category: FundCategory) -> Self {
        match category {
            FundCategory::Notary => References::Notary { deed_number: None },
            FundCategory::Insurance => References::Insurance {
                policy_number: None,
                proof_of_payment: None,
            },
            FundCategory::Installment => References::Installment,
        }
    }

    pub fn deed_number(&self) -> Option<&str> {
        match self {
            References::Notary { deed_number } => deed_number.as_deref(),
            _ => None,
        }
    }

    pub fn policy_number(&self) -> Option<&str> {
        match self {
            References::Insurance { policy_number, .. } => policy_number.as_deref(),
            _ => None,
        }
    }

    pub fn proof_of_payment(&self) -> Option<&str> {
        match self {
            References::Insurance {
                proof_of_payment, ..
            } => proof_of_payment.as_deref(),
            _ => None,
        }
    }

    /// All reference numbers present, in display order.
    pub fn numbers(&self) -> Vec<&str> {
        [self.policy_number(), self.proof_of_payment(), self.deed_number()]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Reference numbers supplied with a settlement request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReferences {
    pub policy_number: Option<String>,
    pub proof_of_payment: Option<String>,
    pub deed_number: Option<String>,
}

/// A request to pay out (part of) a deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub amount: Amount,
    pub settled_at: Option<DateTime<Utc>>,
    pub references: SettlementReferences,
}

impl Settlement {
    pub fn new(amount: Amount) -> Self {
        Self {
            amount,
            settled_at: None,
            references: SettlementReferences::default(),
        }
    }

    pub fn on(mut self, settled_at: DateTime<Utc>) -> Self {
        self.settled_at = Some(settled_at);
        self
    }

    pub fn with_policy_number(mut self, policy_number: impl Into<String>) -> Self {
        self.references.policy_number = Some(policy_number.into());
        self
    }

    pub fn with_proof_of_payment(mut self, proof: impl Into<String>) -> Self {
        self.references.proof_of_payment = Some(proof.into());
        self
    }

    pub fn with_deed_number(mut self, deed_number: impl Into<String>) -> Self {
        self.references.deed_number = Some(deed_number.into());
        self
    }
}

/// Money a customer deposited for one future obligation on one loan contract.
///
/// Entries are never edited in place by callers: every state change goes
/// through a method that validates first and returns the updated entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundEntry {
    pub id: FundEntryId,
    /// Insertion order, assigned by the repository
    pub sequence: i64,
    /// Optimistic concurrency token, bumped on every persisted change
    pub version: i64,
    pub contract_id: ContractId,
    pub category: FundCategory,
    /// Total obligation the deposit is earmarked for
    pub amount: Amount,
    /// Cumulative amount settled so far
    pub paid_amount: Amount,
    pub status: FundStatus,
    pub references: References,
    pub deposited_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub return_reason: Option<String>,
    pub note: Option<String>,
    pub created_by: String,
    /// When the deposit was recorded in the system
    pub recorded_at: DateTime<Utc>,
}

impl FundEntry {
    /// Create a new unsettled entry. Sequence and version are assigned by the repository.
    pub fn deposit(
        contract_id: ContractId,
        category: FundCategory,
        amount: Amount,
        deposited_at: DateTime<Utc>,
        created_by: impl Into<String>,
    ) -> Result<Self, FundError> {
        if amount <= 0 || amount > MAX_AMOUNT {
            return Err(FundError::InvalidAmount(amount));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            sequence: 0,
            version: 0,
            contract_id,
            category,
            amount,
            paid_amount: 0,
            status: FundStatus::Unpaid,
            references: References::empty(category),
            deposited_at,
            settled_at: None,
            returned_at: None,
            return_reason: None,
            note: None,
            created_by: created_by.into(),
            recorded_at: Utc::now(),
        })
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Amount not yet settled, regardless of status.
    pub fn remaining(&self) -> Amount {
        self.amount - self.paid_amount
    }

    /// Amount still owed by this entry. Terminal entries owe nothing.
    pub fn outstanding(&self) -> Amount {
        if self.status.is_terminal() {
            0
        } else {
            self.remaining()
        }
    }

    pub fn status_label(&self) -> &'static str {
        self.status.label(self.category)
    }

    fn next_status(&self, event: FundEvent, action: FundAction) -> Result<FundStatus, FundError> {
        transition(self.category.settlement_mode(), self.status, event).ok_or(
            FundError::InvalidTransition {
                category: self.category,
                status: self.status,
                action,
            },
        )
    }

    /// Apply a settlement and return the updated entry.
    ///
    /// Insurance entries accumulate payments up to `amount` and need a policy
    /// number and proof of payment on every call. Notary and installment entries
    /// settle in full on the first call, whatever amount is submitted.
    pub fn settle(&self, settlement: &Settlement) -> Result<FundEntry, FundError> {
        let refs = &settlement.references;

        match self.category.settlement_mode() {
            SettlementMode::Partial => {
                if self.status == FundStatus::Returned {
                    return Err(FundError::InvalidTransition {
                        category: self.category,
                        status: self.status,
                        action: FundAction::Settle,
                    });
                }
                if settlement.amount <= 0 {
                    return Err(FundError::InvalidAmount(settlement.amount));
                }
                let remaining = self.remaining();
                if settlement.amount > remaining {
                    return Err(FundError::OverpaymentRejected {
                        amount: self.amount,
                        paid: self.paid_amount,
                        remaining,
                        requested: settlement.amount,
                    });
                }

                let policy_number = required(refs.policy_number.as_deref(), "policy number")?;
                let proof_of_payment = required(refs.proof_of_payment.as_deref(), "proof of payment")?;
                let settled_at = settlement
                    .settled_at
                    .ok_or(FundError::MissingReference("settlement date"))?;

                let paid_amount = self.paid_amount + settlement.amount;
                let event = if paid_amount == self.amount {
                    FundEvent::FinalPayment
                } else {
                    FundEvent::PartialPayment
                };
                let status = self.next_status(event, FundAction::Settle)?;

                Ok(FundEntry {
                    paid_amount,
                    status,
                    references: References::Insurance {
                        policy_number: Some(policy_number),
                        proof_of_payment: Some(proof_of_payment),
                    },
                    settled_at: Some(settled_at),
                    ..self.clone()
                })
            }
            SettlementMode::SingleShot => {
                let status = self.next_status(FundEvent::FinalPayment, FundAction::Settle)?;
                let settled_at = settlement
                    .settled_at
                    .ok_or(FundError::MissingReference("settlement date"))?;

                let references = match &self.references {
                    References::Notary { deed_number } => References::Notary {
                        deed_number: optional(refs.deed_number.as_deref()).or_else(|| deed_number.clone()),
                    },
                    other => other.clone(),
                };

                Ok(FundEntry {
                    paid_amount: self.amount,
                    status,
                    references,
                    settled_at: Some(settled_at),
                    ..self.clone()
                })
            }
        }
    }

    /// Attach a deed number to a notary entry, before or after settlement.
    pub fn attach_reference(&self, deed_number: &str) -> Result<FundEntry, FundError> {
        if self.category != FundCategory::Notary || self.status == FundStatus::Returned {
            return Err(FundError::InvalidTransition {
                category: self.category,
                status: self.status,
                action: FundAction::AttachReference,
            });
        }
        let deed_number = required(Some(deed_number), "deed number")?;

        Ok(FundEntry {
            references: References::Notary {
                deed_number: Some(deed_number),
            },
            ..self.clone()
        })
    }

    /// Refund the deposit to the customer. Only unsettled (or, for insurance,
    /// partially settled) entries can be returned.
    pub fn return_funds(&self, reason: &str, returned_at: DateTime<Utc>) -> Result<FundEntry, FundError> {
        let status = self.next_status(FundEvent::Return, FundAction::Return)?;
        let reason = required(Some(reason), "return reason")?;

        Ok(FundEntry {
            status,
            returned_at: Some(returned_at),
            return_reason: Some(reason),
            ..self.clone()
        })
    }

    /// Describe every broken invariant. An empty list means the entry is consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.amount <= 0 {
            issues.push(format!("entry {} has non-positive amount {}", self.id, self.amount));
        }
        if self.paid_amount < 0 || self.paid_amount > self.amount {
            issues.push(format!(
                "entry {} paid {} outside 0..={}",
                self.id, self.paid_amount, self.amount
            ));
        }

        let consistent = match self.status {
            FundStatus::Unpaid => self.paid_amount == 0,
            FundStatus::PartiallySettled => {
                self.category.settlement_mode() == SettlementMode::Partial
                    && self.paid_amount > 0
                    && self.paid_amount < self.amount
            }
            FundStatus::FullySettled => self.paid_amount == self.amount,
            FundStatus::Returned => self.paid_amount < self.amount,
        };
        if !consistent {
            issues.push(format!(
                "entry {} status {} does not match paid {} of {}",
                self.id, self.status, self.paid_amount, self.amount
            ));
        }

        if self.status == FundStatus::FullySettled && self.settled_at.is_none() {
            issues.push(format!("entry {} is settled without a settlement date", self.id));
        }
        if (self.status == FundStatus::Returned) != self.returned_at.is_some() {
            issues.push(format!(
                "entry {} return date does not match status {}",
                self.id, self.status
            ));
        }
        if self.references.category() != self.category {
            issues.push(format!(
                "entry {} carries references of another category",
                self.id
            ));
        }

        issues
    }
}

impl References {
    fn category(&self) -> FundCategory {
        match self {
            References::Notary { .. } => FundCategory::Notary,
            References::Insurance { .. } => FundCategory::Insurance,
            References::Installment => FundCategory::Installment,
        }
    }
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required(value: Option<&str>, name: &'static str) -> Result<String, FundError> {
    optional(value).ok_or(FundError::MissingReference(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::whole;

    fn entry(category: FundCategory, amount: Amount) -> FundEntry {
        FundEntry::deposit(Uuid::new_v4(), category, amount, Utc::now(), "teller").unwrap()
    }

    fn premium(amount: Amount) -> Settlement {
        Settlement::new(amount)
            .on(Utc::now())
            .with_policy_number("POL-001")
            .with_proof_of_payment("BKT-001")
    }

    #[test]
    fn test_deposit_requires_positive_amount() {
        let result = FundEntry::deposit(Uuid::new_v4(), FundCategory::Notary, 0, Utc::now(), "a");
        assert_eq!(result, Err(FundError::InvalidAmount(0)));

        let huge = MAX_AMOUNT + 1;
        let result = FundEntry::deposit(Uuid::new_v4(), FundCategory::Notary, huge, Utc::now(), "a");
        assert_eq!(result, Err(FundError::InvalidAmount(huge)));

        let fresh = entry(FundCategory::Insurance, whole(100));
        assert_eq!(fresh.status, FundStatus::Unpaid);
        assert_eq!(fresh.paid_amount, 0);
        assert_eq!(fresh.outstanding(), whole(100));
    }

    #[test]
    fn test_insurance_accumulates_payments() {
        let e = entry(FundCategory::Insurance, whole(1_000_000));

        let e = e.settle(&premium(whole(600_000))).unwrap();
        assert_eq!(e.status, FundStatus::PartiallySettled);
        assert_eq!(e.paid_amount, whole(600_000));
        assert_eq!(e.outstanding(), whole(400_000));

        let e = e.settle(&premium(whole(400_000))).unwrap();
        assert_eq!(e.status, FundStatus::FullySettled);
        assert_eq!(e.paid_amount, whole(1_000_000));
        assert_eq!(e.outstanding(), 0);

        assert!(matches!(
            e.settle(&premium(1)),
            Err(FundError::OverpaymentRejected { remaining: 0, .. })
        ));
    }

    #[test]
    fn test_insurance_rejects_overpayment_without_change() {
        let e = entry(FundCategory::Insurance, whole(500));
        let before = e.clone();

        let result = e.settle(&premium(whole(501)));
        assert!(matches!(result, Err(FundError::OverpaymentRejected { .. })));
        assert_eq!(e, before);
    }

    #[test]
    fn test_insurance_requires_references_each_time() {
        let e = entry(FundCategory::Insurance, whole(500));

        let no_policy = Settlement::new(whole(100))
            .on(Utc::now())
            .with_proof_of_payment("BKT-1");
        assert_eq!(
            e.settle(&no_policy),
            Err(FundError::MissingReference("policy number"))
        );

        let blank_proof = Settlement::new(whole(100))
            .on(Utc::now())
            .with_policy_number("POL-1")
            .with_proof_of_payment("   ");
        assert_eq!(
            e.settle(&blank_proof),
            Err(FundError::MissingReference("proof of payment"))
        );

        let no_date = Settlement::new(whole(100))
            .with_policy_number("POL-1")
            .with_proof_of_payment("BKT-1");
        assert_eq!(
            e.settle(&no_date),
            Err(FundError::MissingReference("settlement date"))
        );
    }

    #[test]
    fn test_insurance_references_are_last_write() {
        let e = entry(FundCategory::Insurance, whole(900));
        let e = e
            .settle(
                &Settlement::new(whole(300))
                    .on(Utc::now())
                    .with_policy_number("POL-9")
                    .with_proof_of_payment("BKT-1"),
            )
            .unwrap();
        let e = e
            .settle(
                &Settlement::new(whole(300))
                    .on(Utc::now())
                    .with_policy_number("POL-9")
                    .with_proof_of_payment("BKT-2"),
            )
            .unwrap();

        assert_eq!(e.references.proof_of_payment(), Some("BKT-2"));
        assert_eq!(e.references.numbers(), vec!["POL-9", "BKT-2"]);
    }

    #[test]
    fn test_single_shot_settles_full_amount() {
        let e = entry(FundCategory::Notary, whole(1_500_000));
        let settled = e.settle(&Settlement::new(whole(10)).on(Utc::now())).unwrap();

        assert_eq!(settled.status, FundStatus::FullySettled);
        assert_eq!(settled.paid_amount, whole(1_500_000));
        assert_eq!(settled.references.deed_number(), None);

        assert!(matches!(
            settled.settle(&Settlement::new(whole(10)).on(Utc::now())),
            Err(FundError::InvalidTransition {
                action: FundAction::Settle,
                ..
            })
        ));
        assert!(matches!(
            settled.return_funds("customer request", Utc::now()),
            Err(FundError::InvalidTransition {
                action: FundAction::Return,
                ..
            })
        ));
    }

    #[test]
    fn test_single_shot_requires_settlement_date() {
        let e = entry(FundCategory::Installment, whole(4_500_000));
        assert_eq!(
            e.settle(&Settlement::new(whole(4_500_000))),
            Err(FundError::MissingReference("settlement date"))
        );
    }

    #[test]
    fn test_notary_deed_number_attached_after_settlement() {
        let e = entry(FundCategory::Notary, whole(750_000));
        let settled = e.settle(&Settlement::new(0).on(Utc::now())).unwrap();

        let with_deed = settled.attach_reference("AKTA-12/2024").unwrap();
        assert_eq!(with_deed.references.deed_number(), Some("AKTA-12/2024"));
        assert_eq!(with_deed.status, FundStatus::FullySettled);
        assert_eq!(with_deed.paid_amount, settled.paid_amount);

        assert_eq!(
            settled.attach_reference(""),
            Err(FundError::MissingReference("deed number"))
        );
    }

    #[test]
    fn test_attach_reference_only_for_notary() {
        let e = entry(FundCategory::Insurance, whole(100));
        assert!(matches!(
            e.attach_reference("AKTA-1"),
            Err(FundError::InvalidTransition {
                action: FundAction::AttachReference,
                ..
            })
        ));
    }

    #[test]
    fn test_return_is_absorbing() {
        let e = entry(FundCategory::Installment, whole(4_500_000));
        assert_eq!(e.status_label(), "pending");

        let returned = e.return_funds("loan cancelled", Utc::now()).unwrap();
        assert_eq!(returned.status, FundStatus::Returned);
        assert_eq!(returned.return_reason.as_deref(), Some("loan cancelled"));
        assert!(returned.returned_at.is_some());
        assert_eq!(returned.outstanding(), 0);

        assert!(matches!(
            returned.return_funds("again", Utc::now()),
            Err(FundError::InvalidTransition { .. })
        ));
        assert!(matches!(
            returned.settle(&Settlement::new(whole(1)).on(Utc::now())),
            Err(FundError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_partially_settled_insurance_can_be_returned() {
        let e = entry(FundCategory::Insurance, whole(1_000));
        let partial = e.settle(&premium(whole(250))).unwrap();
        let returned = partial.return_funds("policy cancelled", Utc::now()).unwrap();

        assert_eq!(returned.status, FundStatus::Returned);
        assert_eq!(returned.paid_amount, whole(250));
        assert!(returned.invariant_violations().is_empty());
    }

    #[test]
    fn test_return_requires_reason() {
        let e = entry(FundCategory::Notary, whole(100));
        assert_eq!(
            e.return_funds("  ", Utc::now()),
            Err(FundError::MissingReference("return reason"))
        );
    }

    #[test]
    fn test_invariant_violations_detected() {
        let mut e = entry(FundCategory::Notary, whole(100));
        assert!(e.invariant_violations().is_empty());

        e.paid_amount = whole(150);
        e.status = FundStatus::PartiallySettled;
        let issues = e.invariant_violations();
        assert_eq!(issues.len(), 2, "{:?}", issues);
    }
}
