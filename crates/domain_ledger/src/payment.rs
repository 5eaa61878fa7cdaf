//! Payment allocation
//!
//! A payment is spread over a ledger's items in stored order, filling each
//! item before moving to the next. Payments larger than what is owed are
//! rejected outright; there is no credit balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Money, StudentId, TransactionId, YearId};

use crate::account::{ChargeItemId, LedgerAccount, LedgerKey};
use crate::actor::Actor;
use crate::error::LedgerError;

/// How the money arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Cash at the school office
    Cash,
    /// Direct bank transfer
    BankTransfer,
    /// Card at a terminal
    Card,
    /// Online gateway, confirmed before the engine is called
    Online,
    /// Cheque
    Cheque,
}

/// Transaction lifecycle; only completed payments are ever recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Completed,
}

/// Portion of a payment applied to one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub item_id: ChargeItemId,
    pub amount_applied: Money,
}

/// Immutable record of one payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier (time-ordered)
    pub id: TransactionId,
    /// Student who paid
    pub student_id: StudentId,
    /// Academic year the payment applies to
    pub year_id: YearId,
    /// Total amount paid
    pub amount: Money,
    /// Payment method
    pub method: PaymentMethod,
    /// Gateway or receipt reference, unique per ledger
    pub reference: Option<String>,
    /// How the amount was spread over the items
    pub allocation: Vec<AllocationLine>,
    /// Who recorded the payment
    pub recorded_by: Option<String>,
    /// When the payment was recorded
    pub timestamp: DateTime<Utc>,
    /// Always `Completed`
    pub status: TransactionStatus,
}

impl Transaction {
    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.student_id.clone(), self.year_id.clone())
    }
}

/// A request to record a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub student_id: StudentId,
    pub year_id: YearId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub recorded_by: Option<Actor>,
}

impl PaymentRequest {
    pub fn new(student_id: StudentId, year_id: YearId, amount: Money, method: PaymentMethod) -> Self {
        Self {
            student_id,
            year_id,
            amount,
            method,
            reference: None,
            recorded_by: None,
        }
    }

    /// Sets the gateway/receipt reference used for replay protection
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn recorded_by(mut self, actor: Actor) -> Self {
        self.recorded_by = Some(actor);
        self
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.student_id.clone(), self.year_id.clone())
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.student_id.is_blank() || self.year_id.is_blank() {
            return Err(LedgerError::validation("student and year are required"));
        }
        if !self.amount.is_positive() {
            return Err(LedgerError::validation(format!(
                "payment amount must be positive, got {}",
                self.amount
            )));
        }
        if matches!(&self.reference, Some(r) if r.trim().is_empty()) {
            return Err(LedgerError::validation("payment reference is empty"));
        }
        Ok(())
    }

    /// Builds the transaction record for an allocation of this request
    pub fn into_transaction(self, allocation: Vec<AllocationLine>, now: DateTime<Utc>) -> Transaction {
        Transaction {
            id: TransactionId::new_v7(),
            student_id: self.student_id,
            year_id: self.year_id,
            amount: self.amount,
            method: self.method,
            reference: self.reference,
            allocation,
            recorded_by: self.recorded_by.map(|actor| actor.id),
            timestamp: now,
            status: TransactionStatus::Completed,
        }
    }
}

/// Computes how `amount` would be spread over the ledger's items.
///
/// Items are visited in stored order; each absorbs up to what it still owes.
/// Fails with `Overpayment` if anything would be left over.
pub fn plan_allocation(
    account: &LedgerAccount,
    amount: Money,
) -> Result<Vec<AllocationLine>, LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::validation(format!(
            "payment amount must be positive, got {}",
            amount
        )));
    }

    let mut remaining = amount;
    let mut lines = Vec::new();
    for item in &account.items {
        if !remaining.is_positive() {
            break;
        }
        let due = item.outstanding();
        if !due.is_positive() {
            continue;
        }
        let applied = remaining.min(due);
        lines.push(AllocationLine {
            item_id: item.id.clone(),
            amount_applied: applied,
        });
        remaining -= applied;
    }

    if remaining.is_positive() {
        return Err(LedgerError::Overpayment {
            amount,
            outstanding: account.outstanding(),
        });
    }
    Ok(lines)
}

/// Allocates `amount` onto the ledger in place.
///
/// The ledger is left untouched if the allocation fails.
pub fn allocate(
    account: &mut LedgerAccount,
    amount: Money,
) -> Result<Vec<AllocationLine>, LedgerError> {
    let lines = plan_allocation(account, amount)?;
    let mut updated = account.clone();
    for line in &lines {
        if let Some(item) = updated.items.iter_mut().find(|item| item.id == line.item_id) {
            item.paid_amount += line.amount_applied;
            item.refresh_status();
        }
    }
    updated.total_paid = updated.total_paid.checked_add(amount)?;
    updated.recompute_totals()?;
    *account = updated;
    Ok(lines)
}
