//! Manual fee adjustments
//!
//! Discounts and overrides change item amounts after the fact. A batch of
//! changes either applies completely or not at all, and every applied batch
//! leaves an [`Adjustment`] audit record behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use core_kernel::{AdjustmentId, Money, StudentId, YearId};

use crate::account::{ChargeItemId, LedgerAccount, LedgerKey};
use crate::actor::{Actor, ActorRole};
use crate::error::LedgerError;

/// How a change value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentKind {
    /// Reduce the amount by `value`, never below zero
    Discount,
    /// Replace the amount with `value`
    Override,
}

impl AdjustmentKind {
    pub fn apply(&self, current: Money, value: Money) -> Money {
        match self {
            AdjustmentKind::Discount => current.saturating_sub_floor(value),
            AdjustmentKind::Override => value,
        }
    }
}

/// One requested change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChange {
    pub item_id: ChargeItemId,
    pub kind: AdjustmentKind,
    pub value: Money,
}

impl ItemChange {
    pub fn discount(item_id: impl Into<ChargeItemId>, value: Money) -> Self {
        Self {
            item_id: item_id.into(),
            kind: AdjustmentKind::Discount,
            value,
        }
    }

    pub fn set_amount(item_id: impl Into<ChargeItemId>, value: Money) -> Self {
        Self {
            item_id: item_id.into(),
            kind: AdjustmentKind::Override,
            value,
        }
    }
}

/// A batch of changes to one ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub student_id: StudentId,
    pub year_id: YearId,
    pub changes: Vec<ItemChange>,
    pub reason: String,
    pub actor: Actor,
}

impl AdjustmentRequest {
    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.student_id.clone(), self.year_id.clone())
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.changes.is_empty() {
            return Err(LedgerError::validation("no changes requested"));
        }
        if self.reason.trim().is_empty() {
            return Err(LedgerError::validation("an adjustment reason is required"));
        }
        if let Some(change) = self.changes.iter().find(|c| c.value.is_negative()) {
            return Err(LedgerError::validation(format!(
                "adjustment value for {} must not be negative",
                change.item_id
            )));
        }
        Ok(())
    }
}

/// One applied change, as recorded in the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentChange {
    pub item_id: ChargeItemId,
    pub old_amount: Money,
    pub new_amount: Money,
    pub kind: AdjustmentKind,
    pub value: Money,
}

/// Immutable audit record of one adjustment batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: AdjustmentId,
    pub student_id: StudentId,
    pub year_id: YearId,
    pub reason: String,
    /// Applied changes; unknown items requested in the batch are absent
    pub changes: Vec<AdjustmentChange>,
    pub performed_by: String,
    pub performer_role: ActorRole,
    pub timestamp: DateTime<Utc>,
}

impl Adjustment {
    pub fn from_request(
        request: &AdjustmentRequest,
        changes: Vec<AdjustmentChange>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AdjustmentId::new_v7(),
            student_id: request.student_id.clone(),
            year_id: request.year_id.clone(),
            reason: request.reason.clone(),
            changes,
            performed_by: request.actor.id.clone(),
            performer_role: request.actor.role,
            timestamp: now,
        }
    }

    /// Net change to the ledger's total fee
    ///
    /// Accumulated in `i128`; the result is the difference of two in-range
    /// totals, so it only saturates for records no ledger could produce.
    pub fn net_change(&self) -> Money {
        let net: i128 = self
            .changes
            .iter()
            .map(|change| {
                i128::from(change.new_amount.minor()) - i128::from(change.old_amount.minor())
            })
            .sum();
        let clamped = net.clamp(i128::from(i64::MIN), i128::from(i64::MAX));
        Money::from_minor(i64::try_from(clamped).unwrap_or_default())
    }
}

/// Works out the effect of `changes` without touching the ledger.
///
/// Changes to items the ledger does not have are skipped. Several changes to
/// the same item apply in sequence. Fails on the first change that would take
/// an item below what has been paid on it.
pub fn plan_adjustments(
    account: &LedgerAccount,
    changes: &[ItemChange],
) -> Result<Vec<AdjustmentChange>, LedgerError> {
    let mut working: HashMap<&ChargeItemId, Money> = HashMap::new();
    let mut planned = Vec::with_capacity(changes.len());

    for change in changes {
        let Some(item) = account.item(&change.item_id) else {
            continue;
        };
        let old_amount = working.get(&item.id).copied().unwrap_or(item.amount);
        let new_amount = change.kind.apply(old_amount, change.value);
        if new_amount < item.paid_amount {
            return Err(LedgerError::InvalidAdjustment {
                item_id: item.id.clone(),
                new_amount,
                paid_amount: item.paid_amount,
            });
        }
        working.insert(&item.id, new_amount);
        planned.push(AdjustmentChange {
            item_id: item.id.clone(),
            old_amount,
            new_amount,
            kind: change.kind,
            value: change.value,
        });
    }
    Ok(planned)
}

/// Applies `changes` to the ledger; nothing is modified on error
pub fn apply_changes(
    account: &mut LedgerAccount,
    changes: &[ItemChange],
) -> Result<Vec<AdjustmentChange>, LedgerError> {
    let planned = plan_adjustments(account, changes)?;
    let mut updated = account.clone();
    for change in &planned {
        if let Some(item) = updated.items.iter_mut().find(|item| item.id == change.item_id) {
            item.amount = change.new_amount;
            item.refresh_status();
        }
    }
    updated.recompute_totals()?;
    *account = updated;
    Ok(planned)
}
