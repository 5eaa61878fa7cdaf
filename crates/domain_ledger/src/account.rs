//! Ledger accounts and their charge items
//!
//! A [`LedgerAccount`] is the single source of truth for what one student owes
//! in one academic year. It holds an ordered list of [`ChargeItem`]s plus the
//! derived totals, which every mutation keeps in step with the items.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{FeeId, Money, StudentId, TermId, YearId};

use crate::error::LedgerError;

/// Identifier of the single transport item on a ledger
pub const TRANSPORT_ITEM_ID: &str = "TRANSPORT_FEE";

/// Display name of the transport item
pub const TRANSPORT_ITEM_NAME: &str = "Transport Fee";

/// Deterministic identifier of a charge item, derived from its catalog source
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChargeItemId(String);

impl ChargeItemId {
    /// `TERM_<termId>`
    pub fn term(term_id: &TermId) -> Self {
        Self(format!("TERM_{}", term_id))
    }

    /// `CUSTOM_<feeId>`
    pub fn custom(fee_id: &FeeId) -> Self {
        Self(format!("CUSTOM_{}", fee_id))
    }

    /// `TRANSPORT_FEE`
    pub fn transport() -> Self {
        Self(TRANSPORT_ITEM_ID.to_string())
    }

    /// Wraps a raw id, e.g. one supplied in an adjustment request
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChargeItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChargeItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Source of a charge item.
///
/// The declaration order is the display order on a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeKind {
    /// Per-class term tuition
    Term,
    /// Ad-hoc fee targeted at classes, villages or students
    Custom,
    /// Per-village transport fee
    Transport,
}

impl ChargeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeKind::Term => "TERM",
            ChargeKind::Custom => "CUSTOM",
            ChargeKind::Transport => "TRANSPORT",
        }
    }
}

/// Payment state of one charge item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    Partial,
    Paid,
}

impl ItemStatus {
    /// Status as a pure function of amount and paid amount
    pub fn derive(amount: Money, paid_amount: Money) -> Self {
        if paid_amount.is_zero() {
            ItemStatus::Pending
        } else if paid_amount >= amount {
            ItemStatus::Paid
        } else {
            ItemStatus::Partial
        }
    }
}

/// Payment state of a whole ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerStatus {
    Pending,
    Paid,
}

impl LedgerStatus {
    pub fn derive(total_fee: Money, total_paid: Money) -> Self {
        if total_paid >= total_fee {
            LedgerStatus::Paid
        } else {
            LedgerStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "PENDING",
            LedgerStatus::Paid => "PAID",
        }
    }
}

/// One line of debt on a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeItem {
    /// Deterministic identifier
    pub id: ChargeItemId,
    /// Catalog source
    pub kind: ChargeKind,
    /// Display name
    pub name: String,
    /// Due date, if the catalog sets one
    pub due_date: Option<NaiveDate>,
    /// Amount owed
    pub amount: Money,
    /// Amount paid so far, never above `amount`
    pub paid_amount: Money,
    /// Derived from `amount` and `paid_amount`
    pub status: ItemStatus,
}

impl ChargeItem {
    /// Creates an unpaid item
    pub fn new(
        id: ChargeItemId,
        kind: ChargeKind,
        name: impl Into<String>,
        due_date: Option<NaiveDate>,
        amount: Money,
    ) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            due_date,
            amount,
            paid_amount: Money::ZERO,
            status: ItemStatus::Pending,
        }
    }

    /// Amount still owed on this item
    pub fn outstanding(&self) -> Money {
        self.amount.saturating_sub_floor(self.paid_amount)
    }

    /// True once any money has been applied to the item
    pub fn has_payments(&self) -> bool {
        self.paid_amount.is_positive()
    }

    /// Re-derives `status` after `amount` or `paid_amount` changed
    pub fn refresh_status(&mut self) {
        self.status = ItemStatus::derive(self.amount, self.paid_amount);
    }

    /// Checks `0 <= paid_amount <= amount` and the status derivation
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.amount.is_negative() {
            violations.push(format!("{}: negative amount {}", self.id, self.amount));
        }
        if self.paid_amount.is_negative() {
            violations.push(format!("{}: negative paid amount {}", self.id, self.paid_amount));
        }
        if self.paid_amount > self.amount {
            violations.push(format!(
                "{}: paid {} exceeds amount {}",
                self.id, self.paid_amount, self.amount
            ));
        }
        let expected = ItemStatus::derive(self.amount, self.paid_amount);
        if self.status != expected {
            violations.push(format!(
                "{}: status {:?} should be {:?}",
                self.id, self.status, expected
            ));
        }
        violations
    }
}

/// Key of a ledger: one per student per academic year
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub student_id: StudentId,
    pub year_id: YearId,
}

impl LedgerKey {
    pub fn new(student_id: StudentId, year_id: YearId) -> Self {
        Self { student_id, year_id }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.student_id, self.year_id)
    }
}

/// What one student owes for one academic year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccount {
    /// Student this ledger belongs to
    pub student_id: StudentId,
    /// Academic year scope
    pub year_id: YearId,
    /// Charge items, grouped by kind
    pub items: Vec<ChargeItem>,
    /// Sum of item amounts
    pub total_fee: Money,
    /// Sum of everything ever paid into this ledger
    pub total_paid: Money,
    /// Derived from the totals
    pub status: LedgerStatus,
    /// When the ledger was first created
    pub created_at: DateTime<Utc>,
    /// When the ledger content last changed
    pub updated_at: DateTime<Utc>,
}

impl LedgerAccount {
    /// Creates an empty ledger
    pub fn new(key: LedgerKey, now: DateTime<Utc>) -> Self {
        Self {
            student_id: key.student_id,
            year_id: key.year_id,
            items: Vec::new(),
            total_fee: Money::ZERO,
            total_paid: Money::ZERO,
            status: LedgerStatus::derive(Money::ZERO, Money::ZERO),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.student_id.clone(), self.year_id.clone())
    }

    pub fn item(&self, id: &ChargeItemId) -> Option<&ChargeItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn contains_item(&self, id: &ChargeItemId) -> bool {
        self.item(id).is_some()
    }

    /// Amount still owed across all items
    ///
    /// Never exceeds `total_fee`, which `recompute_totals` keeps in range.
    pub fn outstanding(&self) -> Money {
        Money::checked_sum(self.items.iter().map(ChargeItem::outstanding))
            .unwrap_or(self.total_fee)
    }

    /// Recomputes `total_fee` and `status`. `total_paid` is only ever moved by payments.
    ///
    /// Fails without touching the ledger if the item amounts do not fit in a `Money`.
    pub fn recompute_totals(&mut self) -> Result<(), LedgerError> {
        self.total_fee = Money::checked_sum(self.items.iter().map(|item| item.amount))?;
        self.status = LedgerStatus::derive(self.total_fee, self.total_paid);
        Ok(())
    }

    /// Inserts an item after the last existing item of the same kind
    ///
    /// The ledger is unchanged if the new total would overflow.
    pub fn insert_item(&mut self, item: ChargeItem) -> Result<(), LedgerError> {
        self.total_fee.checked_add(item.amount)?;
        let position = self
            .items
            .iter()
            .rposition(|existing| existing.kind <= item.kind)
            .map(|idx| idx + 1)
            .unwrap_or(0);
        self.items.insert(position, item);
        self.recompute_totals()
    }

    /// Compares everything except the timestamps
    pub fn same_content(&self, other: &LedgerAccount) -> bool {
        self.student_id == other.student_id
            && self.year_id == other.year_id
            && self.items == other.items
            && self.total_fee == other.total_fee
            && self.total_paid == other.total_paid
            && self.status == other.status
    }

    /// Lists every broken item or ledger invariant; empty when consistent
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations: Vec<String> = self
            .items
            .iter()
            .flat_map(ChargeItem::invariant_violations)
            .collect();

        match Money::checked_sum(self.items.iter().map(|item| item.amount)) {
            Ok(fee_sum) if fee_sum != self.total_fee => violations.push(format!(
                "total_fee {} does not match item sum {}",
                self.total_fee, fee_sum
            )),
            Ok(_) => {}
            Err(_) => violations.push("item amounts overflow".to_string()),
        }
        match Money::checked_sum(self.items.iter().map(|item| item.paid_amount)) {
            Ok(paid_sum) if paid_sum != self.total_paid => violations.push(format!(
                "total_paid {} does not match item sum {}",
                self.total_paid, paid_sum
            )),
            Ok(_) => {}
            Err(_) => violations.push("paid amounts overflow".to_string()),
        }
        let expected = LedgerStatus::derive(self.total_fee, self.total_paid);
        if self.status != expected {
            violations.push(format!("status {:?} should be {:?}", self.status, expected));
        }
        if self.items.windows(2).any(|pair| pair[0].kind > pair[1].kind) {
            violations.push("items are not grouped by kind".to_string());
        }
        violations
    }
}
