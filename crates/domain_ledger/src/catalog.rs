//! Fee catalog and candidate resolution
//!
//! The catalog (term fees, custom fees, transport table) and the student
//! records are owned by the master-data system. This module only reads them
//! and answers one question: which charge items should this student carry?

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use core_kernel::{ClassId, FeeId, Money, StudentId, TermId, VillageId, YearId};

use crate::account::{ChargeItem, ChargeItemId, ChargeKind, TRANSPORT_ITEM_NAME};
use crate::error::LedgerError;

fn default_active() -> bool {
    true
}

/// A student as seen by the fee engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub class_id: Option<ClassId>,
    pub village_id: Option<VillageId>,
    #[serde(default)]
    pub uses_transport: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl Student {
    /// Returns the student's class, or a validation error when it is missing
    pub fn validate(&self) -> Result<&ClassId, LedgerError> {
        match &self.class_id {
            Some(class_id) if !class_id.is_blank() => Ok(class_id),
            _ => Err(LedgerError::validation(format!(
                "student {} has no class assigned",
                self.id
            ))),
        }
    }
}

/// A per-class tuition fee for one term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermFee {
    pub id: TermId,
    pub name: String,
    pub due_date: Option<NaiveDate>,
    /// Amount per class; classes not listed owe nothing for this term
    #[serde(default)]
    pub amounts: BTreeMap<ClassId, Money>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl TermFee {
    pub fn amount_for(&self, class_id: &ClassId) -> Money {
        self.amounts.get(class_id).copied().unwrap_or(Money::ZERO)
    }
}

/// Who a custom fee applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "ids", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeTarget {
    Classes(Vec<ClassId>),
    Villages(Vec<VillageId>),
    Students(Vec<StudentId>),
}

impl FeeTarget {
    pub fn includes(&self, student: &Student) -> bool {
        match self {
            FeeTarget::Classes(ids) => student
                .class_id
                .as_ref()
                .map_or(false, |class_id| ids.contains(class_id)),
            FeeTarget::Villages(ids) => student
                .village_id
                .as_ref()
                .map_or(false, |village_id| ids.contains(village_id)),
            FeeTarget::Students(ids) => ids.contains(&student.id),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FeeTarget::Classes(ids) => ids.is_empty(),
            FeeTarget::Villages(ids) => ids.is_empty(),
            FeeTarget::Students(ids) => ids.is_empty(),
        }
    }
}

/// An ad-hoc fee for a subset of students
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFee {
    pub id: FeeId,
    pub name: String,
    pub amount: Money,
    pub due_date: Option<NaiveDate>,
    pub target: FeeTarget,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl CustomFee {
    /// True if the fee is active and targets the student
    pub fn applies_to(&self, student: &Student) -> bool {
        self.is_active && self.target.includes(student)
    }

    /// Checks the fee definition itself, regardless of whether it is active
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.id.is_blank() {
            return Err(LedgerError::validation("custom fee id is empty"));
        }
        if self.amount.is_negative() {
            return Err(LedgerError::validation(format!(
                "custom fee {} has a negative amount",
                self.id
            )));
        }
        if self.target.is_empty() {
            return Err(LedgerError::validation(format!(
                "custom fee {} has an empty target list",
                self.id
            )));
        }
        Ok(())
    }

    pub fn item_id(&self) -> ChargeItemId {
        ChargeItemId::custom(&self.id)
    }

    /// A fresh, unpaid ledger item for this fee
    pub fn to_item(&self) -> ChargeItem {
        ChargeItem::new(
            self.item_id(),
            ChargeKind::Custom,
            self.name.clone(),
            self.due_date,
            self.amount,
        )
    }
}

/// Per-village transport pricing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportTable {
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub amounts: BTreeMap<VillageId, Money>,
}

impl TransportTable {
    pub fn amount_for(&self, village_id: &VillageId) -> Money {
        self.amounts.get(village_id).copied().unwrap_or(Money::ZERO)
    }
}

/// Everything chargeable in one academic year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCatalog {
    pub year_id: YearId,
    #[serde(default)]
    pub terms: Vec<TermFee>,
    #[serde(default)]
    pub custom_fees: Vec<CustomFee>,
    #[serde(default)]
    pub transport: TransportTable,
}

impl FeeCatalog {
    pub fn new(year_id: YearId) -> Self {
        Self {
            year_id,
            terms: Vec::new(),
            custom_fees: Vec::new(),
            transport: TransportTable::default(),
        }
    }

    /// Rejects negative amounts, duplicate ids and custom fees without targets
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut term_ids = HashSet::new();
        for term in &self.terms {
            if !term_ids.insert(&term.id) {
                return Err(LedgerError::validation(format!(
                    "duplicate term id {} in catalog {}",
                    term.id, self.year_id
                )));
            }
            if let Some((class_id, _)) = term.amounts.iter().find(|(_, a)| a.is_negative()) {
                return Err(LedgerError::validation(format!(
                    "term {} has a negative amount for class {}",
                    term.id, class_id
                )));
            }
        }

        let mut fee_ids = HashSet::new();
        for fee in &self.custom_fees {
            if !fee_ids.insert(&fee.id) {
                return Err(LedgerError::validation(format!(
                    "duplicate custom fee id {} in catalog {}",
                    fee.id, self.year_id
                )));
            }
            fee.validate()?;
        }

        if let Some((village_id, _)) = self
            .transport
            .amounts
            .iter()
            .find(|(_, amount)| amount.is_negative())
        {
            return Err(LedgerError::validation(format!(
                "transport table has a negative amount for village {}",
                village_id
            )));
        }
        Ok(())
    }
}

/// A charge the catalog says a student should carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeCandidate {
    pub id: ChargeItemId,
    pub kind: ChargeKind,
    pub name: String,
    pub due_date: Option<NaiveDate>,
    pub amount: Money,
}

impl ChargeCandidate {
    pub fn into_item(self) -> ChargeItem {
        ChargeItem::new(self.id, self.kind, self.name, self.due_date, self.amount)
    }
}

/// Computes the charges a student should carry under `catalog`.
///
/// Output order is terms, then custom fees (each in catalog order), then
/// transport. A student without a class gets no term charges; callers reject
/// such students with [`Student::validate`] first.
pub fn resolve_candidates(student: &Student, catalog: &FeeCatalog) -> Vec<ChargeCandidate> {
    let mut candidates = Vec::new();

    if let Some(class_id) = &student.class_id {
        for term in catalog.terms.iter().filter(|term| term.is_active) {
            let amount = term.amount_for(class_id);
            if amount.is_positive() {
                candidates.push(ChargeCandidate {
                    id: ChargeItemId::term(&term.id),
                    kind: ChargeKind::Term,
                    name: term.name.clone(),
                    due_date: term.due_date,
                    amount,
                });
            }
        }
    }

    for fee in catalog.custom_fees.iter().filter(|fee| fee.applies_to(student)) {
        candidates.push(ChargeCandidate {
            id: fee.item_id(),
            kind: ChargeKind::Custom,
            name: fee.name.clone(),
            due_date: fee.due_date,
            amount: fee.amount,
        });
    }

    if student.uses_transport {
        if let Some(village_id) = &student.village_id {
            let amount = catalog.transport.amount_for(village_id);
            if amount.is_positive() {
                candidates.push(ChargeCandidate {
                    id: ChargeItemId::transport(),
                    kind: ChargeKind::Transport,
                    name: TRANSPORT_ITEM_NAME.to_string(),
                    due_date: catalog.transport.due_date,
                    amount,
                });
            }
        }
    }

    candidates
}
