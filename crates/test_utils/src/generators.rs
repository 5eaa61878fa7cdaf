//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains ledger invariants.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;

use core_kernel::{ClassId, FeeId, Money, StudentId, TermId, VillageId, YearId};
use domain_ledger::{
    ChargeItem, ChargeItemId, ChargeKind, CustomFee, FeeCatalog, FeeTarget, LedgerAccount,
    LedgerKey, PaymentMethod, Student, TermFee, TransportTable,
};

const CLASSES: &[&str] = &["C1", "C2", "C3"];
const VILLAGES: &[&str] = &["V1", "V2", "V3"];

/// Strategy for item amounts in minor units, zero included
pub fn amount_minor_strategy() -> impl Strategy<Value = i64> {
    0i64..2_000_000i64
}

/// Strategy for strictly positive amounts in minor units
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..2_000_000i64
}

/// Strategy for positive Money values
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    positive_amount_minor_strategy().prop_map(Money::from_minor)
}

/// Strategy for payment methods
pub fn payment_method_strategy() -> impl Strategy<Value = PaymentMethod> {
    prop_oneof![
        Just(PaymentMethod::Cash),
        Just(PaymentMethod::BankTransfer),
        Just(PaymentMethod::Card),
        Just(PaymentMethod::Online),
        Just(PaymentMethod::Cheque),
    ]
}

/// Strategy for timestamps within the 2024 school year
pub fn timestamp_2024_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..365 * 24 * 60).prop_map(|minutes| {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    })
}

pub fn class_id_strategy() -> impl Strategy<Value = ClassId> {
    prop::sample::select(CLASSES).prop_map(ClassId::new)
}

pub fn village_id_strategy() -> impl Strategy<Value = VillageId> {
    prop::sample::select(VILLAGES).prop_map(VillageId::new)
}

pub fn student_id_strategy() -> impl Strategy<Value = StudentId> {
    (1usize..500).prop_map(|n| StudentId::new(format!("STU-{:04}", n)))
}

/// Strategy for students; all are assigned a class
pub fn student_strategy() -> impl Strategy<Value = Student> {
    (
        student_id_strategy(),
        class_id_strategy(),
        prop::option::of(village_id_strategy()),
        any::<bool>(),
        prop::bool::weighted(0.9),
    )
        .prop_map(|(id, class_id, village_id, uses_transport, is_active)| Student {
            name: format!("Student {}", id),
            id,
            class_id: Some(class_id),
            village_id,
            uses_transport,
            is_active,
        })
}

/// Strategy for one charge item with a consistent paid amount
pub fn charge_item_strategy() -> impl Strategy<Value = ChargeItem> {
    (
        prop_oneof![
            Just(ChargeKind::Term),
            Just(ChargeKind::Custom),
            Just(ChargeKind::Transport)
        ],
        1u32..1000,
        amount_minor_strategy(),
        0u32..=100,
    )
        .prop_map(|(kind, n, amount, paid_pct)| {
            let id = match kind {
                ChargeKind::Term => ChargeItemId::term(&TermId::new(format!("T{}", n))),
                ChargeKind::Custom => ChargeItemId::custom(&FeeId::new(format!("F{}", n))),
                ChargeKind::Transport => ChargeItemId::transport(),
            };
            let mut item = ChargeItem::new(id.clone(), kind, id.as_str(), None, Money::from_minor(amount));
            item.paid_amount = Money::from_minor(amount * i64::from(paid_pct) / 100);
            item.refresh_status();
            item
        })
}

/// Strategy for ledgers that satisfy every invariant
pub fn ledger_strategy() -> impl Strategy<Value = LedgerAccount> {
    (student_id_strategy(), prop::collection::vec(charge_item_strategy(), 0..8)).prop_map(
        |(student_id, items)| {
            let mut ledger = LedgerAccount::new(
                LedgerKey::new(student_id, YearId::new("2024-25")),
                Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
            );
            for item in items {
                if ledger.contains_item(&item.id) {
                    continue;
                }
                ledger.total_paid += item.paid_amount;
                ledger
                    .insert_item(item)
                    .expect("generated amounts fit in Money");
            }
            ledger
        },
    )
}

fn price_table_strategy<K: Ord + Clone + std::fmt::Debug + 'static>(
    keys: impl Strategy<Value = K>,
) -> impl Strategy<Value = BTreeMap<K, Money>> {
    prop::collection::btree_map(keys, amount_minor_strategy().prop_map(Money::from_minor), 0..3)
}

/// Strategy for valid catalogs of the 2024-25 year
pub fn catalog_strategy() -> impl Strategy<Value = FeeCatalog> {
    let term = (1u32..6, price_table_strategy(class_id_strategy()), any::<bool>()).prop_map(
        |(n, amounts, is_active)| TermFee {
            id: TermId::new(format!("T{}", n)),
            name: format!("Term {}", n),
            due_date: None,
            amounts,
            is_active,
        },
    );
    let custom = (
        1u32..6,
        positive_amount_minor_strategy(),
        prop::collection::vec(class_id_strategy(), 1..3),
        any::<bool>(),
    )
        .prop_map(|(n, amount, classes, is_active)| CustomFee {
            id: FeeId::new(format!("F{}", n)),
            name: format!("Fee {}", n),
            amount: Money::from_minor(amount),
            due_date: None,
            target: FeeTarget::Classes(classes),
            is_active,
        });

    (
        prop::collection::vec(term, 0..4),
        prop::collection::vec(custom, 0..3),
        price_table_strategy(village_id_strategy()),
    )
        .prop_map(|(terms, custom_fees, transport)| {
            let mut catalog = FeeCatalog::new(YearId::new("2024-25"));
            for term in terms {
                if !catalog.terms.iter().any(|t| t.id == term.id) {
                    catalog.terms.push(term);
                }
            }
            for fee in custom_fees {
                if !catalog.custom_fees.iter().any(|f| f.id == fee.id) {
                    catalog.custom_fees.push(fee);
                }
            }
            catalog.transport = TransportTable {
                due_date: None,
                amounts: transport,
            };
            catalog
        })
}
