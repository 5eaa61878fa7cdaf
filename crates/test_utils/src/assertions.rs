//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for ledger types that give
//! more meaningful error messages than standard assertions.

use core_kernel::Money;
use domain_ledger::{ChargeItemId, ItemStatus, LedgerAccount, LedgerStatus, Transaction};

/// Asserts that every item and ledger invariant holds
///
/// # Panics
///
/// Panics listing each violation found
pub fn assert_ledger_invariants(ledger: &LedgerAccount) {
    let violations = ledger.invariant_violations();
    assert!(
        violations.is_empty(),
        "Ledger {} violates invariants:\n  {}",
        ledger.key(),
        violations.join("\n  ")
    );
}

/// Asserts a Money value in minor units
pub fn assert_money_eq(actual: Money, expected_minor: i64) {
    assert_eq!(
        actual.minor(),
        expected_minor,
        "Money mismatch: actual={}, expected={}",
        actual,
        Money::from_minor(expected_minor)
    );
}

/// Asserts that parts sum to the total
pub fn assert_money_sum_equals(parts: &[Money], total: Money) {
    let sum: Money = parts.iter().copied().sum();
    assert_eq!(sum, total, "Sum of parts ({}) does not equal total ({})", sum, total);
}

/// Asserts an item's amount, paid amount and status
pub fn assert_item(
    ledger: &LedgerAccount,
    item_id: &str,
    amount: i64,
    paid: i64,
    status: ItemStatus,
) {
    let id = ChargeItemId::new(item_id);
    let item = ledger.item(&id).unwrap_or_else(|| {
        panic!(
            "Ledger {} has no item {}; items: {:?}",
            ledger.key(),
            item_id,
            ledger.items.iter().map(|i| i.id.as_str()).collect::<Vec<_>>()
        )
    });
    assert_eq!(item.amount.minor(), amount, "Item {} amount", item_id);
    assert_eq!(item.paid_amount.minor(), paid, "Item {} paid amount", item_id);
    assert_eq!(item.status, status, "Item {} status", item_id);
}

/// Asserts the ledger's totals and status
pub fn assert_ledger_totals(
    ledger: &LedgerAccount,
    total_fee: i64,
    total_paid: i64,
    status: LedgerStatus,
) {
    assert_eq!(ledger.total_fee.minor(), total_fee, "Ledger {} total_fee", ledger.key());
    assert_eq!(ledger.total_paid.minor(), total_paid, "Ledger {} total_paid", ledger.key());
    assert_eq!(ledger.status, status, "Ledger {} status", ledger.key());
}

/// Asserts the item ids, in ledger order
pub fn assert_item_order(ledger: &LedgerAccount, expected: &[&str]) {
    let actual: Vec<&str> = ledger.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(actual, expected, "Item order of ledger {}", ledger.key());
}

/// Asserts that a transaction's allocation lines add up to its amount
pub fn assert_allocation_balances(transaction: &Transaction) {
    let applied: Vec<Money> = transaction
        .allocation
        .iter()
        .map(|line| line.amount_applied)
        .collect();
    assert_money_sum_equals(&applied, transaction.amount);
}

/// Asserts that a result is Ok and returns the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

/// Asserts that a result is Err and returns the error
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        match $result {
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(value) => panic!("{}: got Ok({:?})", $msg, value),
            Err(e) => e,
        }
    };
}

/// Asserts that an error matches a specific variant
#[macro_export]
macro_rules! assert_err_variant {
    ($result:expr, $pattern:pat) => {
        match $result {
            Ok(value) => panic!("Expected Err matching {}, got Ok({:?})", stringify!($pattern), value),
            Err(ref e) => {
                assert!(
                    matches!(e, $pattern),
                    "Error {:?} does not match pattern {}",
                    e,
                    stringify!($pattern)
                );
            }
        }
    };
}
