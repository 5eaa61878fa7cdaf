//! Money in integer minor units
//!
//! The ledger works in exactly one currency. Every amount is a signed count
//! of the smallest currency unit (e.g. paise, cents), so sums and comparisons
//! are exact. Decimal major-unit values only appear at the edges (display,
//! configuration input) and go through `rust_decimal`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use thiserror::Error;

/// Number of minor units per major unit (2 decimal places)
pub const MINOR_UNIT_SCALE: u32 = 2;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount in minor units
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Creates Money from an integer amount in minor units
    pub const fn from_minor(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Converts a decimal major-unit amount (e.g. `50.25`) to minor units
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::InvalidAmount` if the value has more precision
    /// than the minor unit allows, or `Overflow` if it does not fit.
    pub fn from_major(amount: Decimal) -> Result<Self, MoneyError> {
        let scaled = amount * Decimal::from(10_i64.pow(MINOR_UNIT_SCALE));
        if scaled.fract() != Decimal::ZERO {
            return Err(MoneyError::InvalidAmount(format!(
                "{} has more than {} decimal places",
                amount, MINOR_UNIT_SCALE
            )));
        }
        scaled.to_i64().map(Self).ok_or(MoneyError::Overflow)
    }

    /// Returns the amount in minor units
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the amount in major units
    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.0, MINOR_UNIT_SCALE)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition
    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyError> {
        self.0.checked_add(other.0).map(Self).ok_or(MoneyError::Overflow)
    }

    /// Checked subtraction
    pub fn checked_sub(&self, other: Money) -> Result<Money, MoneyError> {
        self.0.checked_sub(other.0).map(Self).ok_or(MoneyError::Overflow)
    }

    /// Sums every amount, failing instead of wrapping
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Result<Money, MoneyError> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
    }

    /// Subtraction clamped at zero
    pub fn saturating_sub_floor(&self, other: Money) -> Money {
        Self((self.0.saturating_sub(other.0)).max(0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.to_major())
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn major_minor_conversion_is_lossless(minor in -1_000_000_000i64..1_000_000_000i64) {
            let money = Money::from_minor(minor);
            prop_assert_eq!(Money::from_major(money.to_major()).unwrap(), money);
        }

        #[test]
        fn sum_matches_fold(values in proptest::collection::vec(0i64..1_000_000i64, 0..50)) {
            let total: Money = values.iter().map(|v| Money::from_minor(*v)).sum();
            prop_assert_eq!(total.minor(), values.iter().sum::<i64>());
        }
    }
}
