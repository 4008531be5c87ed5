//! # Money
//!
//! Two integer amount types, no floats anywhere on the money path:
//!
//! | type            | repr | resolution   | used for                          |
//! |-----------------|------|--------------|-----------------------------------|
//! | [`Money`]       | i64  | 1 cent       | every stored column, balances     |
//! | [`PreciseAmount`] | i128 | 1e-8 cent  | per-line tax math before rounding |
//!
//! Line results stay precise and are summed across the document; the
//! aggregate is rounded exactly once when the totals are stored.
//!
//! ```rust
//! use billbook_core::money::{Money, PreciseAmount};
//!
//! let line = Money::from_cents(10_000) * 3i64;
//! assert_eq!(line.percentage(1_800).cents(), 5_400);
//!
//! let third = PreciseAmount::from_units(PreciseAmount::UNITS_PER_CENT / 3);
//! assert_eq!((third + third + third).round().unwrap().cents(), 1);
//! ```
//!
//! Rounding into [`Money`] is checked: an aggregate outside the `i64` cent
//! range is a [`ValidationError::Overflow`], never a wrapped value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::BPS_PER_UNIT;

/// Signed amount in cents. Negative values are reversals and credits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[serde(transparent)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    #[inline]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// `bps` basis points of this amount, rounded half away from zero.
    /// Rates above 100% are treated as 100%.
    ///
    /// ```rust
    /// use billbook_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(106_200).percentage(1_000).cents(), 10_620);
    /// // 8.25% of 10.00 is 0.825
    /// assert_eq!(Money::from_cents(1_000).percentage(825).cents(), 83);
    /// ```
    pub fn percentage(&self, bps: u32) -> Money {
        let bps = i128::from(bps).min(i128::from(BPS_PER_UNIT));
        let scaled = i128::from(self.0) * bps;
        // |result| <= |self|
        Money(round_half_away(scaled, i128::from(BPS_PER_UNIT)) as i64)
    }
}

/// `numerator / denominator`, with an exact half rounding away from zero.
pub(crate) fn round_half_away(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator.abs() {
        quotient + numerator.signum() * denominator.signum()
    } else {
        quotient
    }
}

/// `1062.00`, `-5.50`. No currency symbol.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", cents / 100, cents % 100)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, quantity: i64) -> Self {
        Money(self.0 * quantity)
    }
}

/// Un-rounded amount at 1e-8 cent resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PreciseAmount(i128);

impl PreciseAmount {
    pub const UNITS_PER_CENT: i128 = 100_000_000;

    #[inline]
    pub const fn from_units(units: i128) -> Self {
        PreciseAmount(units)
    }

    #[inline]
    pub const fn from_money(money: Money) -> Self {
        PreciseAmount(money.0 as i128 * Self::UNITS_PER_CENT)
    }

    #[inline]
    pub const fn units(&self) -> i128 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        PreciseAmount(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn checked_add(self, rhs: PreciseAmount) -> Option<PreciseAmount> {
        self.0.checked_add(rhs.0).map(PreciseAmount)
    }

    /// Whole cents, half away from zero.
    pub fn round(&self) -> Result<Money, ValidationError> {
        let cents = round_half_away(self.0, Self::UNITS_PER_CENT);
        i64::try_from(cents)
            .map(Money)
            .map_err(|_| ValidationError::overflow("amount"))
    }
}

/// Additive group ops shared by both amount types.
macro_rules! amount_ops {
    ($ty:ident) => {
        impl Add for $ty {
            type Output = Self;

            #[inline]
            fn add(self, rhs: Self) -> Self {
                $ty(self.0 + rhs.0)
            }
        }

        impl AddAssign for $ty {
            #[inline]
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl Sub for $ty {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: Self) -> Self {
                $ty(self.0 - rhs.0)
            }
        }

        impl SubAssign for $ty {
            #[inline]
            fn sub_assign(&mut self, rhs: Self) {
                self.0 -= rhs.0;
            }
        }

        impl Neg for $ty {
            type Output = Self;

            #[inline]
            fn neg(self) -> Self {
                $ty(-self.0)
            }
        }

        impl Sum for $ty {
            fn sum<I: Iterator<Item = $ty>>(iter: I) -> Self {
                $ty(iter.map(|amount| amount.0).sum())
            }
        }
    };
}

amount_ops!(Money);
amount_ops!(PreciseAmount);
