//! Identifier and value types shared by every storefront crate.
//!
//! Identifiers are thin newtypes over the database keys so that a `SkuId`
//! can never be passed where a `UserId` is expected. Money is kept as an
//! integer number of cents.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database key.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw database key.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

numeric_id!(
    /// Identity of an authenticated buyer.
    UserId
);
numeric_id!(
    /// Identity of a stock-keeping unit.
    SkuId
);
numeric_id!(
    /// Product family a SKU belongs to.
    GoodsId
);
numeric_id!(
    /// Category a SKU belongs to.
    CategoryId
);
numeric_id!(
    /// Identity of a delivery address.
    AddressId
);

/// Globally unique order identifier.
///
/// Produced by an order id generator in the runtime crate; see
/// `storefront_runtime::ids`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Wraps an already generated identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed-point currency amount in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units.
    ///
    /// Returns `None` on overflow.
    #[must_use]
    pub const fn checked_from_units(units: u64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents.
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts with overflow checking.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies a unit price by a count with overflow checking.
    #[must_use]
    pub const fn checked_times(self, count: u32) -> Option<Self> {
        match self.0.checked_mul(count as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies a unit price by a count, saturating.
    ///
    /// For display of amounts already bounded by a stored total; anything
    /// that gets persisted uses [`Money::checked_times`].
    #[must_use]
    pub const fn times(self, count: u32) -> Self {
        Self(self.0.saturating_mul(count as u64))
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_display_uses_two_decimals() {
        assert_eq!(Money::from_cents(1250).to_string(), "12.50");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn money_times_and_add() {
        let unit = Money::from_cents(350);
        let subtotal = unit.times(3);
        assert_eq!(subtotal.cents(), 1050);
        assert_eq!((subtotal + unit).cents(), 1400);
        assert_eq!(Money::checked_from_units(10), Some(Money::from_cents(1000)));
        assert_eq!(Money::from_cents(u64::MAX).checked_add(Money::from_cents(1)), None);
    }

    #[test]
    fn checked_times_refuses_overflow() {
        assert_eq!(Money::from_cents(350).checked_times(3), Some(Money::from_cents(1050)));
        assert_eq!(Money::from_cents(u64::MAX / 2).checked_times(3), None);
    }

    #[test]
    fn ids_parse_from_form_strings() {
        let sku: SkuId = " 42 ".parse().unwrap_or(SkuId::new(0));
        assert_eq!(sku, SkuId::new(42));
        assert!("abc".parse::<SkuId>().is_err());
    }
}
