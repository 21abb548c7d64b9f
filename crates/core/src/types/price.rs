//! Type-safe price representation using decimal arithmetic.
//!
//! The storefront sells in a single currency (New Taiwan dollars), so a price
//! is just a non-negative decimal amount. Negative amounts are rejected at
//! construction and on deserialization.

use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount was below zero.
    #[error("price cannot be negative (got {0})")]
    Negative(Decimal),
}

/// A non-negative monetary amount.
///
/// Serialized as a decimal string; deserializes from either a string or a
/// JSON number so documents written by older clients still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Zero dollars.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] if `amount` is below zero.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative(amount));
        }
        Ok(Self(amount))
    }

    /// Create a price from a whole number of dollars.
    #[must_use]
    pub fn from_whole(amount: u32) -> Self {
        Self(Decimal::from(amount))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units at this unit price.
    ///
    /// Saturates at `Decimal::MAX` rather than overflowing.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(Decimal::from(quantity)))
    }

    /// Format for display (e.g., `NT$45`).
    #[must_use]
    pub fn display(&self) -> String {
        format!("NT${}", self.0.normalize())
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_negative_rejected() {
        assert!(matches!(
            Price::new(Decimal::new(-1, 0)),
            Err(PriceError::Negative(_))
        ));
        assert!(Price::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_times_and_sum() {
        let total: Price = [Price::from_whole(50).times(2), Price::from_whole(30)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::from_whole(130));
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::from_whole(45).to_string(), "NT$45");
        assert_eq!(Price::new(Decimal::new(1250, 2)).unwrap().display(), "NT$12.5");
    }

    #[test]
    fn test_deserialize_from_number_or_string() {
        let from_number: Price = serde_json::from_str("45").unwrap();
        let from_string: Price = serde_json::from_str("\"45\"").unwrap();
        assert_eq!(from_number, from_string);
        assert!(serde_json::from_str::<Price>("-3").is_err());
    }

    #[test]
    fn test_arithmetic_saturates_at_max() {
        let max = Price::new(Decimal::MAX).unwrap();
        assert_eq!(max.times(3).amount(), Decimal::MAX);
        assert_eq!((max + Price::from_whole(1)).amount(), Decimal::MAX);
        assert_eq!(Price::from_whole(7).times(0), Price::ZERO);
    }
}
