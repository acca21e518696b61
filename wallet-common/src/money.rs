//! Fixed-precision decimal amounts.
//!
//! Every balance and transaction amount in the system is a `rust_decimal::Decimal`
//! scaled to 4 fractional digits. `Money` is the boundary type: it owns the parsing
//! and validation rules so that both the HTTP layer and any future non-HTTP
//! caller see identical amount semantics.

use rust_decimal::prelude::*;
use rust_decimal::RoundingStrategy;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const WALLET_SCALE: u32 = 4;
pub const MIN_OPERATION_AMOUNT: &str = "0.01";
pub const MAX_OPERATION_AMOUNT: &str = "1000000.00";

#[derive(Debug, thiserror::Error)]
pub enum MoneyError {
    #[error("amount is not a valid decimal")]
    Malformed,
    #[error("scientific notation is not accepted for amounts")]
    ScientificNotation,
    #[error("amount must be positive")]
    NotPositive,
    #[error("amount below minimum of {MIN_OPERATION_AMOUNT}")]
    BelowMinimum,
    #[error("amount above maximum of {MAX_OPERATION_AMOUNT}")]
    AboveMaximum,
}

/// A validated, positive, wallet-scale amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(Decimal);

impl Money {
    pub fn parse(raw: &str) -> Result<Self, MoneyError> {
        if raw.contains(['e', 'E']) {
            return Err(MoneyError::ScientificNotation);
        }
        let value = Decimal::from_str(raw.trim()).map_err(|_| MoneyError::Malformed)?;
        Self::from_decimal(value)
    }

    /// Round half-even to wallet scale and validate range. Used for amounts that
    /// already arrived as a `Decimal` (e.g. read back from the database).
    pub fn from_decimal(value: Decimal) -> Result<Self, MoneyError> {
        if value <= Decimal::ZERO {
            return Err(MoneyError::NotPositive);
        }
        let rounded = value.round_dp_with_strategy(WALLET_SCALE, RoundingStrategy::MidpointNearestEven);
        let min = Decimal::from_str(MIN_OPERATION_AMOUNT).unwrap();
        let max = Decimal::from_str(MAX_OPERATION_AMOUNT).unwrap();
        if rounded < min {
            return Err(MoneyError::BelowMinimum);
        }
        if rounded > max {
            return Err(MoneyError::AboveMaximum);
        }
        Ok(Money(rounded))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Money::parse(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_plain_decimal() {
        assert_eq!(Money::parse("100.00").unwrap().as_decimal(), dec!(100.00));
    }

    #[test]
    fn rejects_scientific_notation() {
        assert!(matches!(Money::parse("1e2"), Err(MoneyError::ScientificNotation)));
    }

    #[test]
    fn rejects_non_positive() {
        assert!(matches!(Money::parse("0"), Err(MoneyError::NotPositive)));
        assert!(matches!(Money::parse("-5.00"), Err(MoneyError::NotPositive)));
    }

    #[test]
    fn rejects_below_minimum() {
        assert!(matches!(Money::parse("0.001"), Err(MoneyError::BelowMinimum)));
    }

    #[test]
    fn rejects_above_maximum() {
        assert!(matches!(Money::parse("1000000.01"), Err(MoneyError::AboveMaximum)));
    }

    #[test]
    fn rounds_half_even() {
        // 100.00005 rounds to 100.0000 (nearest even at the 4th digit: 0 stays 0)
        let m = Money::from_decimal(dec!(100.00005)).unwrap();
        assert_eq!(m.as_decimal(), dec!(100.0000));
    }
}
