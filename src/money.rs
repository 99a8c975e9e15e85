//! Fixed-point monetary amounts.

use std::{fmt::Display, ops::Neg};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

/// The number of fractional digits kept for every amount (the currency minor unit).
pub const MINOR_UNIT_DIGITS: u32 = 2;

/// The largest magnitude, in whole units, accepted for a single amount.
pub const MAX_AMOUNT_UNITS: i64 = 1_000_000_000_000_000;

/// A monetary amount with two fractional digits.
///
/// Amounts are serialized as decimal strings, e.g. `"50000.00"`, and stored
/// as TEXT so that no binary floating point is involved at any point.
/// Deserialization accepts JSON numbers as well as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(Decimal);

impl Money {
    /// Zero.
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Create an amount, rounding half away from zero to two fractional digits.
    pub fn new(value: Decimal) -> Self {
        let mut rounded =
            value.round_dp_with_strategy(MINOR_UNIT_DIGITS, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(MINOR_UNIT_DIGITS);

        Self(rounded)
    }

    /// The underlying decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whether the amount is strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Whether the amount is strictly less than zero.
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Whether the magnitude is at most [MAX_AMOUNT_UNITS].
    pub fn is_within_limit(&self) -> bool {
        self.0.abs() <= Decimal::from(MAX_AMOUNT_UNITS)
    }

    /// Check that the magnitude is at most [MAX_AMOUNT_UNITS].
    ///
    /// # Errors
    /// Returns [Error::InvalidInput] if the amount is too large.
    pub fn check_limit(self) -> Result<Money, Error> {
        if self.is_within_limit() {
            Ok(self)
        } else {
            Err(Error::InvalidInput(format!(
                "Amount must not be greater than {MAX_AMOUNT_UNITS}"
            )))
        }
    }

    /// Add `rhs`, returning `None` on overflow.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money::new)
    }

    /// Subtract `rhs`, returning `None` on overflow.
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money::new)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self::new(Decimal::from(value))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        <Decimal as Deserialize>::deserialize(deserializer).map(Money::new)
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;

        text.parse::<Decimal>()
            .map(Money::new)
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

/// Serialize a [Money] value as a JSON number for summary figures.
pub mod as_number {
    use rust_decimal::Decimal;
    use serde::Serializer;

    use super::Money;

    /// Serialize `money` as a float.
    pub fn serialize<S>(money: &Money, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value: Decimal = money.as_decimal();
        rust_decimal::serde::float::serialize(&value, serializer)
    }
}
