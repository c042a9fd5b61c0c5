use crate::error::ShopError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// A price in the store's base currency.
///
/// Wraps `rust_decimal::Decimal` so that an order can never carry a zero or
/// negative amount. Fixed when the order is created and never recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, ShopError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(ShopError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Converts into another currency at `rate` base units per target unit,
    /// rounded to cents.
    pub fn convert(&self, rate: Decimal) -> Decimal {
        let mut converted = (self.0 / rate).round_dp(2);
        converted.rescale(2);
        converted
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ShopError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Sum<Amount> for Decimal {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Decimal::ZERO, |acc, amount| acc + amount.0)
    }
}
