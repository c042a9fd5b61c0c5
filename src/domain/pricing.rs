//! Price derivation for every order kind.
//!
//! Rates are plain configuration; the premium table is fixed per period.

use super::money::Amount;
use super::order::{
    ExchangeDetails, OrderDetails, OrderKind, PremiumDetails, PremiumPeriod, Rail, StarsDetails,
};
use crate::error::ShopError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceList {
    /// Base currency per star.
    pub star_rate: Decimal,
    pub stars_min: u64,
    pub stars_max: u64,
    /// Base currency per unit of the exchange target currency.
    pub exchange_rate: Decimal,
    pub exchange_min: Decimal,
    pub exchange_max: Decimal,
    /// Base currency per unit of the crypto settlement asset.
    pub crypto_rate: Decimal,
    /// Whether exchange orders may be paid on the crypto rail.
    pub exchange_crypto: bool,
}

impl Default for PriceList {
    fn default() -> Self {
        Self {
            star_rate: dec!(1.5),
            stars_min: 50,
            stars_max: 1_000_000,
            exchange_rate: dec!(85.0),
            exchange_min: dec!(100),
            exchange_max: dec!(10000000),
            crypto_rate: dec!(85.0),
            exchange_crypto: true,
        }
    }
}

impl PriceList {
    pub fn validate(&self) -> Result<(), ShopError> {
        let rates = [
            ("star rate", self.star_rate),
            ("exchange rate", self.exchange_rate),
            ("crypto rate", self.crypto_rate),
        ];
        if let Some((name, _)) = rates.iter().find(|(_, rate)| *rate <= Decimal::ZERO) {
            return Err(ShopError::ConfigError(format!("{name} must be positive")));
        }
        if self.stars_min == 0 || self.stars_min > self.stars_max {
            return Err(ShopError::ConfigError(format!(
                "invalid star range {}..={}",
                self.stars_min, self.stars_max
            )));
        }
        if self.exchange_min <= Decimal::ZERO || self.exchange_min > self.exchange_max {
            return Err(ShopError::ConfigError(format!(
                "invalid exchange range {}..={}",
                self.exchange_min, self.exchange_max
            )));
        }
        Ok(())
    }

    pub fn premium_price(&self, period: PremiumPeriod) -> Decimal {
        match period {
            PremiumPeriod::ThreeMonths => dec!(1124.11),
            PremiumPeriod::SixMonths => dec!(1498.81),
            PremiumPeriod::OneYear => dec!(2716.59),
        }
    }

    pub fn quote_stars(&self, stars: u64) -> Result<OrderDetails, ShopError> {
        if !(self.stars_min..=self.stars_max).contains(&stars) {
            return Err(ShopError::ValidationError(format!(
                "Star quantity must be between {} and {}",
                self.stars_min, self.stars_max
            )));
        }
        Ok(OrderDetails::Stars(StarsDetails { stars }))
    }

    pub fn quote_premium(&self, period: PremiumPeriod) -> OrderDetails {
        OrderDetails::Premium(PremiumDetails { period })
    }

    pub fn quote_exchange(&self, amount_rub: Decimal) -> Result<OrderDetails, ShopError> {
        if amount_rub < self.exchange_min {
            return Err(ShopError::ValidationError(format!(
                "Minimum exchange amount is {}",
                self.exchange_min
            )));
        }
        if amount_rub > self.exchange_max {
            return Err(ShopError::ValidationError(format!(
                "Maximum exchange amount is {}",
                self.exchange_max
            )));
        }
        if amount_rub.normalize().scale() > 2 {
            return Err(ShopError::ValidationError(format!(
                "Exchange amount has more than 2 decimal places: {amount_rub}"
            )));
        }
        let amount_usd = Amount::new(amount_rub)?.convert(self.exchange_rate);
        Ok(OrderDetails::Exchange(ExchangeDetails {
            amount_rub,
            amount_usd,
        }))
    }

    /// Prices `details`, re-validating them so that a hand-built payload
    /// cannot disagree with its kind's rules.
    pub fn price(&self, details: &OrderDetails) -> Result<Amount, ShopError> {
        match details {
            OrderDetails::Stars(StarsDetails { stars }) => {
                self.quote_stars(*stars)?;
                Amount::new((Decimal::from(*stars) * self.star_rate).round_dp(2))
            }
            OrderDetails::Premium(PremiumDetails { period }) => {
                Amount::new(self.premium_price(*period))
            }
            OrderDetails::Exchange(exchange) => {
                if self.quote_exchange(exchange.amount_rub)? != *details {
                    return Err(ShopError::ValidationError(format!(
                        "Exchange target {} does not match {} at rate {}",
                        exchange.amount_usd, exchange.amount_rub, self.exchange_rate
                    )));
                }
                Amount::new(exchange.amount_rub)
            }
        }
    }

    /// Amount billed in the crypto settlement asset.
    pub fn settlement_amount(&self, amount: Amount) -> Decimal {
        amount.convert(self.crypto_rate)
    }

    pub fn offered_rails(&self, kind: OrderKind, crypto_enabled: bool) -> Vec<Rail> {
        let crypto = crypto_enabled && (kind != OrderKind::Exchange || self.exchange_crypto);
        if crypto {
            vec![Rail::Card, Rail::Crypto]
        } else {
            vec![Rail::Card]
        }
    }
}
