//! Runtime configuration, read from flags or the environment.

use crate::domain::customer::CustomerId;
use crate::domain::pricing::PriceList;
use crate::error::Result;
use clap::{ArgAction, Args};
use rust_decimal::Decimal;

#[derive(Args, Debug, Clone)]
pub struct ShopConfig {
    /// Chat ids allowed to run operator commands.
    #[arg(long = "operator", env = "OPERATOR_IDS", value_delimiter = ',')]
    pub operators: Vec<i64>,

    #[command(flatten)]
    pub crypto: CryptoPayConfig,

    #[command(flatten)]
    pub prices: PriceConfig,
}

impl ShopConfig {
    pub fn operator_ids(&self) -> Vec<CustomerId> {
        self.operators.iter().copied().map(CustomerId).collect()
    }
}

#[derive(Args, Debug, Clone)]
pub struct CryptoPayConfig {
    /// API token; the crypto rail is disabled without one.
    #[arg(long, env = "CRYPTO_PAY_TOKEN", hide_env_values = true)]
    pub crypto_pay_token: Option<String>,

    #[arg(long, env = "CRYPTO_PAY_URL", default_value = "https://pay.crypt.bot/api")]
    pub crypto_pay_url: String,

    #[arg(long, env = "CRYPTO_PAY_TIMEOUT_SECS", default_value_t = 30)]
    pub crypto_pay_timeout_secs: u64,

    /// Button URL the provider shows once an invoice is paid.
    #[arg(long, env = "CRYPTO_PAY_PAID_URL")]
    pub crypto_pay_paid_url: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PriceConfig {
    #[arg(long, env = "STAR_RATE", default_value = "1.5")]
    pub star_rate: Decimal,

    /// Base currency per unit of the exchange target currency.
    #[arg(long, env = "USD_RATE", default_value = "85.0")]
    pub usd_rate: Decimal,

    /// Base currency per unit of the crypto settlement asset.
    #[arg(long, env = "CRYPTO_RATE", default_value = "85.0")]
    pub crypto_rate: Decimal,

    #[arg(long, env = "STARS_MIN", default_value_t = 50)]
    pub stars_min: u64,

    #[arg(long, env = "STARS_MAX", default_value_t = 1_000_000)]
    pub stars_max: u64,

    #[arg(long, env = "EXCHANGE_MIN", default_value = "100")]
    pub exchange_min: Decimal,

    #[arg(long, env = "EXCHANGE_MAX", default_value = "10000000")]
    pub exchange_max: Decimal,

    #[arg(long, env = "EXCHANGE_CRYPTO", default_value_t = true, action = ArgAction::Set)]
    pub exchange_crypto: bool,
}

impl PriceConfig {
    pub fn price_list(&self) -> Result<PriceList> {
        let prices = PriceList {
            star_rate: self.star_rate,
            stars_min: self.stars_min,
            stars_max: self.stars_max,
            exchange_rate: self.usd_rate,
            exchange_min: self.exchange_min,
            exchange_max: self.exchange_max,
            crypto_rate: self.crypto_rate,
            exchange_crypto: self.exchange_crypto,
        };
        prices.validate()?;
        Ok(prices)
    }
}
