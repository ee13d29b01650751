//! Price sources and payout conversion.
//!
//! A `Pricer` tracks one currency's exchange rate from several named
//! sources and answers with whichever source is currently authoritative.
//! The active source is switched by an operator or by the refresh loop's
//! failover; stage tasks only ever read it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::order::Currency;

/// Named price source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Manually set by an operator; the failover target.
    Internal,
    /// Fetched from an external exchange ticker.
    Exchange,
}

impl Source {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Exchange => "exchange",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(Self::Internal),
            "exchange" => Ok(Self::Exchange),
            other => Err(format!("invalid price source: {other}")),
        }
    }
}

/// One source's last known price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Price {
    /// Drop-currency base units per destination unit.
    pub amount: u64,
    pub updated_at: DateTime<Utc>,
}

/// Price as answered by `Pricer::get_price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub amount: u64,
    pub source: Source,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct PricerState {
    using: Source,
    sources: HashMap<Source, Price>,
}

/// Multi-source price tracker with an explicit active source.
#[derive(Debug)]
pub struct Pricer {
    state: RwLock<PricerState>,
}

impl Pricer {
    /// Create a pricer reading from `using`, with no prices set yet.
    pub fn new(using: Source) -> Self {
        Self {
            state: RwLock::new(PricerState {
                using,
                sources: HashMap::new(),
            }),
        }
    }

    /// Create a pricer on the internal source, seeded with `amount`.
    pub fn with_internal(amount: u64) -> Self {
        let mut sources = HashMap::new();
        sources.insert(
            Source::Internal,
            Price {
                amount,
                updated_at: Utc::now(),
            },
        );
        Self {
            state: RwLock::new(PricerState {
                using: Source::Internal,
                sources,
            }),
        }
    }

    /// Update one source's price and timestamp.
    pub async fn set_price(&self, source: Source, amount: u64) {
        let mut state = self.state.write().await;
        state.sources.insert(
            source,
            Price {
                amount,
                updated_at: Utc::now(),
            },
        );
    }

    /// Make `source` authoritative.
    pub async fn set_source(&self, source: Source) {
        self.state.write().await.using = source;
    }

    pub async fn get_source(&self) -> Source {
        self.state.read().await.using
    }

    /// Price of the active source, or `None` if that source was never set.
    pub async fn get_price(&self) -> Option<PriceQuote> {
        let state = self.state.read().await;
        state.sources.get(&state.using).map(|p| PriceQuote {
            amount: p.amount,
            source: state.using,
            updated_at: p.updated_at,
        })
    }

    /// Last price of a specific source, active or not.
    pub async fn source_price(&self, source: Source) -> Option<Price> {
        self.state.read().await.sources.get(&source).copied()
    }
}

// ────────────────────────────────────────────
// Conversion
// ────────────────────────────────────────────

/// Payouts are whole coins rounded down to 0.01.
const CENTS: Decimal = Decimal::ONE_HUNDRED;

/// Base units of `payout` in one hundredth of a coin.
pub const fn units_per_cent(payout: Currency) -> u64 {
    10u64.pow(payout.decimals() - 2)
}

/// Convert a deposit into the payout amount.
///
/// `price` is drop-currency base units per whole `payout` coin. The payout
/// is `floor(amount / price * 100)` cents of a coin, expressed in `payout`
/// base units. Returns `None` when the price is zero or the result does
/// not fit.
pub fn convert(amount: u64, price: u64, payout: Currency) -> Option<u64> {
    if price == 0 {
        return None;
    }
    let cents = (Decimal::from(amount) / Decimal::from(price) * CENTS).floor();
    cents.to_u64()?.checked_mul(units_per_cent(payout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_matches_reference_values() {
        // 1 BTC at 200000 sats/SKY is 500 SKY.
        assert_eq!(convert(100_000_000, 200_000, Currency::SKY), Some(500_000_000));
        // 100000 sats is half a SKY.
        assert_eq!(convert(100_000, 200_000, Currency::SKY), Some(500_000));
        // Below one cent rounds to zero.
        assert_eq!(convert(1_000, 200_000, Currency::SKY), Some(0));
        assert_eq!(convert(1_000, 0, Currency::SKY), None);
    }

    #[test]
    fn test_convert_scales_to_payout_decimals() {
        // 1e15 wei at 1e15 wei per BTC is exactly 1 BTC.
        let wei = 1_000_000_000_000_000;
        assert_eq!(convert(wei, wei, Currency::BTC), Some(100_000_000));
        // Half a SKY worth of sats paid out in ETH is 0.5 ETH.
        assert_eq!(
            convert(100_000, 200_000, Currency::ETH),
            Some(500_000_000_000_000_000)
        );
        // 40 ETH in wei does not fit a u64.
        assert_eq!(convert(40, 1, Currency::ETH), None);
        assert_eq!(units_per_cent(Currency::SKY), 10_000);
        assert_eq!(units_per_cent(Currency::BTC), 1_000_000);
    }

    #[tokio::test]
    async fn test_unset_source_has_no_price() {
        let pricer = Pricer::new(Source::Exchange);
        pricer.set_price(Source::Exchange, 100).await;
        pricer.set_source(Source::Internal).await;

        assert_eq!(pricer.get_source().await, Source::Internal);
        assert!(pricer.get_price().await.is_none());

        pricer.set_price(Source::Exchange, 500).await;
        assert_eq!(pricer.source_price(Source::Exchange).await.map(|p| p.amount), Some(500));

        pricer.set_price(Source::Internal, 20).await;
        let quote = pricer.get_price().await.unwrap();
        assert_eq!(quote.amount, 20);
        assert_eq!(quote.source, Source::Internal);
    }

    #[test]
    fn test_source_parse() {
        assert_eq!("exchange".parse::<Source>(), Ok(Source::Exchange));
        assert!("binance".parse::<Source>().is_err());
    }
}
