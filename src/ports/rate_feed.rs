//! Rate Feed Port - External Exchange Price Interface
//!
//! Supplies the EXCHANGE price source. A failed fetch is the signal
//! for the price refresher to fail over to the INTERNAL source.

use async_trait::async_trait;

use crate::domain::order::Currency;

/// Trait for external exchange-rate providers.
#[async_trait]
pub trait RateFeed: Send + Sync + 'static {
  /// Price of one destination coin, in `currency` base units.
  async fn fetch_rate(&self, currency: Currency) -> anyhow::Result<u64>;

  /// Human-readable feed name for logs.
  fn name(&self) -> &str;
}
