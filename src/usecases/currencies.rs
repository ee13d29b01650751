//! Currencies - Connector and Pricer Registry
//!
//! Maps each supported currency to its node connector and, for
//! currencies accepted as deposits, to a `Pricer`. Built once at
//! startup and then shared read-only (behind an `Arc`) by every actor.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::errors::{CurrencyError, StageError};
use crate::domain::order::{Currency, DropAddress, Rate};
use crate::domain::pricing::{self, PriceQuote, Pricer};
use crate::ports::connector::CurrencyConnector;

/// Registry of connectors and prices, keyed by currency.
#[derive(Default)]
pub struct Currencies {
  connectors: HashMap<Currency, Arc<dyn CurrencyConnector>>,
  prices: HashMap<Currency, Arc<Pricer>>,
}

impl Currencies {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register the connector for `currency`. Each currency has one.
  pub fn add(
    &mut self,
    currency: Currency,
    connector: Arc<dyn CurrencyConnector>,
  ) -> Result<(), CurrencyError> {
    if self.connectors.contains_key(&currency) {
      return Err(CurrencyError::ConnectionExists(currency));
    }
    self.connectors.insert(currency, connector);
    Ok(())
  }

  /// Register the pricer for deposits made in `currency`.
  pub fn add_pricer(&mut self, currency: Currency, pricer: Arc<Pricer>) {
    self.prices.insert(currency, pricer);
  }

  pub fn connector(
    &self,
    currency: Currency,
  ) -> Result<&Arc<dyn CurrencyConnector>, CurrencyError> {
    self
      .connectors
      .get(&currency)
      .ok_or(CurrencyError::ConnectionMissing(currency))
  }

  pub fn pricer(&self, currency: Currency) -> Result<&Arc<Pricer>, CurrencyError> {
    self
      .prices
      .get(&currency)
      .ok_or(CurrencyError::PriceMissing(currency))
  }

  /// Currencies with a registered connector, sorted.
  pub fn supported(&self) -> Vec<Currency> {
    let mut all: Vec<Currency> = self.connectors.keys().copied().collect();
    all.sort();
    all
  }

  /// Currencies with a registered pricer, sorted.
  pub fn priced(&self) -> Vec<(Currency, Arc<Pricer>)> {
    let mut all: Vec<(Currency, Arc<Pricer>)> = self
      .prices
      .iter()
      .map(|(c, p)| (*c, Arc::clone(p)))
      .collect();
    all.sort_by_key(|(c, _)| *c);
    all
  }

  /// Current balance of a drop address.
  pub async fn balance(&self, drop: &DropAddress) -> Result<u64, StageError> {
    let connector = self.connector(drop.currency)?;
    Ok(connector.balance(&drop.address).await?)
  }

  /// Payout in `payout` base units for `amount` deposited in `currency`,
  /// with the rate used.
  pub async fn value(
    &self,
    currency: Currency,
    payout: Currency,
    amount: u64,
  ) -> Result<(u64, Rate), CurrencyError> {
    let pricer = self.pricer(currency)?;
    if amount == 0 {
      return Err(CurrencyError::ZeroAmount);
    }

    let quote = pricer
      .get_price()
      .await
      .ok_or(CurrencyError::PriceMissing(currency))?;

    match pricing::convert(amount, quote.amount, payout) {
      None if quote.amount == 0 => Err(CurrencyError::PriceMissing(currency)),
      None | Some(0) => Err(CurrencyError::ZeroAmount),
      Some(value) => Ok((
        value,
        Rate {
          value: quote.amount,
          source: quote.source.to_string(),
        },
      )),
    }
  }

  /// Send `amount` of `currency` to `address`.
  pub async fn send(
    &self,
    currency: Currency,
    address: &str,
    amount: u64,
  ) -> Result<String, StageError> {
    let connector = self.connector(currency)?;
    if amount == 0 {
      return Err(CurrencyError::ZeroAmount.into());
    }
    Ok(connector.send(address, amount).await?)
  }

  pub async fn confirmed(&self, currency: Currency, txid: &str) -> Result<bool, StageError> {
    let connector = self.connector(currency)?;
    Ok(connector.confirmed(txid).await?)
  }

  /// Allocate a new drop address.
  pub async fn address(&self, currency: Currency) -> Result<String, StageError> {
    let connector = self.connector(currency)?;
    Ok(connector.address().await?)
  }

  pub async fn holding(&self, currency: Currency) -> Result<u64, StageError> {
    let connector = self.connector(currency)?;
    Ok(connector.holding().await?)
  }

  /// Active price for deposits in `currency`.
  pub async fn price(&self, currency: Currency) -> Result<PriceQuote, CurrencyError> {
    self
      .pricer(currency)?
      .get_price()
      .await
      .ok_or(CurrencyError::PriceMissing(currency))
  }

  /// Stop every connector, logging failures.
  pub async fn stop_all(&self) {
    for currency in self.supported() {
      if let Ok(connector) = self.connector(currency) {
        match connector.stop().await {
          Ok(()) => info!(currency = %currency, "Connector stopped"),
          Err(e) => warn!(currency = %currency, error = %e, "Connector stop failed"),
        }
      }
    }
  }
}
