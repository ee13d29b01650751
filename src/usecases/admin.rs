//! Admin API - Operator Controls and Reports
//!
//! Pause/unpause, manual prices, price source selection, order lists
//! and retries of parked orders. Like the public API, these are plain
//! async operations with serde request/response types.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::errors::{CurrencyError, ModelError};
use crate::domain::order::{Currency, Order, Status, User};
use crate::domain::pricing::Source;
use crate::usecases::model::{ActorCounts, Model};

/// Which orders to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderFilter {
  All,
  /// Anything not yet `done`.
  Pending,
  /// Only `done`.
  Completed,
}

/// Price state of one deposit currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceStatus {
  pub currency: Currency,
  pub source: Source,
  pub internal: Option<u64>,
  pub internal_updated: Option<DateTime<Utc>>,
  pub exchange: Option<u64>,
  pub exchange_updated: Option<DateTime<Utc>>,
}

/// Connector holding, `None` if the node could not be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holding {
  pub currency: Currency,
  pub holding: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminStatus {
  pub paused: bool,
  pub prices: Vec<PriceStatus>,
  pub holdings: Vec<Holding>,
  pub counts: ActorCounts,
}

pub struct AdminApi {
  model: Arc<Model>,
}

impl AdminApi {
  pub const fn new(model: Arc<Model>) -> Self {
    Self { model }
  }

  pub fn pause(&self, pause: bool) {
    if pause {
      self.model.controller().pause();
    } else {
      self.model.controller().unpause();
    }
  }

  /// Set the internal price of a deposit currency.
  pub async fn set_price(&self, currency: Currency, amount: u64) -> Result<(), ModelError> {
    if amount == 0 {
      return Err(CurrencyError::ZeroAmount.into());
    }
    self
      .model
      .currencies()
      .pricer(currency)?
      .set_price(Source::Internal, amount)
      .await;
    info!(currency = %currency, amount, "Internal price set");
    Ok(())
  }

  /// Select the authoritative price source.
  pub async fn set_source(&self, currency: Currency, source: Source) -> Result<(), ModelError> {
    self.model.currencies().pricer(currency)?.set_source(source).await;
    info!(currency = %currency, source = %source, "Price source set");
    Ok(())
  }

  pub async fn status(&self) -> AdminStatus {
    let currencies = self.model.currencies();

    let mut prices = Vec::new();
    for (currency, pricer) in currencies.priced() {
      let internal = pricer.source_price(Source::Internal).await;
      let exchange = pricer.source_price(Source::Exchange).await;
      prices.push(PriceStatus {
        currency,
        source: pricer.get_source().await,
        internal: internal.map(|p| p.amount),
        internal_updated: internal.map(|p| p.updated_at),
        exchange: exchange.map(|p| p.amount),
        exchange_updated: exchange.map(|p| p.updated_at),
      });
    }

    let mut holdings = Vec::new();
    for currency in currencies.supported() {
      let holding = match currencies.holding(currency).await {
        Ok(h) => Some(h),
        Err(e) => {
          warn!(currency = %currency, error = %e, "Holding unavailable");
          None
        }
      };
      holdings.push(Holding { currency, holding });
    }

    AdminStatus {
      paused: self.model.controller().paused(),
      prices,
      holdings,
      counts: self.model.counts(),
    }
  }

  /// Orders matching `filter`, newest first.
  pub async fn orders(&self, filter: OrderFilter) -> Vec<Order> {
    let mut orders: Vec<Order> = self
      .model
      .orders()
      .await
      .into_iter()
      .filter(|o| match filter {
        OrderFilter::All => true,
        OrderFilter::Pending => o.status != Status::Done,
        OrderFilter::Completed => o.status == Status::Done,
      })
      .collect();
    orders.sort_by(|a, b| b.times.created_at.cmp(&a.times.created_at).then_with(|| a.id.cmp(&b.id)));
    orders
  }

  pub async fn users(&self) -> Vec<User> {
    self.model.users().await
  }

  /// Orders parked by a hard error.
  pub async fn parked(&self) -> Vec<Order> {
    let mut parked = Vec::new();
    for order in self.orders(OrderFilter::Pending).await {
      if order.last_error.is_some() && !self.is_live(&order.id).await {
        parked.push(order);
      }
    }
    parked
  }

  /// Re-route a parked order. `Ok(false)` if it was already live.
  pub async fn retry(&self, id: &str) -> Result<bool, ModelError> {
    self.model.retry(id).await
  }

  async fn is_live(&self, id: &str) -> bool {
    self.model.router().contains(id).await || self.model.workers().holder(id).await.is_some()
  }
}
