//! Public API - Bind and Status Operations
//!
//! The user-facing surface: bind a payout address to a freshly
//! allocated drop address, then poll the order's status by drop.
//! Request and response types are serde structs; transport is left to
//! whoever mounts them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::domain::errors::ModelError;
use crate::domain::order::{Currency, Destination, DropAddress, Order, Status};
use crate::usecases::model::Model;

#[derive(Debug, Clone, Deserialize)]
pub struct BindRequest {
  /// Payout address.
  pub address: String,
  pub drop_currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindResponse {
  pub drop_address: String,
  pub drop_currency: Currency,
  /// Active price in drop base units per payout coin.
  pub drop_value: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusRequest {
  pub drop_address: String,
  pub drop_currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
  pub status: Status,
  pub updated_at: i64,
}

/// Service summary shown to users before they bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
  /// `WORKING` or `PAUSED`.
  pub otc_status: &'static str,
  /// Payout wallet holding, in payout base units.
  pub balance: u64,
  pub prices: Vec<CurrencyPrice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrencyPrice {
  pub currency: Currency,
  pub price: u64,
}

pub struct PublicApi {
  model: Arc<Model>,
  payout: Currency,
}

impl PublicApi {
  pub const fn new(model: Arc<Model>, payout: Currency) -> Self {
    Self { model, payout }
  }

  /// Allocate a drop address for `req.address` and start tracking it.
  #[instrument(skip(self), fields(drop_currency = %req.drop_currency))]
  pub async fn bind(&self, req: &BindRequest) -> Result<BindResponse, ModelError> {
    if self.model.controller().paused() {
      return Err(ModelError::Paused);
    }

    let currencies = self.model.currencies();
    let drop_currency: Currency = req
      .drop_currency
      .parse()
      .map_err(|_| ModelError::Unsupported(req.drop_currency.clone()))?;
    if currencies.pricer(drop_currency).is_err() || currencies.connector(drop_currency).is_err() {
      return Err(ModelError::Unsupported(req.drop_currency.clone()));
    }

    if !is_valid_address(self.payout, &req.address) {
      return Err(ModelError::InvalidAddress(req.address.clone()));
    }

    let price = currencies.price(drop_currency).await?;
    let drop_address = currencies.address(drop_currency).await?;

    let order = Order::new(
      DropAddress {
        address: drop_address.clone(),
        currency: drop_currency,
      },
      Destination {
        address: req.address.clone(),
        currency: self.payout,
      },
    );
    self.model.add(order).await?;

    info!(drop = %drop_address, price = price.amount, source = %price.source, "Address bound");
    Ok(BindResponse {
      drop_address,
      drop_currency,
      drop_value: price.amount,
    })
  }

  /// Status of the order bound to a drop address.
  pub async fn status(&self, req: &StatusRequest) -> Result<StatusResponse, ModelError> {
    let currency: Currency = req
      .drop_currency
      .parse()
      .map_err(|_| ModelError::Unsupported(req.drop_currency.clone()))?;
    let (status, updated_at) = self.model.status_by_drop(currency, &req.drop_address).await?;
    Ok(StatusResponse { status, updated_at })
  }

  /// Paused flag, payout holding and deposit prices.
  pub async fn info(&self) -> Result<ServiceInfo, ModelError> {
    let currencies = self.model.currencies();
    let balance = currencies.holding(self.payout).await?;

    let mut prices = Vec::new();
    for (currency, pricer) in currencies.priced() {
      match pricer.get_price().await {
        Some(quote) => prices.push(CurrencyPrice {
          currency,
          price: quote.amount,
        }),
        None => warn!(currency = %currency, "No active price"),
      }
    }

    Ok(ServiceInfo {
      otc_status: if self.model.controller().paused() {
        "PAUSED"
      } else {
        "WORKING"
      },
      balance,
      prices,
    })
  }
}

const BASE58: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Shape check for a payout address.
///
/// BTC and SKY addresses are base58 strings of 26 to 35 characters; ETH
/// addresses are `0x` followed by 40 hex digits.
pub fn is_valid_address(currency: Currency, address: &str) -> bool {
  match currency {
    Currency::BTC | Currency::SKY => {
      (26..=35).contains(&address.len()) && address.chars().all(|c| BASE58.contains(c))
    }
    Currency::ETH => address
      .strip_prefix("0x")
      .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())),
  }
}
