//! Ticker Feed - Last Trade Price over REST
//!
//! Polls `GET {ticker_url}/{market}` for each deposit currency. The
//! exchange answers `{"Success": bool, "Data": {"LastPrice": decimal}}`
//! where the price is in whole drop coins per payout coin; it is scaled
//! to drop base units with exact decimal arithmetic.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::order::Currency;
use crate::ports::rate_feed::RateFeed;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TickerResp {
  success: bool,
  #[serde(default)]
  data: Option<TickerData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TickerData {
  last_price: Decimal,
}

pub struct TickerFeed {
  http: Client,
  base_url: String,
  /// Market name per drop currency, e.g. BTC -> `SKY_BTC`.
  markets: HashMap<Currency, String>,
}

impl TickerFeed {
  pub fn new(base_url: &str, timeout: Duration, markets: HashMap<Currency, String>) -> Result<Self> {
    let http = Client::builder()
      .timeout(timeout)
      .build()
      .context("Failed to build HTTP client")?;

    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
      markets,
    })
  }

  pub fn has_market(&self, currency: Currency) -> bool {
    self.markets.contains_key(&currency)
  }
}

/// Scale a whole-coin price to `currency` base units, rounding to nearest.
pub fn to_base_units(price: Decimal, currency: Currency) -> Result<u64> {
  if price.is_sign_negative() {
    bail!("Negative price {price}");
  }
  let scale = Decimal::from(10u64.pow(currency.decimals()));
  price
    .checked_mul(scale)
    .and_then(|v| v.round().to_u64())
    .with_context(|| format!("Price {price} out of range for {currency}"))
}

#[async_trait]
impl RateFeed for TickerFeed {
  #[instrument(skip(self))]
  async fn fetch_rate(&self, currency: Currency) -> Result<u64> {
    let market = self
      .markets
      .get(&currency)
      .with_context(|| format!("No market configured for {currency}"))?;
    let url = format!("{}/{market}", self.base_url);

    let resp: TickerResp = self
      .http
      .get(&url)
      .send()
      .await
      .with_context(|| format!("Ticker request failed for {market}"))?
      .error_for_status()
      .with_context(|| format!("Ticker returned error for {market}"))?
      .json()
      .await
      .with_context(|| format!("Malformed ticker for {market}"))?;

    let data = match resp {
      TickerResp {
        success: true,
        data: Some(data),
      } => data,
      _ => bail!("Ticker reported failure for {market}"),
    };

    let rate = to_base_units(data.last_price, currency)?;
    debug!(market = %market, last_price = %data.last_price, rate, "Ticker fetched");
    Ok(rate)
  }

  fn name(&self) -> &str {
    "ticker"
  }
}
