//! HTTP Node Connector - JSON Bridge Client
//!
//! Wraps reqwest with a per-node timeout. Every call is one round trip
//! with no retries; the stage tick is the retry loop.
//!
//! Endpoints, relative to the node base URL:
//! - `GET  /balance/{address}` -> `{"balance": u64}`
//! - `POST /send` `{"address", "amount"}` -> `{"txid": str}`
//! - `GET  /confirmed/{txid}` -> `{"confirmed": bool}`
//! - `POST /address` -> `{"address": str}`
//! - `GET  /holding` -> `{"holding": u64}`
//! - `GET  /status` -> `{"connected": bool}`
//!
//! Addresses and txids are sent as single percent-encoded path segments.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::errors::ConnectorError;
use crate::domain::order::Currency;
use crate::ports::connector::{ConnectorResult, CurrencyConnector};

#[derive(Debug, Deserialize)]
struct BalanceResp {
  balance: u64,
}

#[derive(Debug, Serialize)]
struct SendReq<'a> {
  address: &'a str,
  amount: u64,
}

#[derive(Debug, Deserialize)]
struct SendResp {
  txid: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmedResp {
  confirmed: bool,
}

#[derive(Debug, Deserialize)]
struct AddressResp {
  address: String,
}

#[derive(Debug, Deserialize)]
struct HoldingResp {
  holding: u64,
}

#[derive(Debug, Deserialize)]
struct StatusResp {
  connected: bool,
}

/// Connector for one currency node behind an HTTP bridge.
pub struct HttpConnector {
  currency: Currency,
  http: Client,
  base_url: Url,
}

impl HttpConnector {
  pub fn new(currency: Currency, base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
    let http = Client::builder()
      .timeout(timeout)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;
    let base_url = Url::parse(base_url).with_context(|| format!("Invalid node URL {base_url}"))?;
    anyhow::ensure!(!base_url.cannot_be_a_base(), "Node URL {base_url} cannot take a path");

    Ok(Self {
      currency,
      http,
      base_url,
    })
  }

  /// Base URL with `segments` appended, each one encoded on its own.
  fn url(&self, segments: &[&str]) -> ConnectorResult<Url> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|()| anyhow::anyhow!("{} node URL cannot take a path", self.currency))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  /// Send a request and decode a 2xx JSON body.
  async fn call<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> ConnectorResult<T> {
    let response = request.send().await.map_err(|e| {
      warn!(currency = %self.currency, call = what, error = %e, "Node request failed");
      ConnectorError::Unavailable(format!("{what}: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(classify(status, format!("{what}: {status} {body}")));
    }

    let decoded = response
      .json::<T>()
      .await
      .with_context(|| format!("Malformed {what} response from {} node", self.currency))?;
    debug!(currency = %self.currency, call = what, "Node call ok");
    Ok(decoded)
  }
}

/// Map a non-2xx status onto the connector error split.
fn classify(status: StatusCode, message: String) -> ConnectorError {
  if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
    ConnectorError::Unavailable(message)
  } else {
    ConnectorError::Rejected(message)
  }
}

#[async_trait]
impl CurrencyConnector for HttpConnector {
  async fn balance(&self, address: &str) -> ConnectorResult<u64> {
    let resp: BalanceResp = self
      .call(self.http.get(self.url(&["balance", address])?), "balance")
      .await?;
    Ok(resp.balance)
  }

  async fn send(&self, address: &str, amount: u64) -> ConnectorResult<String> {
    let request = self.http.post(self.url(&["send"])?).json(&SendReq { address, amount });
    let resp: SendResp = self.call(request, "send").await?;
    info!(currency = %self.currency, amount, txid = %resp.txid, "Node accepted send");
    Ok(resp.txid)
  }

  async fn confirmed(&self, txid: &str) -> ConnectorResult<bool> {
    let resp: ConfirmedResp = self
      .call(self.http.get(self.url(&["confirmed", txid])?), "confirmed")
      .await?;
    Ok(resp.confirmed)
  }

  async fn address(&self) -> ConnectorResult<String> {
    let resp: AddressResp = self.call(self.http.post(self.url(&["address"])?), "address").await?;
    Ok(resp.address)
  }

  async fn holding(&self) -> ConnectorResult<u64> {
    let resp: HoldingResp = self.call(self.http.get(self.url(&["holding"])?), "holding").await?;
    Ok(resp.holding)
  }

  async fn connected(&self) -> ConnectorResult<bool> {
    let resp: StatusResp = self.call(self.http.get(self.url(&["status"])?), "status").await?;
    Ok(resp.connected)
  }

  async fn stop(&self) -> ConnectorResult<()> {
    // Pooled connections close when the client drops.
    info!(currency = %self.currency, "Connector stopped");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use axum::extract::Path;
  use axum::http::StatusCode as AxumStatus;
  use axum::routing::{get, post};
  use axum::{Json, Router};
  use serde_json::{Value, json};

  use super::*;

  async fn bridge() -> String {
    let app = Router::new()
      .route("/balance/:address", get(|Path(a): Path<String>| async move {
        let balance = match a.as_str() {
          "funded" => 100_000,
          "odd/addr?x#y" => 7,
          _ => 0,
        };
        Json(json!({ "balance": balance }))
      }))
      .route("/send", post(|Json(body): Json<Value>| async move {
        if body["amount"].as_u64() == Some(0) {
          (AxumStatus::BAD_REQUEST, Json(json!({ "error": "zero amount" })))
        } else {
          (AxumStatus::OK, Json(json!({ "txid": "tx-1" })))
        }
      }))
      .route("/confirmed/:txid", get(|Path(t): Path<String>| async move {
        Json(json!({ "confirmed": t == "tx-1" || t == "tx/1?x" }))
      }))
      .route("/address", post(|| async { Json(json!({ "address": "drop-1" })) }))
      .route("/holding", get(|| async { AxumStatus::SERVICE_UNAVAILABLE }))
      .route("/status", get(|| async { Json(json!({ "up": true })) }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::serve(listener, app).into_future());
    format!("http://{addr}/")
  }

  #[tokio::test]
  async fn test_round_trips() {
    let node = HttpConnector::new(Currency::BTC, &bridge().await, Duration::from_secs(5)).unwrap();
    assert_eq!(node.balance("funded").await.unwrap(), 100_000);
    assert_eq!(node.balance("empty").await.unwrap(), 0);
    assert_eq!(node.send("dest", 5).await.unwrap(), "tx-1");
    assert!(node.confirmed("tx-1").await.unwrap());
    assert_eq!(node.address().await.unwrap(), "drop-1");
    node.stop().await.unwrap();
  }

  #[tokio::test]
  async fn test_path_values_are_single_segments() {
    let node = HttpConnector::new(Currency::BTC, &bridge().await, Duration::from_secs(5)).unwrap();
    assert_eq!(node.balance("odd/addr?x#y").await.unwrap(), 7);
    assert!(node.confirmed("tx/1?x").await.unwrap());
    assert!(!node.confirmed("tx-2").await.unwrap());
  }

  #[test]
  fn test_rejects_unusable_base_url() {
    assert!(HttpConnector::new(Currency::BTC, "not a url", Duration::from_secs(1)).is_err());
    assert!(HttpConnector::new(Currency::BTC, "mailto:node@example.com", Duration::from_secs(1)).is_err());
  }

  #[tokio::test]
  async fn test_error_classification() {
    let node = HttpConnector::new(Currency::SKY, &bridge().await, Duration::from_secs(5)).unwrap();
    assert!(matches!(node.send("dest", 0).await, Err(ConnectorError::Rejected(_))));
    assert!(matches!(node.holding().await, Err(ConnectorError::Unavailable(_))));
    assert!(matches!(node.connected().await, Err(ConnectorError::Other(_))));
  }

  #[tokio::test]
  async fn test_unreachable_node_is_transient() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let node = HttpConnector::new(Currency::ETH, &format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let err = node.balance("x").await.unwrap_err();
    assert!(err.is_transient());
  }
}
