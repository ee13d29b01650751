//! Currency Connector Port - Per-currency Node Interface
//!
//! Every supported currency is reached through one connector. Concrete
//! node clients (BTC, SKY, ETH) live behind this trait; the pipeline
//! treats every call as a single fallible round trip.

use async_trait::async_trait;

use crate::domain::errors::ConnectorError;

/// Result alias for connector calls.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Capability interface for a single currency's node.
///
/// Implementations own their I/O timeouts. Transient faults must be
/// reported as `ConnectorError::Unavailable` so stages can retry them.
#[async_trait]
pub trait CurrencyConnector: Send + Sync + 'static {
  /// Balance held at `address`, in base units.
  async fn balance(&self, address: &str) -> ConnectorResult<u64>;

  /// Send `amount` base units to `address`, returning the txid.
  async fn send(&self, address: &str, amount: u64) -> ConnectorResult<String>;

  /// Whether `txid` has reached the required confirmations.
  async fn confirmed(&self, txid: &str) -> ConnectorResult<bool>;

  /// Allocate a fresh deposit address.
  async fn address(&self) -> ConnectorResult<String>;

  /// Total funds held by the exchange wallet.
  async fn holding(&self) -> ConnectorResult<u64>;

  /// Whether the node is reachable and synced.
  async fn connected(&self) -> ConnectorResult<bool>;

  /// Release the node connection.
  async fn stop(&self) -> ConnectorResult<()>;
}
