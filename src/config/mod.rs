//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`. Node
//! endpoints, tick intervals, the deposit window and price sources are
//! externalized here; nothing in the domain layer is hardcoded to a
//! particular deployment.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::domain::order::Currency;
use crate::domain::pricing::Source;
use crate::domain::work::Backoff;

/// Top-level service configuration.
///
/// Loaded from `config.toml` at startup and validated before any
/// connector is created.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  pub service: ServiceConfig,
  /// Actor intervals, deposit window, retry policy.
  #[serde(default)]
  pub pipeline: PipelineConfig,
  /// Order records and audit log location.
  #[serde(default)]
  pub persistence: PersistenceConfig,
  /// Exchange price feed and refresh cadence.
  #[serde(default)]
  pub pricing: PricingConfig,
  /// One entry per currency node.
  pub currencies: Vec<CurrencyConfig>,
  /// Metrics and health probes.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Order pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
  #[serde(default = "default_stage_interval")]
  pub scanner_interval_ms: u64,
  #[serde(default = "default_stage_interval")]
  pub sender_interval_ms: u64,
  #[serde(default = "default_stage_interval")]
  pub monitor_interval_ms: u64,
  #[serde(default = "default_router_interval")]
  pub router_interval_ms: u64,
  /// Period of the in-flight counts log line.
  #[serde(default = "default_status_interval")]
  pub status_interval_seconds: u64,
  /// Deposit window from order creation. 0 disables expiry.
  #[serde(default = "default_expiration_hours")]
  pub expiration_hours: u64,
  /// Transient-error backoff base; 0 retries on every tick.
  #[serde(default)]
  pub backoff_base_ms: u64,
  #[serde(default = "default_backoff_max")]
  pub backoff_max_ms: u64,
  /// Persist `send_started_at` before every payout.
  #[serde(default = "default_true")]
  pub send_intent_marker: bool,
  /// Currency paid out to bound destinations.
  #[serde(default = "default_payout_currency")]
  pub payout_currency: Currency,
  /// Start with the pipeline paused.
  #[serde(default)]
  pub start_paused: bool,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      scanner_interval_ms: default_stage_interval(),
      sender_interval_ms: default_stage_interval(),
      monitor_interval_ms: default_stage_interval(),
      router_interval_ms: default_router_interval(),
      status_interval_seconds: default_status_interval(),
      expiration_hours: default_expiration_hours(),
      backoff_base_ms: 0,
      backoff_max_ms: default_backoff_max(),
      send_intent_marker: true,
      payout_currency: default_payout_currency(),
      start_paused: false,
    }
  }
}

impl PipelineConfig {
  pub const fn backoff(&self) -> Backoff {
    Backoff {
      base: Duration::from_millis(self.backoff_base_ms),
      max: Duration::from_millis(self.backoff_max_ms),
    }
  }

  /// Deposit window in seconds, saturating at `i64::MAX`.
  pub fn expiration_secs(&self) -> i64 {
    i64::try_from(self.expiration_hours)
      .unwrap_or(i64::MAX)
      .saturating_mul(3_600)
  }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory holding `orders/` and `events.jsonl`.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
    }
  }
}

/// Price feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
  /// Seconds between exchange price refreshes.
  #[serde(default = "default_refresh_interval")]
  pub refresh_interval_seconds: u64,
  /// Exchange market endpoint base; the market name is appended.
  /// Without it only the internal price is used.
  pub ticker_url: Option<String>,
  /// Request timeout in seconds.
  #[serde(default = "default_timeout")]
  pub timeout_seconds: u64,
  /// Source every pricer starts on.
  #[serde(default = "default_source")]
  pub initial_source: Source,
}

impl Default for PricingConfig {
  fn default() -> Self {
    Self {
      refresh_interval_seconds: default_refresh_interval(),
      ticker_url: None,
      timeout_seconds: default_timeout(),
      initial_source: default_source(),
    }
  }
}

/// One currency node.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyConfig {
  pub currency: Currency,
  /// Base URL of the node bridge.
  pub node_url: String,
  /// Request timeout in seconds.
  #[serde(default = "default_timeout")]
  pub timeout_seconds: u64,
  /// Whether users may deposit this currency (gets a pricer).
  #[serde(default)]
  pub accept_deposits: bool,
  /// Seed for the internal price source, in base units per payout coin.
  pub internal_price: Option<u64>,
  /// Exchange market name, e.g. `SKY_BTC`.
  pub market: Option<String>,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
  /// Seconds between copies of pipeline state into the registry.
  #[serde(default = "default_sample_interval")]
  pub sample_interval_seconds: u64,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
      sample_interval_seconds: default_sample_interval(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_stage_interval() -> u64 {
  5_000
}

fn default_router_interval() -> u64 {
  1_000
}

fn default_status_interval() -> u64 {
  60
}

fn default_expiration_hours() -> u64 {
  24
}

fn default_backoff_max() -> u64 {
  300_000
}

fn default_payout_currency() -> Currency {
  Currency::SKY
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_refresh_interval() -> u64 {
  60
}

fn default_timeout() -> u64 {
  10
}

fn default_source() -> Source {
  Source::Internal
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}

fn default_sample_interval() -> u64 {
  5
}
