//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "OTC_CONFIG";

/// Config path from the first CLI argument, then `OTC_CONFIG`, then
/// `config.toml`.
pub fn config_path(arg: Option<String>) -> String {
  arg
    .or_else(|| std::env::var(CONFIG_ENV).ok())
    .unwrap_or_else(|| "config.toml".to_string())
}

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    currencies = config.currencies.len(),
    payout = %config.pipeline.payout_currency,
    expiration_hours = config.pipeline.expiration_hours,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.service.name.is_empty(),
    "service.name must not be empty"
  );

  // Pipeline validation
  let pipeline = &config.pipeline;
  for (name, ms) in [
    ("scanner_interval_ms", pipeline.scanner_interval_ms),
    ("sender_interval_ms", pipeline.sender_interval_ms),
    ("monitor_interval_ms", pipeline.monitor_interval_ms),
    ("router_interval_ms", pipeline.router_interval_ms),
  ] {
    anyhow::ensure!(ms > 0, "pipeline.{name} must be positive");
  }
  anyhow::ensure!(
    pipeline.status_interval_seconds > 0,
    "pipeline.status_interval_seconds must be positive"
  );
  anyhow::ensure!(
    pipeline.backoff_max_ms >= pipeline.backoff_base_ms,
    "pipeline.backoff_max_ms ({}) must be >= backoff_base_ms ({})",
    pipeline.backoff_max_ms,
    pipeline.backoff_base_ms
  );

  // Currency validation
  anyhow::ensure!(
    !config.currencies.is_empty(),
    "At least one currency must be configured"
  );

  let mut seen = HashSet::new();
  for (i, cur) in config.currencies.iter().enumerate() {
    anyhow::ensure!(
      seen.insert(cur.currency),
      "Currency {} is configured more than once",
      cur.currency
    );
    anyhow::ensure!(
      !cur.node_url.is_empty(),
      "Currency {} ({}) has empty node_url",
      i,
      cur.currency
    );
    anyhow::ensure!(
      cur.timeout_seconds > 0,
      "Currency {} timeout_seconds must be positive",
      cur.currency
    );
    if cur.accept_deposits {
      anyhow::ensure!(
        cur.currency != pipeline.payout_currency,
        "Currency {} cannot be both deposit and payout currency",
        cur.currency
      );
      anyhow::ensure!(
        cur.internal_price.is_some() || cur.market.is_some(),
        "Deposit currency {} needs internal_price or market",
        cur.currency
      );
    }
  }

  anyhow::ensure!(
    seen.contains(&pipeline.payout_currency),
    "Payout currency {} has no configured node",
    pipeline.payout_currency
  );
  anyhow::ensure!(
    config.currencies.iter().any(|c| c.accept_deposits),
    "At least one currency must accept deposits"
  );

  // Pricing validation
  anyhow::ensure!(
    config.pricing.refresh_interval_seconds > 0,
    "pricing.refresh_interval_seconds must be positive"
  );
  if let Some(url) = &config.pricing.ticker_url {
    anyhow::ensure!(!url.is_empty(), "pricing.ticker_url must not be empty");
  }

  // Metrics validation
  anyhow::ensure!(
    config.metrics.sample_interval_seconds > 0,
    "metrics.sample_interval_seconds must be positive"
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::order::Currency;
  use crate::config::PipelineConfig;
  use crate::domain::pricing::Source;

  const MINIMAL: &str = r#"
[service]
name = "otc"

[[currencies]]
currency = "BTC"
node_url = "http://127.0.0.1:7001"
accept_deposits = true
internal_price = 200000

[[currencies]]
currency = "SKY"
node_url = "http://127.0.0.1:7002"
"#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_minimal_config_gets_defaults() {
    let config = parse_config(MINIMAL).unwrap();
    assert_eq!(config.service.log_level, "info");
    assert_eq!(config.pipeline.scanner_interval_ms, 5_000);
    assert_eq!(config.pipeline.expiration_secs(), 24 * 3_600);
    assert!(config.pipeline.send_intent_marker);
    assert!(!config.pipeline.backoff().is_enabled());
    assert_eq!(config.pipeline.payout_currency, Currency::SKY);
    assert_eq!(config.pricing.initial_source, Source::Internal);
    assert_eq!(config.persistence.data_dir, "data");
    assert_eq!(config.currencies[0].timeout_seconds, 10);
  }

  #[test]
  fn test_huge_expiration_saturates() {
    let pipeline = PipelineConfig {
      expiration_hours: u64::MAX,
      ..PipelineConfig::default()
    };
    assert_eq!(pipeline.expiration_secs(), i64::MAX);

    let pipeline = PipelineConfig {
      expiration_hours: 1 << 63,
      ..PipelineConfig::default()
    };
    assert_eq!(pipeline.expiration_secs(), i64::MAX);
  }

  #[test]
  fn test_rejects_duplicate_currency() {
    let doubled = format!(
      "{MINIMAL}\n[[currencies]]\ncurrency = \"BTC\"\nnode_url = \"http://x\"\n"
    );
    let err = parse_config(&doubled).unwrap_err();
    assert!(err.to_string().contains("more than once"));
  }

  #[test]
  fn test_rejects_unpriced_deposit_currency() {
    let text = MINIMAL.replace("internal_price = 200000", "");
    assert!(parse_config(&text).is_err());
  }

  #[test]
  fn test_rejects_missing_payout_node() {
    let text = MINIMAL.replace("currency = \"SKY\"", "currency = \"ETH\"");
    let err = parse_config(&text).unwrap_err();
    assert!(err.to_string().contains("Payout currency"));
  }

  #[test]
  fn test_example_config_is_valid() {
    let config = parse_config(include_str!("../../config.example.toml")).unwrap();
    assert_eq!(config.currencies.len(), 3);
    assert_eq!(config.metrics.sample_interval_seconds, 5);
    assert!(config.pricing.ticker_url.is_some());
  }

  #[test]
  fn test_config_path_prefers_argument() {
    assert_eq!(config_path(Some("custom.toml".into())), "custom.toml");
  }
}
