//! Metrics and Monitoring Adapters
//!
//! Provides Prometheus metrics export on :9090 and health check
//! endpoints (/live, /ready) via axum 0.7. A sampler task copies the
//! pipeline snapshot and pricer state into the registry.

pub mod health;
pub mod prometheus;
pub mod sampler;

pub use health::{HealthServer, HealthState};
pub use prometheus::MetricsRegistry;
pub use sampler::spawn_sampler;
