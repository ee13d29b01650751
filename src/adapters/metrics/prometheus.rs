//! Prometheus Metrics Registry - Pipeline Observability
//!
//! Registers and exposes Prometheus metrics on :9090. Covers in-flight
//! counts per actor, the pause flag, router persistence counters and
//! the price of every source.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::domain::order::Currency;
use crate::domain::pricing::{Pricer, Source};
use crate::usecases::model::PipelineSnapshot;

/// Centralized Prometheus metrics for the order pipeline.
///
/// All metrics follow the naming convention `otc_*`.
pub struct MetricsRegistry {
    registry: Registry,
    /// Orders held per actor.
    pub in_flight: IntGaugeVec,
    /// 1 while the pipeline is paused.
    pub paused: IntGauge,
    /// Transitions written by the router since start.
    pub persisted: IntGauge,
    /// Failed router writes since start.
    pub persist_failures: IntGauge,
    /// Orders parked by a hard error since start.
    pub parked: IntGauge,
    /// Last price per currency and source, in drop base units.
    pub price: IntGaugeVec,
    /// 1 for the active source of each currency.
    pub active_source: IntGaugeVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let in_flight = IntGaugeVec::new(
            Opts::new("otc_in_flight_orders", "Orders currently held by each actor"),
            &["actor"],
        )?;
        let paused = IntGauge::new("otc_paused", "Whether the pipeline is paused (1=yes, 0=no)")?;
        let persisted = IntGauge::new(
            "otc_router_persisted",
            "Order transitions persisted by the router since start",
        )?;
        let persist_failures = IntGauge::new(
            "otc_router_persist_failures",
            "Router persistence failures since start",
        )?;
        let parked = IntGauge::new("otc_router_parked", "Orders parked after a hard error since start")?;
        let price = IntGaugeVec::new(
            Opts::new("otc_price", "Last price per source, in drop base units per payout coin"),
            &["currency", "source"],
        )?;
        let active_source = IntGaugeVec::new(
            Opts::new("otc_price_source_active", "Active price source (1=active)"),
            &["currency", "source"],
        )?;

        registry.register(Box::new(in_flight.clone()))?;
        registry.register(Box::new(paused.clone()))?;
        registry.register(Box::new(persisted.clone()))?;
        registry.register(Box::new(persist_failures.clone()))?;
        registry.register(Box::new(parked.clone()))?;
        registry.register(Box::new(price.clone()))?;
        registry.register(Box::new(active_source.clone()))?;

        Ok(Self {
            registry,
            in_flight,
            paused,
            persisted,
            persist_failures,
            parked,
            price,
            active_source,
        })
    }

    /// Copy a pipeline snapshot into the gauges.
    pub fn observe(&self, snapshot: &PipelineSnapshot) {
        let counts = snapshot.counts;
        for (actor, count) in [
            ("scanner", counts.scanner),
            ("sender", counts.sender),
            ("monitor", counts.monitor),
            ("router", counts.router),
        ] {
            self.in_flight.with_label_values(&[actor]).set(count);
        }
        self.paused.set(i64::from(snapshot.paused));
        self.persisted.set(saturating_i64(snapshot.router.persisted));
        self.persist_failures
            .set(saturating_i64(snapshot.router.persist_failures));
        self.parked.set(saturating_i64(snapshot.router.parked));
    }

    /// Copy one pricer's sources into the gauges.
    pub async fn observe_pricer(&self, currency: Currency, pricer: &Pricer) {
        let using = pricer.get_source().await;
        let label = currency.symbol();
        for source in [Source::Internal, Source::Exchange] {
            if let Some(p) = pricer.source_price(source).await {
                self.price
                    .with_label_values(&[label, source.as_str()])
                    .set(saturating_i64(p.amount));
            }
            self.active_source
                .with_label_values(&[label, source.as_str()])
                .set(i64::from(source == using));
        }
    }

    /// Encode every metric in the text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics are not UTF-8")
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            error!(error = %e, "Metrics render failed");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
