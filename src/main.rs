//! OTC Pipeline - Entry Point
//!
//! Initializes configuration, logging, node connectors and the order
//! pipeline. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config (path from argv[1], `OTC_CONFIG`, or config.toml)
//! 2. Init tracing (JSON structured logging)
//! 3. Open the disk store under `persistence.data_dir`
//! 4. Create one HttpConnector per currency, pricers for deposit currencies
//! 5. Assemble the Model and recover persisted orders
//! 6. Spawn actor loops, price refreshers and the metrics sampler
//! 7. Spawn health (/live, /ready) and metrics (/metrics) servers
//! 8. Wait for SIGINT, then stop loops and release connectors

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use otc_pipeline::adapters::connectors::HttpConnector;
use otc_pipeline::adapters::exchange::TickerFeed;
use otc_pipeline::adapters::metrics::{HealthServer, HealthState, MetricsRegistry, spawn_sampler};
use otc_pipeline::adapters::persistence::DiskStore;
use otc_pipeline::config::{self, AppConfig};
use otc_pipeline::domain::pricing::{Pricer, Source};
use otc_pipeline::ports::rate_feed::RateFeed;
use otc_pipeline::ports::storage::OrderStore;
use otc_pipeline::usecases::controller::Controller;
use otc_pipeline::usecases::currencies::Currencies;
use otc_pipeline::usecases::model::Model;
use otc_pipeline::usecases::price_refresher::PriceRefresher;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let path = config::loader::config_path(std::env::args().nth(1));
    let config = config::loader::load_config(&path).context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        config = %path,
        payout = %config.pipeline.payout_currency,
        currencies = config.currencies.len(),
        "Starting OTC pipeline"
    );

    // ── 3. Open the order store ─────────────────────────────
    let store: Arc<dyn OrderStore> = Arc::new(
        DiskStore::open(&config.persistence.data_dir)
            .await
            .context("Failed to open order store")?,
    );

    // ── 4. Connectors and pricers ───────────────────────────
    let currencies = Arc::new(build_currencies(&config).await?);

    // ── 5. Assemble and recover ─────────────────────────────
    let controller = Arc::new(Controller::new(config.pipeline.start_paused));
    let model = Arc::new(Model::new(
        &config.pipeline,
        Arc::clone(&currencies),
        store,
        Arc::clone(&controller),
    ));
    let recovery = model.recover().await.context("Failed to recover orders")?;
    info!(loaded = recovery.loaded, resumed = recovery.resumed, "Orders recovered");

    // ── 6. Loops ────────────────────────────────────────────
    let mut handles = model.start();
    handles.extend(spawn_refreshers(&config, &currencies, &controller)?);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let health = Arc::new(HealthState::new());
    let mut servers = Vec::new();

    // ── 7. Health and metrics servers ───────────────────────
    let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
    let health_shutdown = shutdown_tx.subscribe();
    servers.push(tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    }));

    if config.metrics.enabled {
        let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);
        handles.push(spawn_sampler(
            Arc::clone(&model),
            Arc::clone(&metrics),
            Arc::clone(&health),
            Duration::from_secs(config.metrics.sample_interval_seconds),
        ));

        let bind = config.metrics.bind_address.clone();
        let metrics_shutdown = shutdown_tx.subscribe();
        servers.push(tokio::spawn(async move {
            if let Err(e) = metrics.serve(bind, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }));
    }

    info!(paused = controller.paused(), "All tasks spawned, pipeline is running");

    // ── 8. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT");
    }
    info!("SIGINT received, initiating graceful shutdown");

    // ── Graceful shutdown ───────────────────────────────────

    // 1. Readiness probe -> 503, then stop every loop
    health.pipeline_running.store(false, Ordering::Relaxed);
    model.stop();

    // 2. Wait for in-flight ticks to finish (up to 30s)
    if tokio::time::timeout(Duration::from_secs(30), join_all(handles))
        .await
        .is_err()
    {
        warn!("Loops did not stop within 30s");
    }

    // 3. Release node connections
    currencies.stop_all().await;

    // 4. Stop servers
    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(5), join_all(servers)).await;

    info!("Shutdown complete");
    Ok(())
}

/// One connector per configured currency; deposit currencies also get a
/// pricer seeded with their internal price.
async fn build_currencies(config: &AppConfig) -> Result<Currencies> {
    let mut currencies = Currencies::new();

    for cur in &config.currencies {
        let connector = HttpConnector::new(
            cur.currency,
            &cur.node_url,
            Duration::from_secs(cur.timeout_seconds),
        )
        .with_context(|| format!("Failed to create {} connector", cur.currency))?;
        currencies.add(cur.currency, Arc::new(connector))?;

        if cur.accept_deposits {
            let pricer = Pricer::new(config.pricing.initial_source);
            if let Some(amount) = cur.internal_price {
                pricer.set_price(Source::Internal, amount).await;
            }
            currencies.add_pricer(cur.currency, Arc::new(pricer));
        }
    }

    Ok(currencies)
}

/// Spawn a price refresher for each deposit currency with a market.
fn spawn_refreshers(
    config: &AppConfig,
    currencies: &Currencies,
    controller: &Arc<Controller>,
) -> Result<Vec<JoinHandle<()>>> {
    let Some(ticker_url) = &config.pricing.ticker_url else {
        info!("No ticker configured, internal prices only");
        return Ok(Vec::new());
    };

    let markets: HashMap<_, _> = config
        .currencies
        .iter()
        .filter(|c| c.accept_deposits)
        .filter_map(|c| c.market.clone().map(|m| (c.currency, m)))
        .collect();
    let feed = Arc::new(TickerFeed::new(
        ticker_url,
        Duration::from_secs(config.pricing.timeout_seconds),
        markets,
    )?);

    let interval = Duration::from_secs(config.pricing.refresh_interval_seconds);
    let mut handles = Vec::new();
    for (currency, pricer) in currencies.priced() {
        if !feed.has_market(currency) {
            continue;
        }
        let refresher = PriceRefresher::new(currency, pricer, Arc::clone(&feed) as Arc<dyn RateFeed>);
        handles.push(refresher.spawn(controller, interval));
    }
    Ok(handles)
}

async fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Task ended abnormally");
        }
    }
}
