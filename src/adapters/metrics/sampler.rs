//! Metrics Sampler - Periodic Copy of Pipeline State
//!
//! Reads the model snapshot, every pricer and the store health on a
//! fixed interval and publishes them to Prometheus and the health
//! probes. Keeps the usecases free of any metrics dependency.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use super::health::HealthState;
use super::prometheus::MetricsRegistry;
use crate::usecases::controller::LoopMode;
use crate::usecases::model::Model;

/// Spawn the sampler on the model's controller. Runs while paused.
pub fn spawn_sampler(
    model: Arc<Model>,
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthState>,
    interval: Duration,
) -> JoinHandle<()> {
    let controller = Arc::clone(model.controller());
    controller.spawn_loop("metrics", interval, LoopMode::Always, move || {
        let model = Arc::clone(&model);
        let metrics = Arc::clone(&metrics);
        let health = Arc::clone(&health);
        async move {
            metrics.observe(&model.snapshot());
            for (currency, pricer) in model.currencies().priced() {
                metrics.observe_pricer(currency, &pricer).await;
            }

            let healthy = model.is_healthy().await;
            if !healthy && health.store_healthy.load(Ordering::Relaxed) {
                warn!("Order store unhealthy");
            }
            health.store_healthy.store(healthy, Ordering::Relaxed);
            health
                .pipeline_running
                .store(!model.controller().is_stopped(), Ordering::Relaxed);
        }
    })
}
