//! Model - Pipeline Assembly, Recovery and Queries
//!
//! Owns the three stage actors, the router and the lookup indexes, and
//! spawns one poll loop per actor through the controller. New orders
//! enter through `add`; restarts go through `recover`, which re-queues
//! every non-terminal record found in the store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::domain::errors::ModelError;
use crate::domain::order::{Currency, DropAddress, Order, Status, User, now_unix};
use crate::domain::work::WorkItem;
use crate::ports::storage::{OrderEvent, OrderStore};
use crate::usecases::actor::Actor;
use crate::usecases::controller::{Controller, LoopMode};
use crate::usecases::currencies::Currencies;
use crate::usecases::lookup::Lookup;
use crate::usecases::monitor::Confirm;
use crate::usecases::router::{Router, RouterCounts, RouterTask, Workers};
use crate::usecases::scanner::DepositScan;
use crate::usecases::sender::SendPayout;

/// In-flight counts per actor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActorCounts {
  pub scanner: i64,
  pub sender: i64,
  pub monitor: i64,
  pub router: i64,
}

/// Everything the metrics sampler reads in one go.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PipelineSnapshot {
  pub counts: ActorCounts,
  pub paused: bool,
  pub router: RouterCounts,
}

/// Result of a startup recovery.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Recovery {
  pub loaded: usize,
  pub resumed: usize,
}

#[derive(Debug, Clone, Copy)]
struct Intervals {
  scanner: Duration,
  sender: Duration,
  monitor: Duration,
  router: Duration,
  status: Duration,
}

/// The order pipeline.
pub struct Model {
  controller: Arc<Controller>,
  currencies: Arc<Currencies>,
  store: Arc<dyn OrderStore>,
  workers: Arc<Workers>,
  router: Arc<Router>,
  lookup: Lookup,
  /// Held across the duplicate check and the first persist in `add`.
  adding: Mutex<()>,
  intervals: Intervals,
}

impl Model {
  pub fn new(
    config: &PipelineConfig,
    currencies: Arc<Currencies>,
    store: Arc<dyn OrderStore>,
    controller: Arc<Controller>,
  ) -> Self {
    let backoff = config.backoff();
    let intent_store = config.send_intent_marker.then(|| Arc::clone(&store));

    let workers = Arc::new(Workers {
      scanner: Actor::new(
        "scanner",
        DepositScan::new(Arc::clone(&currencies), config.expiration_secs()),
        backoff,
      ),
      sender: Actor::new(
        "sender",
        SendPayout::new(Arc::clone(&currencies), intent_store),
        backoff,
      ),
      monitor: Actor::new("monitor", Confirm::new(Arc::clone(&currencies)), backoff),
    });
    let router = Arc::new(Actor::new(
      "router",
      RouterTask::new(Arc::clone(&store), Arc::clone(&workers)),
      backoff,
    ));

    Self {
      controller,
      currencies,
      store,
      workers,
      router,
      lookup: Lookup::new(),
      adding: Mutex::new(()),
      intervals: Intervals {
        scanner: Duration::from_millis(config.scanner_interval_ms),
        sender: Duration::from_millis(config.sender_interval_ms),
        monitor: Duration::from_millis(config.monitor_interval_ms),
        router: Duration::from_millis(config.router_interval_ms),
        status: Duration::from_secs(config.status_interval_seconds),
      },
    }
  }

  pub const fn controller(&self) -> &Arc<Controller> {
    &self.controller
  }

  pub const fn currencies(&self) -> &Arc<Currencies> {
    &self.currencies
  }

  pub const fn workers(&self) -> &Arc<Workers> {
    &self.workers
  }

  pub const fn router(&self) -> &Arc<Router> {
    &self.router
  }

  /// Load every persisted order and resume the non-terminal ones.
  #[instrument(skip(self))]
  pub async fn recover(&self) -> anyhow::Result<Recovery> {
    let orders = self.store.load_orders().await.context("Failed to load orders")?;
    let mut report = Recovery {
      loaded: orders.len(),
      resumed: 0,
    };

    for order in orders {
      let status = order.status;
      let item = WorkItem::new(Arc::new(Mutex::new(order.clone())), order.id.clone(), status);
      if !self.lookup.insert(Arc::clone(&item), &order).await {
        warn!(order_id = %order.id, "Duplicate order record skipped");
        continue;
      }
      if status.is_terminal() {
        continue;
      }
      if let Some(err) = &order.last_error {
        warn!(order_id = %order.id, status = %status, error = %err, "Resuming order that was parked");
      }
      self.router.add(Arc::clone(&item)).await;
      self.workers.route(item, status).await;
      report.resumed += 1;
    }

    info!(loaded = report.loaded, resumed = report.resumed, "Orders recovered");
    Ok(report)
  }

  /// Persist a new order, index it and hand it to the scanner.
  #[instrument(skip(self, order), fields(order_id = %order.id))]
  pub async fn add(&self, order: Order) -> Result<Arc<WorkItem>, ModelError> {
    let _adding = self.adding.lock().await;
    if self.lookup.get(&order.id).await.is_some() {
      return Err(ModelError::DuplicateOrder(order.id));
    }

    self
      .store
      .save_order(&order)
      .await
      .context("Failed to persist new order")?;
    self
      .store
      .append_event(&OrderEvent::of(&order, order.times.created_at, None))
      .await
      .context("Failed to append order event")?;

    let status = order.status;
    let item = WorkItem::new(Arc::new(Mutex::new(order.clone())), order.id.clone(), status);
    if !self.lookup.insert(Arc::clone(&item), &order).await {
      return Err(ModelError::DuplicateOrder(order.id));
    }
    self.router.add(Arc::clone(&item)).await;
    self.workers.route(Arc::clone(&item), status).await;

    info!(drop = %order.drop.key(), destination = %order.destination.address, "Order added");
    Ok(item)
  }

  /// Spawn the actor loops and the status logger.
  pub fn start(&self) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(5);

    let workers = Arc::clone(&self.workers);
    handles.push(self.controller.spawn_loop(
      "scanner",
      self.intervals.scanner,
      LoopMode::Pausable,
      move || {
        let workers = Arc::clone(&workers);
        async move {
          workers.scanner.tick().await;
        }
      },
    ));

    let workers = Arc::clone(&self.workers);
    handles.push(self.controller.spawn_loop(
      "sender",
      self.intervals.sender,
      LoopMode::Pausable,
      move || {
        let workers = Arc::clone(&workers);
        async move {
          workers.sender.tick().await;
        }
      },
    ));

    let workers = Arc::clone(&self.workers);
    handles.push(self.controller.spawn_loop(
      "monitor",
      self.intervals.monitor,
      LoopMode::Pausable,
      move || {
        let workers = Arc::clone(&workers);
        async move {
          workers.monitor.tick().await;
        }
      },
    ));

    let router = Arc::clone(&self.router);
    handles.push(self.controller.spawn_loop(
      "router",
      self.intervals.router,
      LoopMode::Pausable,
      move || {
        let router = Arc::clone(&router);
        async move {
          router.tick().await;
        }
      },
    ));

    let workers = Arc::clone(&self.workers);
    let router = Arc::clone(&self.router);
    let controller = Arc::clone(&self.controller);
    handles.push(self.controller.spawn_loop(
      "status",
      self.intervals.status,
      LoopMode::Always,
      move || {
        let counts = ActorCounts {
          scanner: workers.scanner.count(),
          sender: workers.sender.count(),
          monitor: workers.monitor.count(),
          router: router.count(),
        };
        let paused = controller.paused();
        async move {
          info!(
            scanner = counts.scanner,
            sender = counts.sender,
            monitor = counts.monitor,
            router = counts.router,
            paused,
            "Pipeline status"
          );
        }
      },
    ));

    info!("Pipeline started");
    handles
  }

  pub fn stop(&self) {
    self.controller.stop();
  }

  /// Run one tick of every actor, unless paused.
  pub async fn step(&self) {
    if self.controller.paused() {
      return;
    }
    self.workers.scanner.tick().await;
    self.workers.sender.tick().await;
    self.workers.monitor.tick().await;
    self.router.tick().await;
  }

  // ── Queries ──────────────────────────────────────────

  /// Copies of every known order.
  pub async fn orders(&self) -> Vec<Order> {
    let mut out = Vec::new();
    for item in self.lookup.items().await {
      out.push(item.order().lock().await.clone());
    }
    out
  }

  pub async fn order(&self, id: &str) -> Result<Order, ModelError> {
    let item = self
      .lookup
      .get(id)
      .await
      .ok_or_else(|| ModelError::OrderMissing(id.to_string()))?;
    let order = item.order().lock().await.clone();
    Ok(order)
  }

  pub async fn users(&self) -> Vec<User> {
    self.lookup.users().await
  }

  /// Status and last update of the order bound to a drop address.
  pub async fn status_by_drop(
    &self,
    currency: Currency,
    address: &str,
  ) -> Result<(Status, i64), ModelError> {
    let key = DropAddress {
      address: address.to_string(),
      currency,
    }
    .key();
    let found = self.lookup.by_drop(&key).await;
    let item = found.ok_or(ModelError::OrderMissing(key))?;
    let order = item.order().lock().await;
    Ok((order.status, order.times.updated_at))
  }

  /// Re-route a parked order into the actor for its status.
  ///
  /// Returns `Ok(false)` if the order is already live. Clears the stored
  /// error and the send intent marker; retrying an in-doubt send is an
  /// operator's statement that the earlier payout did not go out.
  #[instrument(skip(self))]
  pub async fn retry(&self, id: &str) -> Result<bool, ModelError> {
    let item = self
      .lookup
      .get(id)
      .await
      .ok_or_else(|| ModelError::OrderMissing(id.to_string()))?;

    if self.router.contains(id).await || self.workers.holder(id).await.is_some() {
      return Ok(false);
    }

    let now = now_unix();
    let record = {
      let mut order = item.order().lock().await;
      if order.status.is_terminal() {
        return Err(ModelError::AlreadyFinished {
          id: order.id.clone(),
          status: order.status,
        });
      }
      order.last_error = None;
      order.times.send_started_at = 0;
      order.times.updated_at = now;
      order.clone()
    };

    self
      .store
      .save_order(&record)
      .await
      .context("Failed to persist retried order")?;
    self
      .store
      .append_event(&OrderEvent::of(&record, now, None))
      .await
      .context("Failed to append order event")?;

    item.reset_backoff();
    item.take_result();
    item.set_persisted_status(record.status);
    self.router.add(Arc::clone(&item)).await;
    self.workers.route(item, record.status).await;

    info!(status = %record.status, "Order retried");
    Ok(true)
  }

  pub fn counts(&self) -> ActorCounts {
    ActorCounts {
      scanner: self.workers.scanner.count(),
      sender: self.workers.sender.count(),
      monitor: self.workers.monitor.count(),
      router: self.router.count(),
    }
  }

  pub fn snapshot(&self) -> PipelineSnapshot {
    PipelineSnapshot {
      counts: self.counts(),
      paused: self.controller.paused(),
      router: self.router.task().stats().snapshot(),
    }
  }

  pub async fn is_healthy(&self) -> bool {
    !self.controller.is_stopped() && self.store.is_healthy().await
  }
}
