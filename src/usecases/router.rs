//! Router - Persist-then-route Hub
//!
//! The router holds every live order for its whole lifetime. When a
//! stage reports a result on an item's completion channel, the router
//! writes the order record and the audit event, and only then hands
//! the item to the actor for its new status. A failed write leaves the
//! result queued so the next tick tries again; nothing is routed that
//! is not on disk.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::errors::StageError;
use crate::domain::order::{Order, Status};
use crate::domain::work::WorkItem;
use crate::ports::storage::{OrderEvent, OrderStore};
use crate::usecases::actor::{Actor, Outcome, Task};
use crate::usecases::monitor::Confirm;
use crate::usecases::scanner::DepositScan;
use crate::usecases::sender::SendPayout;

/// The three stage actors.
pub struct Workers {
  pub scanner: Actor<DepositScan>,
  pub sender: Actor<SendPayout>,
  pub monitor: Actor<Confirm>,
}

impl Workers {
  /// Hand an item to the actor for `status`. Terminal statuses go nowhere.
  pub async fn route(&self, item: Arc<WorkItem>, status: Status) -> bool {
    match status {
      Status::PendingDeposit => self.scanner.add(item).await,
      Status::PendingSend => self.sender.add(item).await,
      Status::PendingConfirm => self.monitor.add(item).await,
      Status::Done | Status::Expired => false,
    }
  }

  /// Name of the stage actor currently holding `id`.
  pub async fn holder(&self, id: &str) -> Option<&'static str> {
    if self.scanner.contains(id).await {
      Some(self.scanner.name())
    } else if self.sender.contains(id).await {
      Some(self.sender.name())
    } else if self.monitor.contains(id).await {
      Some(self.monitor.name())
    } else {
      None
    }
  }
}

/// Router counters, exported as metrics.
#[derive(Debug, Default)]
pub struct RouterStats {
  persisted: AtomicU64,
  persist_failures: AtomicU64,
  parked: AtomicU64,
}

/// Point-in-time copy of `RouterStats`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouterCounts {
  pub persisted: u64,
  pub persist_failures: u64,
  pub parked: u64,
}

impl RouterStats {
  pub fn snapshot(&self) -> RouterCounts {
    RouterCounts {
      persisted: self.persisted.load(Ordering::Relaxed),
      persist_failures: self.persist_failures.load(Ordering::Relaxed),
      parked: self.parked.load(Ordering::Relaxed),
    }
  }
}

/// Router task: drain completions, persist, route.
pub struct RouterTask {
  store: Arc<dyn OrderStore>,
  workers: Arc<Workers>,
  stats: RouterStats,
}

impl RouterTask {
  pub fn new(store: Arc<dyn OrderStore>, workers: Arc<Workers>) -> Self {
    Self {
      store,
      workers,
      stats: RouterStats::default(),
    }
  }

  pub const fn stats(&self) -> &RouterStats {
    &self.stats
  }

  async fn persist(&self, order: &Order, at: i64) -> anyhow::Result<()> {
    self.store.save_order(order).await?;
    let event = OrderEvent::of(order, at, order.last_error.clone());
    self.store.append_event(&event).await
  }
}

#[async_trait]
impl Task for RouterTask {
  async fn run(&self, item: &Arc<WorkItem>) -> Outcome {
    let Some(mut result) = item.take_result() else {
      return Outcome::Stay;
    };

    let record = {
      let mut order = item.order().lock().await;
      let from = item.persisted_status();
      if !from.can_transition_to(order.status) {
        error!(order_id = %order.id, from = %from, to = %order.status, "Stage produced an invalid transition");
        result.error = Some(StageError::InvalidTransition {
          from,
          to: order.status,
        });
        order.status = from;
      }
      order.times.updated_at = result.finished_at;
      order.last_error = result.error.as_ref().map(ToString::to_string);
      order.clone()
    };

    if let Err(e) = self.persist(&record, result.finished_at).await {
      self.stats.persist_failures.fetch_add(1, Ordering::Relaxed);
      error!(order_id = %record.id, status = %record.status, error = %e, "Failed to persist order, holding it unrouted");
      item.complete(result);
      return Outcome::Stay;
    }
    item.set_persisted_status(record.status);
    self.stats.persisted.fetch_add(1, Ordering::Relaxed);

    if let Some(err) = &result.error {
      self.stats.parked.fetch_add(1, Ordering::Relaxed);
      warn!(order_id = %record.id, status = %record.status, error = %err, "Order parked until retried");
      return Outcome::Release;
    }

    if record.status.is_terminal() {
      info!(order_id = %record.id, status = %record.status, "Order finished");
      return Outcome::Release;
    }

    self.workers.route(Arc::clone(item), record.status).await;
    Outcome::Stay
  }
}

/// The router actor.
pub type Router = Actor<RouterTask>;

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::domain::work::{Backoff, StageResult};
  use crate::usecases::test_support::{MemoryStore, MockConnector, currencies, order, work};

  const NO_BACKOFF: Backoff = Backoff {
    base: Duration::ZERO,
    max: Duration::ZERO,
  };

  fn setup() -> (Arc<MemoryStore>, Arc<Workers>, Router) {
    let curs = currencies(MockConnector::new(), MockConnector::new());
    let workers = Arc::new(Workers {
      scanner: Actor::new("scanner", DepositScan::new(Arc::clone(&curs), 0), NO_BACKOFF),
      sender: Actor::new("sender", SendPayout::new(Arc::clone(&curs), None), NO_BACKOFF),
      monitor: Actor::new("monitor", Confirm::new(curs), NO_BACKOFF),
    });
    let store = Arc::new(MemoryStore::default());
    let router = Actor::new(
      "router",
      RouterTask::new(Arc::clone(&store) as Arc<dyn OrderStore>, Arc::clone(&workers)),
      NO_BACKOFF,
    );
    (store, workers, router)
  }

  #[tokio::test]
  async fn test_routes_after_persisting() {
    let (store, workers, router) = setup();
    let item = work(order("drop"));
    router.add(Arc::clone(&item)).await;

    item.order().lock().await.status = Status::PendingSend;
    item.complete(StageResult::new(None));
    router.tick().await;

    assert_eq!(store.saved(item.id()).await.unwrap().status, Status::PendingSend);
    assert_eq!(store.statuses(item.id()).await, vec![Status::PendingSend]);
    assert!(workers.sender.contains(item.id()).await);
    assert!(router.contains(item.id()).await);
    assert_eq!(item.persisted_status(), Status::PendingSend);
  }

  #[tokio::test]
  async fn test_persist_failure_leaves_order_unrouted() {
    let (store, workers, router) = setup();
    let item = work(order("drop"));
    router.add(Arc::clone(&item)).await;
    store.failing(true);

    item.order().lock().await.status = Status::PendingSend;
    item.complete(StageResult::new(None));
    router.tick().await;

    assert!(store.saved(item.id()).await.is_none());
    assert_eq!(workers.sender.count(), 0);
    assert_eq!(router.task().stats().snapshot().persist_failures, 1);

    store.failing(false);
    router.tick().await;
    assert!(workers.sender.contains(item.id()).await);
    assert_eq!(router.task().stats().snapshot().persisted, 1);
  }

  #[tokio::test]
  async fn test_hard_error_parks_in_last_good_state() {
    let (store, workers, router) = setup();
    let mut o = order("drop");
    o.status = Status::PendingSend;
    let item = work(o);
    router.add(Arc::clone(&item)).await;

    item.complete(StageResult::new(Some(StageError::MissingTxid)));
    router.tick().await;

    let saved = store.saved(item.id()).await.unwrap();
    assert_eq!(saved.status, Status::PendingSend);
    assert_eq!(saved.last_error.as_deref(), Some("order has no txid to confirm"));
    assert!(store.events.lock().await[0].error.is_some());
    assert!(!router.contains(item.id()).await);
    assert_eq!(workers.holder(item.id()).await, None);
    assert_eq!(router.task().stats().snapshot().parked, 1);
  }

  #[tokio::test]
  async fn test_backward_transition_is_rejected() {
    let (store, _workers, router) = setup();
    let mut o = order("drop");
    o.status = Status::PendingConfirm;
    let item = work(o);
    router.add(Arc::clone(&item)).await;

    item.order().lock().await.status = Status::PendingDeposit;
    item.complete(StageResult::new(None));
    router.tick().await;

    let saved = store.saved(item.id()).await.unwrap();
    assert_eq!(saved.status, Status::PendingConfirm);
    assert!(saved.last_error.unwrap().contains("invalid transition"));
  }

  #[tokio::test]
  async fn test_terminal_orders_leave_the_router() {
    let (store, workers, router) = setup();
    let item = work(order("drop"));
    router.add(Arc::clone(&item)).await;

    item.order().lock().await.status = Status::Expired;
    item.complete(StageResult::new(None));
    router.tick().await;

    assert_eq!(store.saved(item.id()).await.unwrap().status, Status::Expired);
    assert_eq!(router.count(), 0);
    assert_eq!(workers.holder(item.id()).await, None);
  }
}
