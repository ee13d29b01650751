//! Actor - Concurrent In-flight Set with a Per-item Task
//!
//! An actor owns a set of work items and, on every tick, applies its
//! task to each of them. The set lock is held only long enough to
//! snapshot the members; tasks run outside it so `add`/`delete` from
//! other loops never wait on a slow connector call.
//!
//! A task reports one of four outcomes:
//! - `Stay`: nothing happened yet, check again next tick
//! - `Retry`: transient fault, logged and retried (with optional backoff)
//! - `Finished`: the stage is over; the item is removed, then its result
//!   is delivered on the completion channel
//! - `Release`: the item is removed without reporting anything

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::domain::errors::StageError;
use crate::domain::order::OrderId;
use crate::domain::work::{Backoff, StageResult, WorkItem};

/// What a task decided about one item on one tick.
#[derive(Debug)]
pub enum Outcome {
  /// Keep the item and clear its backoff.
  Stay,
  /// Keep the item and back off before the next attempt.
  Retry(StageError),
  /// Remove the item, then report the stage result with the hard
  /// failure, if any.
  Finished(Option<StageError>),
  /// Remove the item silently.
  Release,
}

impl Outcome {
  /// Map a stage failure to retry-in-place or give-up.
  pub fn from_error(err: StageError) -> Self {
    if err.is_transient() {
      Self::Retry(err)
    } else {
      Self::Finished(Some(err))
    }
  }
}

/// Work applied by an actor to each of its items.
#[async_trait]
pub trait Task: Send + Sync + 'static {
  /// Process one item. Called at most once per item per tick, never
  /// while the set lock is held.
  async fn run(&self, item: &Arc<WorkItem>) -> Outcome;
}

/// Counters for one pass over the set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
  /// Items whose backoff had elapsed and were handed to the task.
  pub visited: usize,
  /// Items that returned `Finished`.
  pub finished: usize,
  /// Items that returned `Retry`.
  pub retried: usize,
}

/// A named in-flight set driven by one task.
pub struct Actor<T: Task> {
  /// Used as the `actor` field in log lines.
  name: &'static str,
  task: T,
  backoff: Backoff,
  items: RwLock<HashMap<OrderId, Arc<WorkItem>>>,
  /// Mirrors `items.len()` so counts can be read without the lock.
  count: AtomicI64,
}

impl<T: Task> Actor<T> {
  /// An empty set named `name`.
  pub fn new(name: &'static str, task: T, backoff: Backoff) -> Self {
    Self {
      name,
      task,
      backoff,
      items: RwLock::new(HashMap::new()),
      count: AtomicI64::new(0),
    }
  }

  /// Actor name.
  pub const fn name(&self) -> &'static str {
    self.name
  }

  /// The task applied on every tick.
  pub const fn task(&self) -> &T {
    &self.task
  }

  /// Insert an item. Adding an id that is already present is a no-op.
  pub async fn add(&self, item: Arc<WorkItem>) -> bool {
    let mut items = self.items.write().await;
    if items.contains_key(item.id()) {
      return false;
    }
    items.insert(item.id().clone(), item);
    self.count.fetch_add(1, Ordering::SeqCst);
    true
  }

  /// Remove an item, returning it if it was present.
  pub async fn delete(&self, id: &str) -> Option<Arc<WorkItem>> {
    let removed = self.items.write().await.remove(id);
    if removed.is_some() {
      self.count.fetch_sub(1, Ordering::SeqCst);
    }
    removed
  }

  /// Number of items currently held.
  pub fn count(&self) -> i64 {
    self.count.load(Ordering::SeqCst)
  }

  /// Whether `id` is in the set.
  pub async fn contains(&self, id: &str) -> bool {
    self.items.read().await.contains_key(id)
  }

  /// Ids currently held, in no particular order.
  pub async fn ids(&self) -> Vec<OrderId> {
    self.items.read().await.keys().cloned().collect()
  }

  /// Apply the task once to every item present at the start of the tick.
  pub async fn tick(&self) -> TickReport {
    let snapshot: Vec<Arc<WorkItem>> = self.items.read().await.values().cloned().collect();
    let mut report = TickReport::default();

    for item in snapshot {
      if !item.is_due(Instant::now()) {
        continue;
      }
      report.visited += 1;

      match self.task.run(&item).await {
        Outcome::Stay => item.reset_backoff(),
        Outcome::Retry(err) => {
          report.retried += 1;
          let failures = item.defer(self.backoff, Instant::now());
          warn!(
            actor = self.name,
            order_id = %item.id(),
            failures,
            error = %err,
            "Transient failure, will retry"
          );
        }
        Outcome::Finished(err) => {
          report.finished += 1;
          self.delete(item.id()).await;
          item.reset_backoff();
          if !item.complete(StageResult::new(err)) {
            error!(
              actor = self.name,
              order_id = %item.id(),
              "Completion already pending, stage result dropped"
            );
          }
        }
        Outcome::Release => {
          self.delete(item.id()).await;
          item.reset_backoff();
          debug!(actor = self.name, order_id = %item.id(), "Released");
        }
      }
    }

    report
  }
}
