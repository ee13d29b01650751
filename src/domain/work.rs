//! Work items moved between actors.
//!
//! A `WorkItem` pairs one shared order with a reusable capacity-1
//! completion channel. A stage reports exactly one `StageResult` on it
//! when it finishes with the order; the router drains it, persists, and
//! hands the item to the next stage.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError};

use super::errors::StageError;
use super::order::{Order, OrderId, Status, now_unix};

/// An order shared between its owning actor and status readers.
pub type SharedOrder = Arc<tokio::sync::Mutex<Order>>;

/// Outcome of one stage, delivered to the router.
#[derive(Debug)]
pub struct StageResult {
    /// Unix seconds at which the stage finished.
    pub finished_at: i64,
    /// Hard failure, if the stage gave up.
    pub error: Option<StageError>,
}

impl StageResult {
    /// A result stamped with the current time.
    pub fn new(error: Option<StageError>) -> Self {
        Self {
            finished_at: now_unix(),
            error,
        }
    }
}

/// Exponential backoff for transient faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first fault.
    pub base: Duration,
    /// Cap on the doubled delay.
    pub max: Duration,
}

impl Backoff {
    /// Zero base disables backoff: every tick retries.
    pub const fn is_enabled(&self) -> bool {
        !self.base.is_zero()
    }

    /// Delay after `failures` consecutive transient faults.
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        self.base.saturating_mul(1 << exp).min(self.max.max(self.base))
    }
}

#[derive(Debug, Default)]
struct RetryState {
    failures: u32,
    not_before: Option<Instant>,
}

/// One order in flight plus its completion channel.
#[derive(Debug)]
pub struct WorkItem {
    /// Copy of `order.id`, readable without locking the order.
    id: OrderId,
    order: SharedOrder,
    /// Capacity 1: at most one unread stage result at a time.
    done_tx: mpsc::Sender<StageResult>,
    done_rx: Mutex<mpsc::Receiver<StageResult>>,
    /// Transient fault count and the earliest time of the next attempt.
    retry: Mutex<RetryState>,
    /// Status of the last durable record, tracked by the router.
    persisted: Mutex<Status>,
}

impl WorkItem {
    /// Wrap an order whose current status is already on disk.
    pub fn new(order: SharedOrder, id: OrderId, persisted: Status) -> Arc<Self> {
        let (done_tx, done_rx) = mpsc::channel(1);
        Arc::new(Self {
            id,
            order,
            done_tx,
            done_rx: Mutex::new(done_rx),
            retry: Mutex::new(RetryState::default()),
            persisted: Mutex::new(persisted),
        })
    }

    /// The order id, available without taking the order lock.
    pub fn id(&self) -> &OrderId {
        &self.id
    }

    /// The shared order. Stage tasks lock it for the length of one run.
    pub const fn order(&self) -> &SharedOrder {
        &self.order
    }

    /// Report a stage outcome. Returns false if a result is already queued.
    pub fn complete(&self, result: StageResult) -> bool {
        match self.done_tx.try_send(result) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => false,
        }
    }

    /// Take the queued stage outcome, if any, without waiting.
    pub fn take_result(&self) -> Option<StageResult> {
        self.done_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()
    }

    // ── Backoff bookkeeping ──────────────────────────────

    /// Whether the item may be processed at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        let retry = self.retry.lock().unwrap_or_else(PoisonError::into_inner);
        retry.not_before.is_none_or(|t| now >= t)
    }

    /// Record a transient fault and schedule the next attempt.
    pub fn defer(&self, backoff: Backoff, now: Instant) -> u32 {
        let mut retry = self.retry.lock().unwrap_or_else(PoisonError::into_inner);
        retry.failures = retry.failures.saturating_add(1);
        if backoff.is_enabled() {
            retry.not_before = Some(now + backoff.delay(retry.failures));
        }
        retry.failures
    }

    /// Forget past transient faults.
    pub fn reset_backoff(&self) {
        let mut retry = self.retry.lock().unwrap_or_else(PoisonError::into_inner);
        retry.failures = 0;
        retry.not_before = None;
    }

    // ── Durable status tracking ──────────────────────────

    /// Status of the last record the router wrote.
    pub fn persisted_status(&self) -> Status {
        *self.persisted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by the router after a successful write.
    pub fn set_persisted_status(&self, status: Status) {
        *self.persisted.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Currency, Destination, DropAddress};

    fn item() -> Arc<WorkItem> {
        let order = Order::new(
            DropAddress {
                address: "drop".into(),
                currency: Currency::BTC,
            },
            Destination {
                address: "dest".into(),
                currency: Currency::SKY,
            },
        );
        let id = order.id.clone();
        WorkItem::new(Arc::new(tokio::sync::Mutex::new(order)), id, Status::PendingDeposit)
    }

    #[test]
    fn test_completion_channel_holds_one_result() {
        let work = item();
        assert!(work.take_result().is_none());
        assert!(work.complete(StageResult::new(None)));
        assert!(!work.complete(StageResult::new(None)));

        let result = work.take_result().unwrap();
        assert!(result.error.is_none());
        assert!(result.finished_at > 0);
        assert!(work.take_result().is_none());

        // The channel is reused for the next stage.
        assert!(work.complete(StageResult::new(Some(StageError::MissingTxid))));
        assert!(work.take_result().unwrap().error.is_some());
    }

    #[test]
    fn test_backoff_delay_is_bounded() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
        assert_eq!(backoff.delay(5), Duration::from_secs(1));
        assert_eq!(backoff.delay(60), Duration::from_secs(1));
    }

    #[test]
    fn test_defer_respects_disabled_backoff() {
        let work = item();
        let now = Instant::now();
        let disabled = Backoff {
            base: Duration::ZERO,
            max: Duration::ZERO,
        };
        assert_eq!(work.defer(disabled, now), 1);
        assert!(work.is_due(now));

        let enabled = Backoff {
            base: Duration::from_secs(10),
            max: Duration::from_secs(60),
        };
        assert_eq!(work.defer(enabled, now), 2);
        assert!(!work.is_due(now));
        assert!(work.is_due(now + Duration::from_secs(21)));

        work.reset_backoff();
        assert!(work.is_due(now));
    }
}
