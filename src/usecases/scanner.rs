//! Scanner - Deposit Detection Stage
//!
//! Polls the balance of each waiting order's drop address. A non-zero
//! balance records the deposit and moves the order to `PendingSend`.
//! An order still unfunded when its deposit window closes is expired.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::order::{Status, now_unix};
use crate::domain::work::WorkItem;
use crate::usecases::actor::{Outcome, Task};
use crate::usecases::currencies::Currencies;

/// Stage task for `PendingDeposit` orders.
pub struct DepositScan {
  currencies: Arc<Currencies>,
  /// Deposit window in seconds, measured from order creation; 0 disables.
  expiration_secs: i64,
}

impl DepositScan {
  pub const fn new(currencies: Arc<Currencies>, expiration_secs: i64) -> Self {
    Self {
      currencies,
      expiration_secs,
    }
  }
}

#[async_trait]
impl Task for DepositScan {
  async fn run(&self, item: &Arc<WorkItem>) -> Outcome {
    let mut order = item.order().lock().await;
    if order.status != Status::PendingDeposit {
      debug!(order_id = %order.id, status = %order.status, "Not waiting for a deposit, handing back");
      return Outcome::Finished(None);
    }

    let balance = match self.currencies.balance(&order.drop).await {
      Ok(balance) => balance,
      Err(e) => return Outcome::from_error(e),
    };

    let now = now_unix();
    if balance > 0 {
      order.amount = balance;
      order.times.deposited_at = now;
      order.status = Status::PendingSend;
      info!(order_id = %order.id, amount = balance, "Deposit detected");
      return Outcome::Finished(None);
    }

    if order.is_expired(now, self.expiration_secs) {
      order.status = Status::Expired;
      info!(order_id = %order.id, created_at = order.times.created_at, "Deposit window closed");
      return Outcome::Finished(None);
    }

    Outcome::Stay
  }
}
