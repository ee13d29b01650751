//! Monitor - Payout Confirmation Stage
//!
//! Polls the destination chain until the payout transaction is
//! confirmed, then marks the order `Done`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::errors::StageError;
use crate::domain::order::{Status, now_unix};
use crate::domain::work::WorkItem;
use crate::usecases::actor::{Outcome, Task};
use crate::usecases::currencies::Currencies;

/// Stage task for `PendingConfirm` orders.
pub struct Confirm {
  currencies: Arc<Currencies>,
}

impl Confirm {
  pub const fn new(currencies: Arc<Currencies>) -> Self {
    Self { currencies }
  }
}

#[async_trait]
impl Task for Confirm {
  async fn run(&self, item: &Arc<WorkItem>) -> Outcome {
    let mut order = item.order().lock().await;
    if order.status != Status::PendingConfirm {
      debug!(order_id = %order.id, status = %order.status, "Not waiting to confirm, handing back");
      return Outcome::Finished(None);
    }

    let Some(txid) = order.txid.clone() else {
      return Outcome::Finished(Some(StageError::MissingTxid));
    };

    match self.currencies.confirmed(order.destination.currency, &txid).await {
      Ok(true) => {
        order.times.confirmed_at = now_unix();
        order.status = Status::Done;
        info!(order_id = %order.id, txid = %txid, "Payout confirmed");
        Outcome::Finished(None)
      }
      Ok(false) => Outcome::Stay,
      Err(e) => Outcome::from_error(e),
    }
  }
}
