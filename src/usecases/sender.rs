//! Sender - Payout Stage
//!
//! Computes the payout for a funded order and submits it through the
//! destination currency's connector. The rate is fixed the first time
//! it is computed and reused on every later attempt.
//!
//! With an intent store configured, the order is persisted with
//! `send_started_at` set before the connector is called. An order that
//! comes back with the marker set but no txid may already have been
//! paid, so it is parked with `SendOutcomeUnknown` instead of re-sent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{ConnectorError, CurrencyError, StageError};
use crate::domain::order::{Status, now_unix};
use crate::domain::pricing;
use crate::domain::work::WorkItem;
use crate::ports::storage::OrderStore;
use crate::usecases::actor::{Outcome, Task};
use crate::usecases::currencies::Currencies;

/// Stage task for `PendingSend` orders.
pub struct SendPayout {
  currencies: Arc<Currencies>,
  /// Where the send intent marker is written; `None` disables it.
  intent_store: Option<Arc<dyn OrderStore>>,
}

impl SendPayout {
  pub fn new(currencies: Arc<Currencies>, intent_store: Option<Arc<dyn OrderStore>>) -> Self {
    Self {
      currencies,
      intent_store,
    }
  }
}

#[async_trait]
impl Task for SendPayout {
  #[instrument(skip_all, fields(order_id = %item.id()))]
  async fn run(&self, item: &Arc<WorkItem>) -> Outcome {
    let mut order = item.order().lock().await;
    if order.status != Status::PendingSend {
      debug!(status = %order.status, "Not waiting to send, handing back");
      return Outcome::Finished(None);
    }

    if order.send_in_doubt() {
      warn!(started_at = order.times.send_started_at, "Earlier send has no recorded txid");
      return Outcome::Finished(Some(StageError::SendOutcomeUnknown {
        started_at: order.times.send_started_at,
      }));
    }

    let payout = order.destination.currency;
    let (value, rate) = match &order.rate {
      Some(rate) => match pricing::convert(order.amount, rate.value, payout) {
        Some(value) if value > 0 => (value, rate.clone()),
        _ => return Outcome::Finished(Some(CurrencyError::ZeroAmount.into())),
      },
      None => match self.currencies.value(order.drop.currency, payout, order.amount).await {
        Ok(priced) => priced,
        Err(e) => return Outcome::Finished(Some(e.into())),
      },
    };
    order.rate = Some(rate);
    order.sent_amount = value;

    if let Some(store) = &self.intent_store {
      let now = now_unix();
      order.times.send_started_at = now;
      order.times.updated_at = now;
      if let Err(e) = store.save_order(&order).await {
        order.times.send_started_at = 0;
        error!(error = %e, "Failed to persist send intent, not sending");
        return Outcome::Retry(StageError::Storage(format!("{e:#}")));
      }
    }

    let address = order.destination.address.clone();
    match self.currencies.send(payout, &address, value).await {
      Ok(txid) => {
        info!(txid = %txid, amount = value, currency = %payout, "Payout sent");
        order.txid = Some(txid);
        order.times.sent_at = now_unix();
        order.status = Status::PendingConfirm;
        Outcome::Finished(None)
      }
      Err(e) => {
        // A refused send moved no funds, so it is safe to try again later.
        if matches!(e, StageError::Connector(ConnectorError::Rejected(_))) {
          order.times.send_started_at = 0;
        }
        Outcome::Finished(Some(e))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::order::{Currency, Rate};
  use crate::usecases::test_support::{MemoryStore, MockConnector, currencies, order, work};

  fn funded(amount: u64) -> Arc<WorkItem> {
    let mut o = order("drop");
    o.status = Status::PendingSend;
    o.amount = amount;
    work(o)
  }

  fn sky_sending(txid: &'static str) -> MockConnector {
    let mut sky = MockConnector::new();
    sky.expect_send().returning(move |_, _| Ok(txid.to_string()));
    sky
  }

  #[tokio::test]
  async fn test_send_reference_payout() {
    let mut sky = MockConnector::new();
    sky
      .expect_send()
      .withf(|address, amount| address == "2GgFvqoyk9RjwVzj8tqfcXVXB4orBwoc9qv" && *amount == 500_000)
      .times(1)
      .returning(|_, _| Ok("tx1".to_string()));
    let task = SendPayout::new(currencies(MockConnector::new(), sky), None);
    let item = funded(100_000);

    assert!(matches!(task.run(&item).await, Outcome::Finished(None)));
    let order = item.order().lock().await;
    assert_eq!(order.status, Status::PendingConfirm);
    assert_eq!(order.txid.as_deref(), Some("tx1"));
    assert_eq!(order.sent_amount, 500_000);
    assert_eq!(order.rate.as_ref().map(|r| r.value), Some(200_000));
    assert!(order.times.sent_at > 0);
  }

  #[tokio::test]
  async fn test_existing_rate_is_reused() {
    let task = SendPayout::new(currencies(MockConnector::new(), sky_sending("tx")), None);
    let item = funded(100_000);
    item.order().lock().await.rate = Some(Rate {
      value: 100_000,
      source: "exchange".into(),
    });

    task.run(&item).await;
    let order = item.order().lock().await;
    assert_eq!(order.sent_amount, 1_000_000);
    assert_eq!(order.rate.as_ref().map(|r| r.source.as_str()), Some("exchange"));
  }

  #[tokio::test]
  async fn test_payout_uses_destination_decimals() {
    let mut btc = MockConnector::new();
    btc
      .expect_send()
      .withf(|address, amount| address == "1BoatSLRHtKNngkdXEeobR76b53LETtpyT" && *amount == 100_000_000)
      .times(1)
      .returning(|_, _| Ok("tx-btc".to_string()));
    let task = SendPayout::new(currencies(btc, MockConnector::new()), None);
    let item = funded(1_000_000);
    {
      let mut o = item.order().lock().await;
      o.drop.currency = Currency::SKY;
      o.destination.currency = Currency::BTC;
      o.destination.address = "1BoatSLRHtKNngkdXEeobR76b53LETtpyT".to_string();
      // One SKY per BTC.
      o.rate = Some(Rate {
        value: 1_000_000,
        source: "exchange".into(),
      });
    }

    assert!(matches!(task.run(&item).await, Outcome::Finished(None)));
    assert_eq!(item.order().lock().await.sent_amount, 100_000_000);
  }

  #[tokio::test]
  async fn test_dust_deposit_is_hard_error() {
    let task = SendPayout::new(currencies(MockConnector::new(), MockConnector::new()), None);
    let item = funded(1_000);

    assert!(matches!(
      task.run(&item).await,
      Outcome::Finished(Some(StageError::Currency(CurrencyError::ZeroAmount)))
    ));
    assert_eq!(item.order().lock().await.status, Status::PendingSend);
  }

  #[tokio::test]
  async fn test_any_send_error_is_hard() {
    let mut sky = MockConnector::new();
    sky
      .expect_send()
      .returning(|_, _| Err(ConnectorError::Unavailable("timeout".into())));
    let task = SendPayout::new(currencies(MockConnector::new(), sky), None);
    let item = funded(100_000);

    assert!(matches!(task.run(&item).await, Outcome::Finished(Some(_))));
    let order = item.order().lock().await;
    assert_eq!(order.status, Status::PendingSend);
    assert!(order.txid.is_none());
  }

  #[tokio::test]
  async fn test_intent_marker_persisted_before_send() {
    let store = Arc::new(MemoryStore::default());
    let task = SendPayout::new(
      currencies(MockConnector::new(), sky_sending("tx")),
      Some(Arc::clone(&store) as Arc<dyn OrderStore>),
    );
    let item = funded(100_000);

    task.run(&item).await;
    let saved = store.saved(item.id()).await.unwrap();
    assert_eq!(saved.status, Status::PendingSend);
    assert!(saved.times.send_started_at > 0);
    assert!(saved.txid.is_none());
  }

  #[tokio::test]
  async fn test_in_doubt_order_is_not_resent() {
    let mut sky = MockConnector::new();
    sky.expect_send().never();
    let task = SendPayout::new(currencies(MockConnector::new(), sky), None);
    let item = funded(100_000);
    item.order().lock().await.times.send_started_at = 42;

    assert!(matches!(
      task.run(&item).await,
      Outcome::Finished(Some(StageError::SendOutcomeUnknown { started_at: 42 }))
    ));
  }

  #[tokio::test]
  async fn test_rejected_send_clears_marker() {
    let mut sky = MockConnector::new();
    sky
      .expect_send()
      .returning(|_, _| Err(ConnectorError::Rejected("insufficient funds".into())));
    let store = Arc::new(MemoryStore::default());
    let task = SendPayout::new(
      currencies(MockConnector::new(), sky),
      Some(Arc::clone(&store) as Arc<dyn OrderStore>),
    );
    let item = funded(100_000);

    task.run(&item).await;
    assert!(!item.order().lock().await.send_in_doubt());
    assert_eq!(item.order().lock().await.times.send_started_at, 0);
  }

  #[tokio::test]
  async fn test_marker_write_failure_blocks_send() {
    let mut sky = MockConnector::new();
    sky.expect_send().never();
    let store = Arc::new(MemoryStore::default());
    store.failing(true);
    let task = SendPayout::new(
      currencies(MockConnector::new(), sky),
      Some(Arc::clone(&store) as Arc<dyn OrderStore>),
    );
    let item = funded(100_000);

    assert!(matches!(task.run(&item).await, Outcome::Retry(StageError::Storage(_))));
    assert_eq!(item.order().lock().await.times.send_started_at, 0);
  }
}
