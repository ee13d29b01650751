//! Shared fixtures for the unit and integration tests.
//!
//! Compiled for the crate's own tests and behind the `test-support`
//! feature for `tests/`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mockall::mock;
use tokio::sync::Mutex;

use crate::domain::order::{Currency, Destination, DropAddress, Order, OrderId, Status};
use crate::domain::pricing::Pricer;
use crate::domain::work::WorkItem;
use crate::ports::connector::{ConnectorResult, CurrencyConnector};
use crate::ports::storage::{OrderEvent, OrderStore};
use crate::usecases::currencies::Currencies;

mock! {
  pub Connector {}

  #[async_trait]
  impl CurrencyConnector for Connector {
    async fn balance(&self, address: &str) -> ConnectorResult<u64>;
    async fn send(&self, address: &str, amount: u64) -> ConnectorResult<String>;
    async fn confirmed(&self, txid: &str) -> ConnectorResult<bool>;
    async fn address(&self) -> ConnectorResult<String>;
    async fn holding(&self) -> ConnectorResult<u64>;
    async fn connected(&self) -> ConnectorResult<bool>;
    async fn stop(&self) -> ConnectorResult<()>;
  }
}

/// In-memory `OrderStore` with switchable write failures.
#[derive(Default)]
pub struct MemoryStore {
  pub orders: Mutex<HashMap<OrderId, Order>>,
  pub events: Mutex<Vec<OrderEvent>>,
  pub fail_writes: AtomicBool,
}

impl MemoryStore {
  pub fn failing(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  pub async fn saved(&self, id: &str) -> Option<Order> {
    self.orders.lock().await.get(id).cloned()
  }

  pub async fn statuses(&self, id: &str) -> Vec<Status> {
    self
      .events
      .lock()
      .await
      .iter()
      .filter(|e| e.id == id)
      .map(|e| e.status)
      .collect()
  }
}

#[async_trait]
impl OrderStore for MemoryStore {
  async fn save_order(&self, order: &Order) -> anyhow::Result<()> {
    anyhow::ensure!(!self.fail_writes.load(Ordering::SeqCst), "disk unavailable");
    self.orders.lock().await.insert(order.id.clone(), order.clone());
    Ok(())
  }

  async fn append_event(&self, event: &OrderEvent) -> anyhow::Result<()> {
    anyhow::ensure!(!self.fail_writes.load(Ordering::SeqCst), "disk unavailable");
    self.events.lock().await.push(event.clone());
    Ok(())
  }

  async fn load_orders(&self) -> anyhow::Result<Vec<Order>> {
    Ok(self.orders.lock().await.values().cloned().collect())
  }

  async fn load_events(&self) -> anyhow::Result<Vec<OrderEvent>> {
    Ok(self.events.lock().await.clone())
  }

  async fn is_healthy(&self) -> bool {
    !self.fail_writes.load(Ordering::SeqCst)
  }
}

/// A BTC to SKY order for drop `drop`.
pub fn order(drop: &str) -> Order {
  Order::new(
    DropAddress {
      address: drop.to_string(),
      currency: Currency::BTC,
    },
    Destination {
      address: "2GgFvqoyk9RjwVzj8tqfcXVXB4orBwoc9qv".to_string(),
      currency: Currency::SKY,
    },
  )
}

/// Wrap an order as a fresh work item, persisted at its current status.
pub fn work(order: Order) -> Arc<WorkItem> {
  let id = order.id.clone();
  let status = order.status;
  WorkItem::new(Arc::new(Mutex::new(order)), id, status)
}

/// Registry with mocked BTC and SKY connectors and the reference BTC price.
pub fn currencies(btc: MockConnector, sky: MockConnector) -> Arc<Currencies> {
  priced_currencies(btc, sky, Arc::new(Pricer::with_internal(200_000)))
}

/// Registry with mocked BTC and SKY connectors and `pricer` for BTC.
pub fn priced_currencies(btc: MockConnector, sky: MockConnector, pricer: Arc<Pricer>) -> Arc<Currencies> {
  let mut curs = Currencies::new();
  curs.add(Currency::BTC, Arc::new(btc)).unwrap();
  curs.add(Currency::SKY, Arc::new(sky)).unwrap();
  curs.add_pricer(Currency::BTC, pricer);
  Arc::new(curs)
}
