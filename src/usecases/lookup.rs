//! Lookup - Order Indexes for Status Queries
//!
//! Every order ever seen by the model, indexed by id, by drop key
//! (`{currency}:{address}`) and by destination address. Entries are
//! never removed; terminal orders stay queryable.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::order::{Order, OrderId, User};
use crate::domain::work::WorkItem;

#[derive(Default)]
struct Indexes {
  by_id: HashMap<OrderId, Arc<WorkItem>>,
  by_drop: HashMap<String, OrderId>,
  users: BTreeMap<String, Vec<OrderId>>,
}

#[derive(Default)]
pub struct Lookup {
  inner: RwLock<Indexes>,
}

impl Lookup {
  pub fn new() -> Self {
    Self::default()
  }

  /// Index `item`, whose order is `order`. Returns false if the id is known.
  pub async fn insert(&self, item: Arc<WorkItem>, order: &Order) -> bool {
    let mut idx = self.inner.write().await;
    if idx.by_id.contains_key(&order.id) {
      return false;
    }
    idx.by_drop.insert(order.drop.key(), order.id.clone());
    idx
      .users
      .entry(order.destination.address.clone())
      .or_default()
      .push(order.id.clone());
    idx.by_id.insert(order.id.clone(), item);
    true
  }

  pub async fn get(&self, id: &str) -> Option<Arc<WorkItem>> {
    self.inner.read().await.by_id.get(id).cloned()
  }

  /// Order bound to a drop key.
  pub async fn by_drop(&self, key: &str) -> Option<Arc<WorkItem>> {
    let idx = self.inner.read().await;
    idx.by_drop.get(key).and_then(|id| idx.by_id.get(id)).cloned()
  }

  pub async fn items(&self) -> Vec<Arc<WorkItem>> {
    self.inner.read().await.by_id.values().cloned().collect()
  }

  /// Orders grouped by destination address, sorted by address.
  pub async fn users(&self) -> Vec<User> {
    self
      .inner
      .read()
      .await
      .users
      .iter()
      .map(|(address, orders)| User {
        address: address.clone(),
        orders: orders.clone(),
      })
      .collect()
  }

  pub async fn len(&self) -> usize {
    self.inner.read().await.by_id.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.len().await == 0
  }
}
