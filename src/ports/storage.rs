//! Order Store Port - Durable Order Persistence Interface
//!
//! One JSON record per order, overwritten in place on every
//! transition, plus an append-only JSONL audit log of transitions.
//! The router never routes an order before `save_order` returns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::order::{Order, OrderId, Status};

/// A single audit-log entry for one persisted transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
  /// Order the event belongs to.
  pub id: OrderId,
  /// Status after the transition.
  pub status: Status,
  /// Unix seconds.
  pub timestamp: i64,
  /// Hard error reported by the stage, if any.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl OrderEvent {
  /// Event describing the order's current state.
  pub fn of(order: &Order, timestamp: i64, error: Option<String>) -> Self {
    Self {
      id: order.id.clone(),
      status: order.status,
      timestamp,
      error,
    }
  }
}

/// Trait for order persistence providers.
#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
  /// Durably overwrite the order's record (returns after fsync).
  async fn save_order(&self, order: &Order) -> anyhow::Result<()>;

  /// Append one entry to the transition audit log.
  async fn append_event(&self, event: &OrderEvent) -> anyhow::Result<()>;

  /// Read every persisted order record (startup recovery).
  async fn load_orders(&self) -> anyhow::Result<Vec<Order>>;

  /// Read the audit log, oldest first.
  async fn load_events(&self) -> anyhow::Result<Vec<OrderEvent>>;

  /// Check if the store is writable.
  async fn is_healthy(&self) -> bool;
}
