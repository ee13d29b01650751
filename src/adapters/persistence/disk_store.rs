//! Disk Store - `OrderStore` over Records and Event Log
//!
//! Wraps `OrderRecords` (atomic per-order JSON) and `EventLog`
//! (append-only JSONL) into the single `OrderStore` the pipeline uses.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

use super::events::EventLog;
use super::records::OrderRecords;
use crate::domain::order::Order;
use crate::ports::storage::{OrderEvent, OrderStore};

/// File-backed order store rooted at a data directory.
pub struct DiskStore {
    records: OrderRecords,
    events: EventLog,
}

impl DiskStore {
    /// Open the store, creating `data_dir` and `orders/` as needed.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;
        Ok(Self {
            records: OrderRecords::new(dir).await?,
            events: EventLog::new(dir),
        })
    }

    pub const fn records(&self) -> &OrderRecords {
        &self.records
    }

    pub const fn events(&self) -> &EventLog {
        &self.events
    }
}

#[async_trait]
impl OrderStore for DiskStore {
    async fn save_order(&self, order: &Order) -> Result<()> {
        self.records.save(order).await
    }

    async fn append_event(&self, event: &OrderEvent) -> Result<()> {
        self.events.append(event).await
    }

    async fn load_orders(&self) -> Result<Vec<Order>> {
        self.records.load_all().await
    }

    async fn load_events(&self) -> Result<Vec<OrderEvent>> {
        self.events.load_all().await
    }

    /// Writable if a probe file can be created and removed.
    async fn is_healthy(&self) -> bool {
        let probe = self.records.dir().join(".health_check");
        let result = fs::write(&probe, b"ok").await;
        let _ = fs::remove_file(&probe).await;
        result.is_ok()
    }
}
