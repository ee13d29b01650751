//! Event Log - Append-only JSONL Transition Audit
//!
//! Every persisted transition appends one line to `events.jsonl`. Each
//! line is a self-contained JSON object; appends are serialized and
//! fsynced before returning.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::ports::storage::OrderEvent;

/// Append-only audit log of order transitions.
pub struct EventLog {
    path: PathBuf,
    /// Serializes appends so lines never interleave.
    write_lock: Mutex<()>,
}

impl EventLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("events.jsonl"),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event and sync it to disk.
    #[instrument(skip(self, event), fields(order_id = %event.id, status = %event.status))]
    pub async fn append(&self, event: &OrderEvent) -> Result<()> {
        let mut line = serde_json::to_string(event).context("Failed to serialize order event")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context("Failed to open event log")?;

        file.write_all(line.as_bytes())
            .await
            .context("Failed to write order event")?;
        file.sync_data().await.context("Failed to sync event log")?;

        Ok(())
    }

    /// Read every event, oldest first. Malformed lines are skipped.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<OrderEvent>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .context("Failed to read event log")?;

        let mut events = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<OrderEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(line = n + 1, error = %e, "Skipping malformed event"),
            }
        }

        info!(count = events.len(), "Loaded order events");
        Ok(events)
    }
}
