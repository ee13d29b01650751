//! Order Records - Atomic Per-order JSON Files
//!
//! Each order lives in `orders/{id}.json`. Writes go to a sibling tmp
//! file, are fsynced, then renamed over the record, so a crash leaves
//! either the previous or the new version on disk, never a torn one.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::domain::order::Order;

const RECORD_EXT: &str = "json";

/// Directory of per-order JSON records.
pub struct OrderRecords {
    dir: PathBuf,
}

impl OrderRecords {
    /// Open (and create if needed) `orders/` under `data_dir`.
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let dir = data_dir.join("orders");
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record path for `id`. Rejects ids that are not well formed.
    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        anyhow::ensure!(
            Order::parse_id(id).is_some() && !id.contains(['/', '\\']) && !id.starts_with('.'),
            "Invalid order id for a record name: {id}"
        );
        Ok(self.dir.join(format!("{id}.{RECORD_EXT}")))
    }

    /// Durably replace the record of `order`.
    #[instrument(skip(self, order), fields(order_id = %order.id, status = %order.status))]
    pub async fn save(&self, order: &Order) -> Result<()> {
        let path = self.path_for(&order.id)?;
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(order).context("Failed to serialize order")?;

        let mut file = File::create(&tmp)
            .await
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(&json)
            .await
            .context("Failed to write order record")?;
        file.sync_all().await.context("Failed to sync order record")?;
        drop(file);

        fs::rename(&tmp, &path)
            .await
            .context("Failed to rename order record")?;
        sync_dir(&self.dir).await?;

        debug!("Order record saved");
        Ok(())
    }

    /// Read every record. Malformed or misnamed files are skipped.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<Order>> {
        let mut orders = Vec::new();
        let mut entries = fs::read_dir(&self.dir)
            .await
            .context("Failed to list order records")?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != RECORD_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let content = fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_slice::<Order>(&content) {
                Ok(order) if order.id == stem => orders.push(order),
                Ok(order) => warn!(
                    file = %path.display(),
                    order_id = %order.id,
                    "Skipping record whose id does not match its file name"
                ),
                Err(e) => warn!(
                    file = %path.display(),
                    error = %e,
                    "Skipping malformed order record"
                ),
            }
        }

        orders.sort_by(|a, b| a.times.created_at.cmp(&b.times.created_at).then_with(|| a.id.cmp(&b.id)));
        info!(count = orders.len(), "Loaded order records");
        Ok(orders)
    }
}

/// Make a rename in `dir` durable.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .await
        .context("Failed to open data directory")?
        .sync_all()
        .await
        .context("Failed to sync data directory")
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
