use async_trait::async_trait;
use barista_catalog::{DeductedEntry, StockItem};
use uuid::Uuid;

/// Replenishment alert for one stock entry at or below its threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct LowStockAlert {
    pub store_id: Uuid,
    pub facility_name: String,
    pub item: StockItem,
    pub item_name: String,
    pub remaining: f64,
    pub threshold: f64,
}

impl LowStockAlert {
    pub fn from_deducted(store_id: Uuid, facility_name: &str, entry: &DeductedEntry) -> Self {
        Self {
            store_id,
            facility_name: facility_name.to_string(),
            item: entry.item,
            item_name: entry.name.clone(),
            remaining: entry.remaining,
            threshold: entry.low_stock_threshold,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Low-stock notification for {item} failed: {reason}")]
    Delivery { item: StockItem, reason: String },
}

/// Best-effort sink for low-stock alerts.
#[async_trait]
pub trait LowStockNotifier: Send + Sync {
    async fn notify_low_stock(&self, alert: &LowStockAlert) -> Result<(), NotifyError>;
}
