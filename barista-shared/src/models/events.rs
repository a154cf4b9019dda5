use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub store_id: Uuid,
    pub status: String,
    pub total_price_cents: i64,
    pub suborder_count: usize,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SuborderStatusEvent {
    pub suborder_id: Uuid,
    pub order_id: Uuid,
    pub store_id: Uuid,
    pub previous_status: String,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderStatusEvent {
    pub order_id: Uuid,
    pub store_id: Uuid,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub timestamp: i64,
}

/// Published to the message bus when a stock entry drops to its threshold.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct LowStockEvent {
    pub store_id: Uuid,
    pub facility_name: String,
    pub stock_item_id: Uuid,
    pub stock_item_kind: String,
    pub stock_item_name: String,
    pub remaining: f64,
    pub threshold: f64,
    pub timestamp: i64,
}
