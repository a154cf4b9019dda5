//! Topic names and event names used on the live order channels.

use uuid::Uuid;

pub const ORDER_CREATED: &str = "order_created";
pub const ORDER_UPDATED: &str = "order_updated";
pub const ORDER_COMPLETED: &str = "order_completed";
pub const ORDER_CANCELLED: &str = "order_cancelled";
pub const SUBORDER_UPDATED: &str = "suborder_updated";
pub const SUBORDER_COMPLETED: &str = "suborder_completed";

/// Channel carrying `{channel, event, data}` frames for one store.
pub fn store_orders(store_id: Uuid) -> String {
    format!("orders:{}", store_id)
}

/// Channel carrying `{type, payload}` order-feed frames for one store.
pub fn store_order_feed(store_id: Uuid) -> String {
    format!("order_feed:{}", store_id)
}
