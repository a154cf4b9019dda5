use barista_core::{Order, SuborderStatus};
use barista_hub::{FeedFrame, HubHandle};
use barista_shared::models::events::{OrderCreatedEvent, OrderStatusEvent, SuborderStatusEvent};
use barista_shared::topics;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::lifecycle::AdvanceOutcome;

/// Turns committed order changes into hub frames.
///
/// Publishing never fails the caller; hub errors are logged.
#[derive(Clone)]
pub struct OrderNotifier {
    hub: HubHandle,
}

impl OrderNotifier {
    pub fn new(hub: HubHandle) -> Self {
        Self { hub }
    }

    pub async fn order_created(&self, order: &Order) {
        let event = OrderCreatedEvent {
            order_id: order.id,
            store_id: order.store_id,
            status: order.status.to_string(),
            total_price_cents: order.total_price_cents,
            suborder_count: order.suborders.len(),
            timestamp: chrono::Utc::now().timestamp(),
        };
        self.publish_event(order.store_id, topics::ORDER_CREATED, &event).await;
        self.publish_feed(order.store_id, FeedFrame::OrderSucceeded(order_payload(order))).await;
    }

    pub async fn suborder_advanced(&self, outcome: &AdvanceOutcome) {
        let order = &outcome.order;
        let suborder = &outcome.suborder;

        let event = SuborderStatusEvent {
            suborder_id: suborder.id,
            order_id: order.id,
            store_id: order.store_id,
            previous_status: outcome.previous_status.to_string(),
            status: suborder.status.to_string(),
            completed_at: suborder.completed_at,
            timestamp: chrono::Utc::now().timestamp(),
        };
        let name = if suborder.status == SuborderStatus::Completed {
            topics::SUBORDER_COMPLETED
        } else {
            topics::SUBORDER_UPDATED
        };
        self.publish_event(order.store_id, name, &event).await;

        if outcome.order_status_changed {
            self.order_status_changed(order).await;
        }
        self.publish_feed(order.store_id, FeedFrame::OrderUpdated(order_payload(order))).await;
    }

    pub async fn order_status_changed(&self, order: &Order) {
        let name = if order.status.is_fulfilled() {
            topics::ORDER_COMPLETED
        } else {
            topics::ORDER_UPDATED
        };
        self.publish_event(order.store_id, name, &status_event(order)).await;
    }

    pub async fn order_cancelled(&self, order: &Order) {
        self.publish_event(order.store_id, topics::ORDER_CANCELLED, &status_event(order)).await;
        self.publish_feed(order.store_id, FeedFrame::OrderDeleted(json!({ "id": order.id }))).await;
    }

    async fn publish_event<T: Serialize>(&self, store_id: Uuid, event: &str, payload: &T) {
        let data = match serde_json::to_value(payload) {
            Ok(data) => data,
            Err(e) => {
                error!(store_id = %store_id, event, "Failed to serialize event: {}", e);
                return;
            }
        };

        let topic = topics::store_orders(store_id);
        match self.hub.publish_event(&topic, event, data).await {
            Ok(delivered) => debug!(topic = %topic, event, delivered, "Event published"),
            Err(e) => warn!(topic = %topic, event, "Failed to publish event: {}", e),
        }
    }

    async fn publish_feed(&self, store_id: Uuid, frame: FeedFrame) {
        let topic = topics::store_order_feed(store_id);
        match self.hub.publish(topic.as_str(), frame).await {
            Ok(delivered) => debug!(topic = %topic, delivered, "Feed frame published"),
            Err(e) => warn!(topic = %topic, "Failed to publish feed frame: {}", e),
        }
    }
}

fn status_event(order: &Order) -> OrderStatusEvent {
    OrderStatusEvent {
        order_id: order.id,
        store_id: order.store_id,
        status: order.status.to_string(),
        completed_at: order.completed_at,
        timestamp: chrono::Utc::now().timestamp(),
    }
}

pub(crate) fn order_payload(order: &Order) -> serde_json::Value {
    serde_json::to_value(order).unwrap_or_else(|e| {
        error!(order_id = %order.id, "Failed to serialize order: {}", e);
        json!({ "id": order.id })
    })
}
