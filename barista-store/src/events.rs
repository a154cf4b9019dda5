use async_trait::async_trait;
use barista_core::{LowStockAlert, LowStockNotifier, NotifyError};
use barista_shared::models::events::LowStockEvent;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Publishes low-stock alerts as JSON keyed by store, so one store's alerts
/// stay ordered within a partition.
pub struct KafkaLowStockNotifier {
    producer: EventProducer,
    topic: String,
}

impl KafkaLowStockNotifier {
    pub fn new(producer: EventProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

pub fn low_stock_event(alert: &LowStockAlert) -> LowStockEvent {
    LowStockEvent {
        store_id: alert.store_id,
        facility_name: alert.facility_name.clone(),
        stock_item_id: alert.item.id(),
        stock_item_kind: alert.item.kind().to_string(),
        stock_item_name: alert.item_name.clone(),
        remaining: alert.remaining,
        threshold: alert.threshold,
        timestamp: chrono::Utc::now().timestamp(),
    }
}

#[async_trait]
impl LowStockNotifier for KafkaLowStockNotifier {
    async fn notify_low_stock(&self, alert: &LowStockAlert) -> Result<(), NotifyError> {
        let delivery_error = |reason: String| NotifyError::Delivery {
            item: alert.item,
            reason,
        };

        let payload = serde_json::to_string(&low_stock_event(alert)).map_err(|e| delivery_error(e.to_string()))?;
        self.producer
            .publish(&self.topic, &alert.store_id.to_string(), &payload)
            .await
            .map_err(|e| delivery_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barista_catalog::StockItem;
    use uuid::Uuid;

    #[test]
    fn test_low_stock_event_shape() {
        let cup = Uuid::new_v4();
        let alert = LowStockAlert {
            store_id: Uuid::new_v4(),
            facility_name: "Harbour Street".to_string(),
            item: StockItem::Provision(cup),
            item_name: "Paper cup 12oz".to_string(),
            remaining: 4.0,
            threshold: 5.0,
        };

        let json = serde_json::to_value(low_stock_event(&alert)).unwrap();
        assert_eq!(json["stock_item_id"], cup.to_string());
        assert_eq!(json["stock_item_kind"], "provision");
        assert_eq!(json["facility_name"], "Harbour Street");
        assert_eq!(json["remaining"], 4.0);
    }
}
