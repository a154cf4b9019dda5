//! Bounded worker pool that delivers low-stock alerts after commit.
//!
//! Alerts are queued without waiting; a full queue drops the alert with a
//! warning. Each delivery runs in its own task so a panicking notifier is
//! reported like any other failure and the worker keeps going.

use barista_core::{LowStockAlert, LowStockNotifier};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct LowStockDispatcher {
    queue: mpsc::Sender<LowStockAlert>,
}

impl LowStockDispatcher {
    pub fn spawn(notifier: Arc<dyn LowStockNotifier>, workers: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..workers.max(1) {
            tokio::spawn(run_worker(worker_id, rx.clone(), notifier.clone()));
        }

        Self { queue: tx }
    }

    /// Returns whether the alert was queued.
    pub fn dispatch(&self, alert: LowStockAlert) -> bool {
        match self.queue.try_send(alert) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(alert)) => {
                warn!(
                    store_id = %alert.store_id,
                    item = %alert.item,
                    "Low-stock queue full, dropping alert"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(alert)) => {
                error!(
                    store_id = %alert.store_id,
                    item = %alert.item,
                    "Low-stock workers are gone, dropping alert"
                );
                false
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<LowStockAlert>>>,
    notifier: Arc<dyn LowStockNotifier>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(alert) = next else {
            break;
        };

        let store_id = alert.store_id;
        let item = alert.item;
        let notifier = notifier.clone();
        let delivery = tokio::spawn(async move { notifier.notify_low_stock(&alert).await });

        match delivery.await {
            Ok(Ok(())) => info!(worker_id, store_id = %store_id, item = %item, "Low-stock alert sent"),
            Ok(Err(e)) => error!(worker_id, store_id = %store_id, item = %item, "Low-stock alert failed: {}", e),
            Err(e) => error!(worker_id, store_id = %store_id, item = %item, "Low-stock alert task aborted: {}", e),
        }
    }
    info!(worker_id, "Low-stock worker stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use barista_catalog::StockItem;
    use barista_core::NotifyError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    fn alert(name: &str) -> LowStockAlert {
        LowStockAlert {
            store_id: Uuid::new_v4(),
            facility_name: "Harbour Street".to_string(),
            item: StockItem::Ingredient(Uuid::new_v4()),
            item_name: name.to_string(),
            remaining: 1.0,
            threshold: 5.0,
        }
    }

    struct Recording(mpsc::UnboundedSender<LowStockAlert>);

    #[async_trait]
    impl LowStockNotifier for Recording {
        async fn notify_low_stock(&self, alert: &LowStockAlert) -> Result<(), NotifyError> {
            let _ = self.0.send(alert.clone());
            Ok(())
        }
    }

    /// Fails on the first call, panics on the second, succeeds afterwards.
    struct Flaky {
        calls: AtomicUsize,
        delivered: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl LowStockNotifier for Flaky {
        async fn notify_low_stock(&self, alert: &LowStockAlert) -> Result<(), NotifyError> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(NotifyError::Delivery {
                    item: alert.item,
                    reason: "mail relay unreachable".to_string(),
                }),
                1 => panic!("notifier bug"),
                _ => {
                    let _ = self.delivered.send(alert.item_name.clone());
                    Ok(())
                }
            }
        }
    }

    #[tokio::test]
    async fn test_alerts_are_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = LowStockDispatcher::spawn(Arc::new(Recording(tx)), 2, 8);

        assert!(dispatcher.dispatch(alert("Oat milk")));
        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(received.item_name, "Oat milk");
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_worker() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            delivered: tx,
        });
        let dispatcher = LowStockDispatcher::spawn(notifier, 1, 8);

        dispatcher.dispatch(alert("first"));
        dispatcher.dispatch(alert("second"));
        dispatcher.dispatch(alert("third"));

        let delivered = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(delivered, "third");
    }
}
