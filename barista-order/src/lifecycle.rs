use barista_catalog::{DeductedMap, InventoryError, StockItem};
use barista_core::{
    LowStockAlert, Order, OrderStatus, OrderStore, StoreError, StoreScope, Suborder, SuborderStatus,
};
use chrono::Utc;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LifecycleError, LifecycleResult};
use crate::low_stock::LowStockDispatcher;
use crate::notifier::OrderNotifier;
use crate::status::{plan_order_status, OrderStatusChange};

/// What one committed advance did.
#[derive(Debug, Clone)]
pub struct AdvanceOutcome {
    pub suborder: Suborder,
    pub previous_status: SuborderStatus,
    /// The owning order after the advance, suborders included.
    pub order: Order,
    pub order_status_changed: bool,
    pub deducted: DeductedMap,
    pub low_stock: Vec<LowStockAlert>,
}

/// Drives suborder status changes and everything that has to commit with them.
pub struct LifecycleManager {
    store: Arc<dyn OrderStore>,
    notifier: OrderNotifier,
    low_stock: LowStockDispatcher,
    operation_timeout: Duration,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn OrderStore>,
        notifier: OrderNotifier,
        low_stock: LowStockDispatcher,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            low_stock,
            operation_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn notifier(&self) -> &OrderNotifier {
        &self.notifier
    }

    /// Persists a freshly placed order and announces it.
    pub async fn place_order(&self, mut order: Order) -> LifecycleResult<Order> {
        order.total_price_cents = order.calculate_total().map_err(|e| LifecycleError::InvalidOrder {
            order_id: order.id,
            reason: e.to_string(),
        })?;
        match self.store.create_order(&order).await {
            Ok(()) => {}
            Err(e @ StoreError::UnknownReference { .. }) => {
                return Err(LifecycleError::InvalidOrder {
                    order_id: order.id,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(LifecycleError::store("order", order.id, e)),
        }

        info!(order_id = %order.id, store_id = %order.store_id, suborders = order.suborders.len(), "Order placed");
        self.notifier.order_created(&order).await;
        Ok(order)
    }

    /// Moves a suborder one step along PENDING → PREPARING → COMPLETED.
    ///
    /// Status write, stock deduction (on completion) and order re-aggregation
    /// commit together or not at all. Hub events and low-stock alerts go out
    /// only after commit.
    pub async fn advance_suborder(&self, suborder_id: Uuid) -> LifecycleResult<AdvanceOutcome> {
        let outcome = self
            .within_deadline::<AdvanceOutcome, _>("suborder", suborder_id, |scope| {
                Box::pin(advance_in_scope(scope, suborder_id))
            })
            .await?;

        info!(
            suborder_id = %suborder_id,
            order_id = %outcome.order.id,
            from = %outcome.previous_status,
            to = %outcome.suborder.status,
            order_status = %outcome.order.status,
            "Suborder advanced"
        );

        for alert in &outcome.low_stock {
            self.low_stock.dispatch(alert.clone());
        }
        self.notifier.suborder_advanced(&outcome).await;

        Ok(outcome)
    }

    /// Recomputes an order's status from its suborders. Returns the new status
    /// when a write happened, `None` when the stored status was already right.
    pub async fn reaggregate_order(&self, order_id: Uuid) -> LifecycleResult<Option<OrderStatus>> {
        let updated = self
            .within_deadline::<Option<Order>, _>("order", order_id, |scope| {
                Box::pin(reaggregate_in_scope(scope, order_id))
            })
            .await?;

        match updated {
            Some(order) => {
                self.notifier.order_status_changed(&order).await;
                Ok(Some(order.status))
            }
            None => Ok(None),
        }
    }

    /// Imposes CANCELLED. Cancelling twice is a no-op; fulfilled orders are
    /// rejected.
    pub async fn cancel_order(&self, order_id: Uuid) -> LifecycleResult<Order> {
        let (order, changed) = self
            .within_deadline::<(Order, bool), _>("order", order_id, |scope| {
                Box::pin(cancel_in_scope(scope, order_id))
            })
            .await?;

        if changed {
            info!(order_id = %order_id, store_id = %order.store_id, "Order cancelled");
            self.notifier.order_cancelled(&order).await;
        }
        Ok(order)
    }

    async fn begin(&self, entity: &'static str, id: Uuid) -> LifecycleResult<Box<dyn StoreScope>> {
        self.store.begin().await.map_err(|e| LifecycleError::store(entity, id, e))
    }

    /// Runs `work` in a fresh scope, then commits it or rolls it back.
    ///
    /// The deadline covers lock waits and the work itself. Expiry drops the
    /// scope, which rolls it back. A commit that has started always runs to
    /// completion, so `Timeout` never hides a committed write.
    async fn within_deadline<T, W>(&self, entity: &'static str, id: Uuid, work: W) -> LifecycleResult<T>
    where
        W: for<'s> FnOnce(&'s mut dyn StoreScope) -> BoxFuture<'s, LifecycleResult<T>>,
    {
        let attempt = async {
            let mut scope = self.begin(entity, id).await?;
            let result = work(scope.as_mut()).await;
            Ok::<_, LifecycleError>((scope, result))
        };

        match tokio::time::timeout(self.operation_timeout, attempt).await {
            Ok(Ok((scope, result))) => finish(scope, result, entity, id).await,
            Ok(Err(err)) => Err(err),
            Err(_) => {
                warn!(entity, id = %id, after = ?self.operation_timeout, "Operation timed out, rolled back");
                Err(LifecycleError::Timeout {
                    entity,
                    id,
                    after: self.operation_timeout,
                })
            }
        }
    }
}

async fn finish<T>(
    scope: Box<dyn StoreScope>,
    result: LifecycleResult<T>,
    entity: &'static str,
    id: Uuid,
) -> LifecycleResult<T> {
    match result {
        Ok(value) => {
            scope.commit().await.map_err(|e| LifecycleError::store(entity, id, e))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = scope.rollback().await {
                warn!(entity, id = %id, "Rollback failed: {}", rollback_err);
            }
            debug!(entity, id = %id, "Rolled back: {}", err);
            Err(err)
        }
    }
}

async fn advance_in_scope(scope: &mut dyn StoreScope, suborder_id: Uuid) -> LifecycleResult<AdvanceOutcome> {
    let store_err = |e: StoreError| LifecycleError::store("suborder", suborder_id, e);

    // Row lock on the suborder first, then on its order: concurrent advances
    // of the same suborder queue here, and completions of sibling suborders
    // cannot both miss each other during re-aggregation.
    let suborder = scope
        .get_suborder_for_update(suborder_id)
        .await
        .map_err(store_err)?
        .ok_or(LifecycleError::SuborderNotFound(suborder_id))?;

    let mut order = scope
        .get_order_by_suborder_id(suborder_id)
        .await
        .map_err(store_err)?
        .ok_or(LifecycleError::OrderNotFound(suborder.order_id))?;

    if order.status == OrderStatus::Cancelled {
        return Err(LifecycleError::OrderClosed {
            order_id: order.id,
            status: order.status,
        });
    }

    let previous_status = suborder.status;
    let next = previous_status.next().ok_or(LifecycleError::InvalidTransition {
        suborder_id,
        from: previous_status,
    })?;
    let completed_at = next.is_terminal().then(Utc::now);

    scope
        .update_suborder_status(suborder_id, next, completed_at)
        .await
        .map_err(store_err)?;

    let mut deducted = DeductedMap::new();
    let mut low_stock = Vec::new();
    if next == SuborderStatus::Completed {
        deducted = deduct_for_suborder(scope, &suborder, &order).await?;
        low_stock = collect_low_stock(scope, order.store_id, &deducted)
            .await
            .map_err(store_err)?;
    }

    let suborders = scope.get_suborders_by_order_id(order.id).await.map_err(store_err)?;
    let change = write_order_status(scope, &order, &suborders).await.map_err(store_err)?;
    if let Some(change) = change {
        order.status = change.status;
        order.completed_at = change.completed_at;
    }
    order.suborders = suborders;

    let mut suborder = suborder;
    suborder.status = next;
    suborder.completed_at = completed_at;

    Ok(AdvanceOutcome {
        suborder,
        previous_status,
        order,
        order_status_changed: change.is_some(),
        deducted,
        low_stock,
    })
}

async fn deduct_for_suborder(scope: &mut dyn StoreScope, suborder: &Suborder, order: &Order) -> LifecycleResult<DeductedMap> {
    let usage = scope
        .get_suborder_inventory_usage(suborder)
        .await
        .map_err(|e| LifecycleError::store("suborder", suborder.id, e))?;

    debug!(suborder_id = %suborder.id, items = usage.len(), "Deducting stock");

    match scope.deduct_store_inventory(order.store_id, &usage).await {
        Ok(deducted) => Ok(deducted),
        Err(StoreError::Inventory(InventoryError::InsufficientStock { shortages })) => {
            warn!(
                suborder_id = %suborder.id,
                order_id = %order.id,
                short = shortages.len(),
                "Cannot complete suborder, stock too low"
            );
            Err(LifecycleError::InsufficientStock {
                suborder_id: suborder.id,
                order_id: order.id,
                shortages,
            })
        }
        Err(e) => Err(LifecycleError::store("suborder", suborder.id, e)),
    }
}

/// Refreshes availability for the items that crossed their threshold and
/// builds the alerts to send after commit.
async fn collect_low_stock(
    scope: &mut dyn StoreScope,
    store_id: Uuid,
    deducted: &DeductedMap,
) -> Result<Vec<LowStockAlert>, StoreError> {
    let low: Vec<_> = deducted.values().filter(|entry| entry.is_low()).collect();
    if low.is_empty() {
        return Ok(Vec::new());
    }

    let items: Vec<StockItem> = low.iter().map(|entry| entry.item).collect();
    scope.recalculate_affected(store_id, &items).await?;

    // The name only labels the alert; a failed lookup must not undo the completion.
    let facility_name = match scope.get_store_name(store_id).await {
        Ok(name) => name,
        Err(e) => {
            warn!(store_id = %store_id, "Store name unavailable for low-stock alert: {}", e);
            store_id.to_string()
        }
    };

    Ok(low
        .into_iter()
        .map(|entry| LowStockAlert::from_deducted(store_id, &facility_name, entry))
        .collect())
}

async fn write_order_status(
    scope: &mut dyn StoreScope,
    order: &Order,
    suborders: &[Suborder],
) -> Result<Option<OrderStatusChange>, StoreError> {
    let Some(change) = plan_order_status(order, suborders, Utc::now()) else {
        debug!(order_id = %order.id, status = %order.status, "Order status unchanged");
        return Ok(None);
    };

    scope
        .update_order_status(order.id, change.status, change.completed_at)
        .await?;
    debug!(order_id = %order.id, from = %order.status, to = %change.status, "Order status updated");
    Ok(Some(change))
}

async fn reaggregate_in_scope(scope: &mut dyn StoreScope, order_id: Uuid) -> LifecycleResult<Option<Order>> {
    let store_err = |e: StoreError| LifecycleError::store("order", order_id, e);

    let mut order = scope
        .get_order_for_update(order_id)
        .await
        .map_err(store_err)?
        .ok_or(LifecycleError::OrderNotFound(order_id))?;
    let suborders = scope.get_suborders_by_order_id(order_id).await.map_err(store_err)?;

    match write_order_status(scope, &order, &suborders).await.map_err(store_err)? {
        Some(change) => {
            order.status = change.status;
            order.completed_at = change.completed_at;
            order.suborders = suborders;
            Ok(Some(order))
        }
        None => Ok(None),
    }
}

async fn cancel_in_scope(scope: &mut dyn StoreScope, order_id: Uuid) -> LifecycleResult<(Order, bool)> {
    let store_err = |e: StoreError| LifecycleError::store("order", order_id, e);

    let mut order = scope
        .get_order_for_update(order_id)
        .await
        .map_err(store_err)?
        .ok_or(LifecycleError::OrderNotFound(order_id))?;
    order.suborders = scope.get_suborders_by_order_id(order_id).await.map_err(store_err)?;

    match order.status {
        OrderStatus::Cancelled => return Ok((order, false)),
        status if status.is_fulfilled() => {
            return Err(LifecycleError::OrderClosed { order_id, status });
        }
        _ => {}
    }

    scope
        .update_order_status(order_id, OrderStatus::Cancelled, None)
        .await
        .map_err(store_err)?;
    order.status = OrderStatus::Cancelled;
    order.completed_at = None;
    Ok((order, true))
}
