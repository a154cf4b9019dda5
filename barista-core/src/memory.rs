//! In-process [`OrderStore`] used by tests and local runs.
//!
//! A scope holds the store-wide lock from `begin` until commit or drop and
//! works on a private copy of the state, so every transaction is serialized
//! and an abandoned scope leaves no trace.

use async_trait::async_trait;
use barista_catalog::{DeductedMap, InventoryUsage, RecipeLine, StockEntry, StockItem, StockLedger};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{Order, OrderStatus, Suborder, SuborderStatus};
use crate::repository::{InventoryScope, OrderScope, OrderStore, StoreError, StoreResult, StoreScope};

/// Committed write counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteStats {
    pub commits: usize,
    pub suborder_status_writes: usize,
    pub order_status_writes: usize,
    pub stock_deductions: usize,
    pub recalculated_items: Vec<StockItem>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    stores: HashMap<Uuid, String>,
    orders: HashMap<Uuid, Order>,
    suborder_index: HashMap<Uuid, Uuid>,
    size_recipes: HashMap<Uuid, Vec<RecipeLine>>,
    additive_recipes: HashMap<Uuid, Vec<RecipeLine>>,
    stock: HashMap<Uuid, StockLedger>,
    availability: HashMap<(Uuid, Uuid), bool>,
    stats: WriteStats,
}

impl MemoryState {
    fn suborder(&self, id: Uuid) -> Option<&Suborder> {
        let order_id = self.suborder_index.get(&id)?;
        self.orders.get(order_id)?.suborders.iter().find(|s| s.id == id)
    }

    fn suborder_mut(&mut self, id: Uuid) -> Option<&mut Suborder> {
        let order_id = self.suborder_index.get(&id)?;
        self.orders.get_mut(order_id)?.suborders.iter_mut().find(|s| s.id == id)
    }

    fn order_header(&self, id: Uuid) -> Option<Order> {
        self.orders.get(&id).map(|order| Order {
            suborders: Vec::new(),
            ..order.clone()
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    state: Arc<Mutex<MemoryState>>,
    rollbacks: Arc<AtomicUsize>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_store(&self, store_id: Uuid, name: impl Into<String>) {
        self.state.lock().await.stores.insert(store_id, name.into());
    }

    pub async fn set_stock(&self, store_id: Uuid, entry: StockEntry) {
        self.state.lock().await.stock.entry(store_id).or_default().insert(entry);
    }

    pub async fn set_size_recipe(&self, product_size_id: Uuid, recipe: Vec<RecipeLine>) {
        self.state.lock().await.size_recipes.insert(product_size_id, recipe);
    }

    pub async fn set_additive_recipe(&self, additive_id: Uuid, recipe: Vec<RecipeLine>) {
        self.state.lock().await.additive_recipes.insert(additive_id, recipe);
    }

    pub async fn stock_quantity(&self, store_id: Uuid, item: StockItem) -> f64 {
        let state = self.state.lock().await;
        state.stock.get(&store_id).map(|l| l.quantity(&item)).unwrap_or(0.0)
    }

    pub async fn is_available(&self, store_id: Uuid, product_size_id: Uuid) -> Option<bool> {
        self.state.lock().await.availability.get(&(store_id, product_size_id)).copied()
    }

    pub async fn stats(&self) -> WriteStats {
        self.state.lock().await.stats.clone()
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreScope>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryScope {
            guard,
            working,
            rollbacks: self.rollbacks.clone(),
        }))
    }

    async fn create_order(&self, order: &Order) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.stores.contains_key(&order.store_id) {
            return Err(StoreError::UnknownReference {
                entity: "store",
                id: order.store_id,
            });
        }
        for suborder in &order.suborders {
            state.suborder_index.insert(suborder.id, order.id);
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn list_active_orders(&self, store_id: Uuid) -> StoreResult<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.store_id == store_id && o.status.is_active())
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

pub struct MemoryScope {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    rollbacks: Arc<AtomicUsize>,
}

#[async_trait]
impl OrderScope for MemoryScope {
    async fn get_suborder_for_update(&mut self, id: Uuid) -> StoreResult<Option<Suborder>> {
        Ok(self.working.suborder(id).cloned())
    }

    async fn get_order_for_update(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.working.order_header(id))
    }

    async fn get_order_by_suborder_id(&mut self, suborder_id: Uuid) -> StoreResult<Option<Order>> {
        let order_id = match self.working.suborder_index.get(&suborder_id) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.working.order_header(order_id))
    }

    async fn get_suborders_by_order_id(&mut self, order_id: Uuid) -> StoreResult<Vec<Suborder>> {
        Ok(self
            .working
            .orders
            .get(&order_id)
            .map(|o| o.suborders.clone())
            .unwrap_or_default())
    }

    async fn update_suborder_status(
        &mut self,
        id: Uuid,
        status: SuborderStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let suborder = self.working.suborder_mut(id).ok_or_else(|| StoreError::Corrupt {
            entity: "suborder",
            id,
            reason: "row vanished inside transaction".to_string(),
        })?;
        suborder.status = status;
        suborder.completed_at = completed_at;
        self.working.stats.suborder_status_writes += 1;
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let order = self.working.orders.get_mut(&id).ok_or_else(|| StoreError::Corrupt {
            entity: "order",
            id,
            reason: "row vanished inside transaction".to_string(),
        })?;
        order.status = status;
        order.completed_at = completed_at;
        self.working.stats.order_status_writes += 1;
        Ok(())
    }

    async fn get_store_name(&mut self, store_id: Uuid) -> StoreResult<String> {
        self.working.stores.get(&store_id).cloned().ok_or_else(|| StoreError::Corrupt {
            entity: "store",
            id: store_id,
            reason: "unknown store".to_string(),
        })
    }
}

#[async_trait]
impl InventoryScope for MemoryScope {
    async fn get_suborder_inventory_usage(&mut self, suborder: &Suborder) -> StoreResult<InventoryUsage> {
        let size_recipe = self
            .working
            .size_recipes
            .get(&suborder.product_size_id)
            .cloned()
            .unwrap_or_default();

        let additive_lines: Vec<RecipeLine> = suborder
            .additives
            .iter()
            .filter_map(|a| self.working.additive_recipes.get(&a.additive_id))
            .flatten()
            .cloned()
            .collect();

        Ok(InventoryUsage::for_suborder(&size_recipe, suborder.quantity, &additive_lines))
    }

    async fn deduct_store_inventory(&mut self, store_id: Uuid, usage: &InventoryUsage) -> StoreResult<DeductedMap> {
        let ledger = self.working.stock.entry(store_id).or_default();
        let deducted = ledger.deduct(usage)?;
        self.working.stats.stock_deductions += 1;
        Ok(deducted)
    }

    async fn recalculate_affected(&mut self, store_id: Uuid, items: &[StockItem]) -> StoreResult<()> {
        let ledger = self.working.stock.get(&store_id).cloned().unwrap_or_default();
        let affected: Vec<(Uuid, bool)> = self
            .working
            .size_recipes
            .iter()
            .filter(|(_, recipe)| recipe.iter().any(|line| items.contains(&line.item)))
            .map(|(size_id, recipe)| (*size_id, ledger.can_produce(recipe)))
            .collect();

        for (size_id, available) in affected {
            self.working.availability.insert((store_id, size_id), available);
        }
        self.working.stats.recalculated_items.extend_from_slice(items);
        Ok(())
    }
}

#[async_trait]
impl StoreScope for MemoryScope {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryScope { mut guard, mut working, .. } = *self;
        working.stats.commits += 1;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
