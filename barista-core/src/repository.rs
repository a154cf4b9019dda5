use async_trait::async_trait;
use barista_catalog::{DeductedMap, InventoryError, InventoryUsage, StockItem};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Order, OrderStatus, Suborder, SuborderStatus};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Corrupt {entity} record {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },

    /// A write named a row that does not exist, such as an unknown store.
    #[error("Unknown {entity} {id}")]
    UnknownReference { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

impl StoreError {
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        StoreError::Backend(err.into())
    }
}

/// Entry point to order persistence.
///
/// Mutations of existing orders only happen through a [`StoreScope`]
/// obtained from [`OrderStore::begin`].
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreScope>>;

    /// Fails with [`StoreError::UnknownReference`] when the order's store does not exist.
    async fn create_order(&self, order: &Order) -> StoreResult<()>;

    /// Order with its suborders.
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>>;

    /// PENDING and PREPARING orders of one store, oldest first.
    async fn list_active_orders(&self, store_id: Uuid) -> StoreResult<Vec<Order>>;
}

/// Order and suborder access inside a transactional scope.
#[async_trait]
pub trait OrderScope: Send {
    /// Loads the suborder and holds its row lock until the scope ends.
    async fn get_suborder_for_update(&mut self, id: Uuid) -> StoreResult<Option<Suborder>>;

    /// Loads the order header (suborders not populated) and holds its row lock.
    async fn get_order_for_update(&mut self, id: Uuid) -> StoreResult<Option<Order>>;

    /// Owning order header of a suborder, row-locked like [`Self::get_order_for_update`].
    async fn get_order_by_suborder_id(&mut self, suborder_id: Uuid) -> StoreResult<Option<Order>>;

    async fn get_suborders_by_order_id(&mut self, order_id: Uuid) -> StoreResult<Vec<Suborder>>;

    async fn update_suborder_status(
        &mut self,
        id: Uuid,
        status: SuborderStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    async fn get_store_name(&mut self, store_id: Uuid) -> StoreResult<String>;
}

/// Stock access inside the same transactional scope as the order writes.
#[async_trait]
pub trait InventoryScope: Send {
    async fn get_suborder_inventory_usage(&mut self, suborder: &Suborder) -> StoreResult<InventoryUsage>;

    /// Deducts all of `usage` or nothing. Short items surface as
    /// [`StoreError::Inventory`].
    async fn deduct_store_inventory(&mut self, store_id: Uuid, usage: &InventoryUsage) -> StoreResult<DeductedMap>;

    /// Refreshes product availability for products using any of `items`.
    async fn recalculate_affected(&mut self, store_id: Uuid, items: &[StockItem]) -> StoreResult<()>;
}

/// A unit of work. Dropping it without [`StoreScope::commit`] discards every write.
#[async_trait]
pub trait StoreScope: OrderScope + InventoryScope {
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
