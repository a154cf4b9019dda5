use async_trait::async_trait;
use barista_core::{
    Order, OrderScope, OrderStatus, OrderStore, StoreError, StoreResult, StoreScope, Suborder, SuborderAdditive,
    SuborderStatus,
};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Postgres-backed [`OrderStore`]. Each scope is one database transaction and
/// `*_for_update` reads take row locks with `FOR UPDATE`.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct OrderRow {
    id: Uuid,
    store_id: Uuid,
    delivery_address_id: Option<Uuid>,
    status: String,
    total_price_cents: i64,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> StoreResult<Order> {
        let status: OrderStatus = self.status.parse().map_err(|e| StoreError::Corrupt {
            entity: "order",
            id: self.id,
            reason: format!("{}", e),
        })?;

        Ok(Order {
            id: self.id,
            store_id: self.store_id,
            delivery_address_id: self.delivery_address_id,
            status,
            total_price_cents: self.total_price_cents,
            completed_at: self.completed_at,
            created_at: self.created_at,
            suborders: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SuborderRow {
    id: Uuid,
    order_id: Uuid,
    product_size_id: Uuid,
    quantity: i32,
    price_cents: i64,
    status: String,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl SuborderRow {
    fn into_suborder(self, additives: Vec<SuborderAdditive>) -> StoreResult<Suborder> {
        let corrupt = |reason: String| StoreError::Corrupt {
            entity: "suborder",
            id: self.id,
            reason,
        };
        let status: SuborderStatus = self.status.parse().map_err(|e| corrupt(format!("{}", e)))?;
        let quantity = u32::try_from(self.quantity).map_err(|_| corrupt(format!("negative quantity {}", self.quantity)))?;

        Ok(Suborder {
            id: self.id,
            order_id: self.order_id,
            product_size_id: self.product_size_id,
            quantity,
            price_cents: self.price_cents,
            status,
            completed_at: self.completed_at,
            additives,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AdditiveRow {
    id: Uuid,
    suborder_id: Uuid,
    additive_id: Uuid,
    name: String,
    price_cents: i64,
}

const ORDER_COLUMNS: &str = "id, store_id, delivery_address_id, status, total_price_cents, completed_at, created_at";
const SUBORDER_COLUMNS: &str = "id, order_id, product_size_id, quantity, price_cents, status, completed_at, created_at";

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::backend(e)
}

/// The only foreign key an order insert can miss is its store.
fn order_insert_error(e: sqlx::Error, store_id: Uuid) -> StoreError {
    if e.as_database_error().is_some_and(|db| db.is_foreign_key_violation()) {
        return StoreError::UnknownReference {
            entity: "store",
            id: store_id,
        };
    }
    backend(e)
}

/// Suborders of the given orders with their additives, oldest first.
async fn load_suborders(conn: &mut PgConnection, order_ids: &[Uuid]) -> StoreResult<Vec<Suborder>> {
    let rows: Vec<SuborderRow> = sqlx::query_as(&format!(
        "SELECT {} FROM suborders WHERE order_id = ANY($1) ORDER BY created_at, id",
        SUBORDER_COLUMNS
    ))
    .bind(order_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(backend)?;

    let suborder_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut additives = load_additives(conn, &suborder_ids).await?;

    rows.into_iter()
        .map(|row| {
            let lines = additives.remove(&row.id).unwrap_or_default();
            row.into_suborder(lines)
        })
        .collect()
}

async fn load_additives(
    conn: &mut PgConnection,
    suborder_ids: &[Uuid],
) -> StoreResult<HashMap<Uuid, Vec<SuborderAdditive>>> {
    if suborder_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<AdditiveRow> = sqlx::query_as(
        "SELECT id, suborder_id, additive_id, name, price_cents FROM suborder_additives WHERE suborder_id = ANY($1) ORDER BY id",
    )
    .bind(suborder_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(backend)?;

    let mut by_suborder: HashMap<Uuid, Vec<SuborderAdditive>> = HashMap::new();
    for row in rows {
        by_suborder.entry(row.suborder_id).or_default().push(SuborderAdditive {
            id: row.id,
            additive_id: row.additive_id,
            name: row.name,
            price_cents: row.price_cents,
        });
    }
    Ok(by_suborder)
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreScope>> {
        let tx = self.pool.begin().await.map_err(backend)?;
        Ok(Box::new(PgScope { tx }))
    }

    async fn create_order(&self, order: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, store_id, delivery_address_id, status, total_price_cents, completed_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id)
        .bind(order.store_id)
        .bind(order.delivery_address_id)
        .bind(order.status.as_str())
        .bind(order.total_price_cents)
        .bind(order.completed_at)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| order_insert_error(e, order.store_id))?;

        for suborder in &order.suborders {
            let quantity = i32::try_from(suborder.quantity).map_err(|_| StoreError::Corrupt {
                entity: "suborder",
                id: suborder.id,
                reason: format!("quantity {} out of range", suborder.quantity),
            })?;

            sqlx::query(
                r#"
                INSERT INTO suborders (id, order_id, product_size_id, quantity, price_cents, status, completed_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(suborder.id)
            .bind(order.id)
            .bind(suborder.product_size_id)
            .bind(quantity)
            .bind(suborder.price_cents)
            .bind(suborder.status.as_str())
            .bind(suborder.completed_at)
            .bind(suborder.created_at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            for additive in &suborder.additives {
                sqlx::query(
                    "INSERT INTO suborder_additives (id, suborder_id, additive_id, name, price_cents) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(additive.id)
                .bind(suborder.id)
                .bind(additive.additive_id)
                .bind(&additive.name)
                .bind(additive.price_cents)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            }
        }

        tx.commit().await.map_err(backend)?;
        debug!(order_id = %order.id, "Order row inserted");
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;

        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = row.into_order()?;
        order.suborders = load_suborders(&mut conn, &[id]).await?;
        Ok(Some(order))
    }

    async fn list_active_orders(&self, store_id: Uuid) -> StoreResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;

        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE store_id = $1 AND status IN ('PENDING', 'PREPARING') ORDER BY created_at, id",
            ORDER_COLUMNS
        ))
        .bind(store_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(backend)?;

        let mut orders = rows.into_iter().map(OrderRow::into_order).collect::<StoreResult<Vec<_>>>()?;
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut suborders: HashMap<Uuid, Vec<Suborder>> = HashMap::new();
        for suborder in load_suborders(&mut conn, &ids).await? {
            suborders.entry(suborder.order_id).or_default().push(suborder);
        }
        for order in &mut orders {
            order.suborders = suborders.remove(&order.id).unwrap_or_default();
        }
        Ok(orders)
    }
}

/// One open transaction. Dropped without commit, sqlx rolls it back.
pub struct PgScope {
    pub(crate) tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderScope for PgScope {
    async fn get_suborder_for_update(&mut self, id: Uuid) -> StoreResult<Option<Suborder>> {
        let row: Option<SuborderRow> =
            sqlx::query_as(&format!("SELECT {} FROM suborders WHERE id = $1 FOR UPDATE", SUBORDER_COLUMNS))
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut additives = load_additives(&mut self.tx, &[id]).await?;
        row.into_suborder(additives.remove(&id).unwrap_or_default()).map(Some)
    }

    async fn get_order_for_update(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS))
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(backend)?;

        row.map(OrderRow::into_order).transpose()
    }

    async fn get_order_by_suborder_id(&mut self, suborder_id: Uuid) -> StoreResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT o.id, o.store_id, o.delivery_address_id, o.status, o.total_price_cents, o.completed_at, o.created_at
            FROM orders o
            JOIN suborders s ON s.order_id = o.id
            WHERE s.id = $1
            FOR UPDATE OF o
            "#,
        )
        .bind(suborder_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(backend)?;

        row.map(OrderRow::into_order).transpose()
    }

    async fn get_suborders_by_order_id(&mut self, order_id: Uuid) -> StoreResult<Vec<Suborder>> {
        load_suborders(&mut self.tx, &[order_id]).await
    }

    async fn update_suborder_status(
        &mut self,
        id: Uuid,
        status: SuborderStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE suborders SET status = $2, completed_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(completed_at)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt {
                entity: "suborder",
                id,
                reason: "row vanished inside transaction".to_string(),
            });
        }
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, completed_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(completed_at)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt {
                entity: "order",
                id,
                reason: "row vanished inside transaction".to_string(),
            });
        }
        Ok(())
    }

    async fn get_store_name(&mut self, store_id: Uuid) -> StoreResult<String> {
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM stores WHERE id = $1")
            .bind(store_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(backend)?;

        name.ok_or_else(|| StoreError::Corrupt {
            entity: "store",
            id: store_id,
            reason: "unknown store".to_string(),
        })
    }
}

#[async_trait]
impl StoreScope for PgScope {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(backend)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(backend)
    }
}
