use async_trait::async_trait;
use barista_catalog::{plan_deduction, DeductedMap, InventoryUsage, RecipeLine, StockEntry, StockItem};
use barista_core::{InventoryScope, StoreError, StoreResult, Suborder};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::order_repo::PgScope;

#[derive(sqlx::FromRow)]
struct RecipeRow {
    item_kind: String,
    item_id: Uuid,
    quantity: f64,
}

impl RecipeRow {
    fn into_line(self, owner: Uuid) -> StoreResult<RecipeLine> {
        let item = StockItem::from_parts(&self.item_kind, self.item_id).ok_or_else(|| StoreError::Corrupt {
            entity: "recipe",
            id: owner,
            reason: format!("unknown stock item kind {:?}", self.item_kind),
        })?;
        Ok(RecipeLine::new(item, self.quantity))
    }
}

#[derive(sqlx::FromRow)]
struct StockRow {
    item_kind: String,
    item_id: Uuid,
    name: String,
    quantity: f64,
    low_stock_threshold: f64,
}

/// Parallel arrays for `UNNEST($n::text[], $m::uuid[])`.
fn item_keys<'a>(items: impl IntoIterator<Item = &'a StockItem>) -> (Vec<String>, Vec<Uuid>) {
    items
        .into_iter()
        .map(|item| (item.kind().to_string(), item.id()))
        .unzip()
}

#[async_trait]
impl InventoryScope for PgScope {
    async fn get_suborder_inventory_usage(&mut self, suborder: &Suborder) -> StoreResult<InventoryUsage> {
        let size_rows: Vec<RecipeRow> = sqlx::query_as(
            "SELECT item_kind, item_id, quantity FROM product_size_recipes WHERE product_size_id = $1",
        )
        .bind(suborder.product_size_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        // One recipe per additive line, so an additive ordered twice counts twice.
        let additive_rows: Vec<RecipeRow> = sqlx::query_as(
            r#"
            SELECT r.item_kind, r.item_id, r.quantity
            FROM suborder_additives sa
            JOIN additive_recipes r ON r.additive_id = sa.additive_id
            WHERE sa.suborder_id = $1
            "#,
        )
        .bind(suborder.id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        let size_recipe = size_rows
            .into_iter()
            .map(|row| row.into_line(suborder.product_size_id))
            .collect::<StoreResult<Vec<_>>>()?;
        let additive_recipes = additive_rows
            .into_iter()
            .map(|row| row.into_line(suborder.id))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(InventoryUsage::for_suborder(&size_recipe, suborder.quantity, &additive_recipes))
    }

    async fn deduct_store_inventory(&mut self, store_id: Uuid, usage: &InventoryUsage) -> StoreResult<DeductedMap> {
        if usage.is_empty() {
            return Ok(DeductedMap::new());
        }

        let items: Vec<StockItem> = usage.items().collect();
        let (kinds, ids) = item_keys(&items);

        // Rows are locked in key order so concurrent deductions cannot deadlock.
        let rows: Vec<StockRow> = sqlx::query_as(
            r#"
            SELECT s.item_kind, s.item_id, s.name, s.quantity, s.low_stock_threshold
            FROM store_stock s
            JOIN UNNEST($2::text[], $3::uuid[]) AS u(item_kind, item_id)
              ON s.item_kind = u.item_kind AND s.item_id = u.item_id
            WHERE s.store_id = $1
            ORDER BY s.item_kind, s.item_id
            FOR UPDATE OF s
            "#,
        )
        .bind(store_id)
        .bind(&kinds)
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        let mut entries = HashMap::with_capacity(rows.len());
        for row in rows {
            let item = StockItem::from_parts(&row.item_kind, row.item_id).ok_or_else(|| StoreError::Corrupt {
                entity: "stock",
                id: row.item_id,
                reason: format!("unknown stock item kind {:?}", row.item_kind),
            })?;
            entries.insert(item, StockEntry::new(item, row.name, row.quantity, row.low_stock_threshold));
        }

        let deducted = plan_deduction(usage, &entries)?;

        for entry in deducted.values() {
            sqlx::query(
                "UPDATE store_stock SET quantity = $4 WHERE store_id = $1 AND item_kind = $2 AND item_id = $3",
            )
            .bind(store_id)
            .bind(entry.item.kind())
            .bind(entry.item.id())
            .bind(entry.remaining)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        }

        debug!(store_id = %store_id, items = deducted.len(), "Stock deducted");
        Ok(deducted)
    }

    async fn recalculate_affected(&mut self, store_id: Uuid, items: &[StockItem]) -> StoreResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let (kinds, ids) = item_keys(items);

        let result = sqlx::query(
            r#"
            UPDATE store_product_sizes sps
            SET is_available = NOT EXISTS (
                SELECT 1
                FROM product_size_recipes r
                LEFT JOIN store_stock s
                  ON s.store_id = sps.store_id AND s.item_kind = r.item_kind AND s.item_id = r.item_id
                WHERE r.product_size_id = sps.product_size_id
                  AND COALESCE(s.quantity, 0) < r.quantity
            )
            WHERE sps.store_id = $1
              AND sps.product_size_id IN (
                SELECT r.product_size_id
                FROM product_size_recipes r
                JOIN UNNEST($2::text[], $3::uuid[]) AS u(item_kind, item_id)
                  ON r.item_kind = u.item_kind AND r.item_id = u.item_id
              )
            "#,
        )
        .bind(store_id)
        .bind(&kinds)
        .bind(&ids)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        debug!(store_id = %store_id, products = result.rows_affected(), "Availability recalculated");
        Ok(())
    }
}
