use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use barista_core::{Order, OrderStatus, Suborder, SuborderStatus};
use barista_order::AdvanceOutcome;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub store_id: Uuid,
    pub delivery_address_id: Option<Uuid>,
    pub suborders: Vec<SuborderRequest>,
}

#[derive(Debug, Deserialize)]
pub struct SuborderRequest {
    pub product_size_id: Uuid,
    pub quantity: u32,
    pub price_cents: i64,
    #[serde(default)]
    pub additives: Vec<AdditiveRequest>,
}

#[derive(Debug, Deserialize)]
pub struct AdditiveRequest {
    pub additive_id: Uuid,
    pub name: String,
    pub price_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct AdvanceResponse {
    pub suborder: Suborder,
    pub previous_status: SuborderStatus,
    pub order_id: Uuid,
    pub order_status: OrderStatus,
    pub order_status_changed: bool,
    pub low_stock_alerts: usize,
}

impl From<AdvanceOutcome> for AdvanceResponse {
    fn from(outcome: AdvanceOutcome) -> Self {
        Self {
            order_id: outcome.order.id,
            order_status: outcome.order.status,
            order_status_changed: outcome.order_status_changed,
            low_stock_alerts: outcome.low_stock.len(),
            previous_status: outcome.previous_status,
            suborder: outcome.suborder,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReaggregateResponse {
    pub order_id: Uuid,
    pub updated: bool,
    pub status: Option<OrderStatus>,
}

impl PlaceOrderRequest {
    fn into_order(self) -> Result<Order, AppError> {
        if self.suborders.is_empty() {
            return Err(AppError::ValidationError("An order needs at least one suborder".to_string()));
        }

        let mut order = Order::new(self.store_id, self.delivery_address_id);
        for line in self.suborders {
            if line.quantity == 0 {
                return Err(AppError::ValidationError("Suborder quantity must be positive".to_string()));
            }
            if line.price_cents < 0 || line.additives.iter().any(|a| a.price_cents < 0) {
                return Err(AppError::ValidationError("Prices cannot be negative".to_string()));
            }

            let suborder = line
                .additives
                .into_iter()
                .fold(Suborder::new(line.product_size_id, line.quantity, line.price_cents), |s, a| {
                    s.with_additive(a.additive_id, a.name, a.price_cents)
                });
            order
                .add_suborder(suborder)
                .map_err(|e| AppError::ValidationError(e.to_string()))?;
        }
        Ok(order)
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(place_order))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/cancel", post(cancel_order))
        .route("/v1/orders/{id}/reaggregate", post(reaggregate_order))
        .route("/v1/suborders/{id}/advance", post(advance_suborder))
        .route("/v1/stores/{store_id}/orders", get(list_active_orders))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
pub async fn place_order(
    State(state): State<AppState>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = req.into_order()?;
    let order = state.lifecycle.place_order(order).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .lifecycle
        .store()
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Order not found: {}", order_id)))?;
    Ok(Json(order))
}

/// GET /v1/stores/{store_id}/orders
/// PENDING and PREPARING orders, oldest first
pub async fn list_active_orders(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = state.lifecycle.store().list_active_orders(store_id).await?;
    Ok(Json(orders))
}

/// POST /v1/suborders/{id}/advance
pub async fn advance_suborder(
    State(state): State<AppState>,
    Path(suborder_id): Path<Uuid>,
) -> Result<Json<AdvanceResponse>, AppError> {
    let outcome = state.lifecycle.advance_suborder(suborder_id).await?;
    Ok(Json(outcome.into()))
}

/// POST /v1/orders/{id}/reaggregate
pub async fn reaggregate_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ReaggregateResponse>, AppError> {
    let status = state.lifecycle.reaggregate_order(order_id).await?;
    Ok(Json(ReaggregateResponse {
        order_id,
        updated: status.is_some(),
        status,
    }))
}

/// POST /v1/orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.lifecycle.cancel_order(order_id).await?;
    Ok(Json(order))
}
