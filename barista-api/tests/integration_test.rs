use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use barista_api::{app, AppState};
use barista_catalog::{RecipeLine, StockEntry, StockItem};
use barista_core::{LowStockAlert, LowStockNotifier, MemoryOrderStore, NotifyError, OrderStore};
use barista_hub::{Hub, HubConfig};
use barista_order::{LifecycleManager, LowStockDispatcher, OrderNotifier};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

struct NoopNotifier;

#[async_trait::async_trait]
impl LowStockNotifier for NoopNotifier {
    async fn notify_low_stock(&self, _alert: &LowStockAlert) -> Result<(), NotifyError> {
        Ok(())
    }
}

struct TestApp {
    router: Router,
    store: MemoryOrderStore,
    store_id: Uuid,
    latte: Uuid,
    vanilla: Uuid,
    beans: StockItem,
    cup: StockItem,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5)).await
    }

    async fn with_timeout(timeout: Duration) -> Self {
        let store = MemoryOrderStore::new();
        let store_id = Uuid::new_v4();
        let latte = Uuid::new_v4();
        let vanilla = Uuid::new_v4();
        let beans = StockItem::Ingredient(Uuid::new_v4());
        let milk = StockItem::Ingredient(Uuid::new_v4());
        let syrup = StockItem::Ingredient(Uuid::new_v4());
        let cup = StockItem::Provision(Uuid::new_v4());

        store.add_store(store_id, "Harbour Street").await;
        store.set_stock(store_id, StockEntry::new(beans, "Espresso beans", 100.0, 10.0)).await;
        store.set_stock(store_id, StockEntry::new(milk, "Whole milk", 1000.0, 100.0)).await;
        store.set_stock(store_id, StockEntry::new(syrup, "Vanilla syrup", 100.0, 10.0)).await;
        store.set_stock(store_id, StockEntry::new(cup, "Paper cup 12oz", 50.0, 5.0)).await;
        store
            .set_size_recipe(
                latte,
                vec![RecipeLine::new(beans, 18.0), RecipeLine::new(milk, 200.0), RecipeLine::new(cup, 1.0)],
            )
            .await;
        store.set_additive_recipe(vanilla, vec![RecipeLine::new(syrup, 15.0)]).await;

        let hub = Hub::spawn(HubConfig::default());
        let lifecycle = LifecycleManager::new(
            Arc::new(store.clone()),
            OrderNotifier::new(hub.clone()),
            LowStockDispatcher::spawn(Arc::new(NoopNotifier), 1, 16),
            timeout,
        );

        Self {
            router: app(AppState::new(Arc::new(lifecycle), hub)),
            store,
            store_id,
            latte,
            vanilla,
            beans,
            cup,
        }
    }

    async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn place(&self, suborders: Value) -> Value {
        let (status, order) = self
            .request(
                "POST",
                "/v1/orders",
                Some(json!({ "store_id": self.store_id, "suborders": suborders })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        order
    }

    async fn advance(&self, suborder_id: &Value) -> (StatusCode, Value) {
        let id = suborder_id.as_str().unwrap();
        self.request("POST", &format!("/v1/suborders/{}/advance", id), None).await
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, body) = app.request("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_order_lifecycle_over_http() {
    let app = TestApp::new().await;
    let order = app
        .place(json!([
            { "product_size_id": app.latte, "quantity": 1, "price_cents": 275 },
            { "product_size_id": app.latte, "quantity": 1, "price_cents": 275,
              "additives": [{ "additive_id": app.vanilla, "name": "Vanilla", "price_cents": 55 }] }
        ]))
        .await;
    assert_eq!(order["total_price_cents"], 605);
    assert_eq!(order["status"], "PENDING");

    let a = &order["suborders"][0]["id"];
    let b = &order["suborders"][1]["id"];

    let (status, body) = app.advance(a).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["suborder"]["status"], "PREPARING");
    assert_eq!(body["order_status"], "PREPARING");
    assert_eq!(body["order_status_changed"], true);

    app.advance(a).await;
    app.advance(b).await;
    let (status, body) = app.advance(b).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["previous_status"], "PREPARING");
    assert_eq!(body["order_status"], "COMPLETED");

    let order_id = order["id"].as_str().unwrap();
    let (status, stored) = app.request("GET", &format!("/v1/orders/{}", order_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["status"], "COMPLETED");
    assert!(stored["completed_at"].is_string());

    assert_eq!(app.store.stock_quantity(app.store_id, app.beans).await, 64.0);
    assert_eq!(app.store.stock_quantity(app.store_id, app.cup).await, 48.0);

    let (status, body) = app.advance(a).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "invalid_transition");

    let (status, body) = app
        .request("POST", &format!("/v1/orders/{}/reaggregate", order_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], false);
}

#[tokio::test]
async fn test_insufficient_stock_is_a_conflict() {
    let app = TestApp::new().await;
    app.store
        .set_stock(app.store_id, StockEntry::new(app.cup, "Paper cup 12oz", 1.0, 5.0))
        .await;
    let order = app
        .place(json!([{ "product_size_id": app.latte, "quantity": 2, "price_cents": 275 }]))
        .await;
    let id = &order["suborders"][0]["id"];

    assert_eq!(app.advance(id).await.0, StatusCode::OK);
    let (status, body) = app.advance(id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "insufficient_stock");

    let order_id = order["id"].as_str().unwrap();
    let (_, stored) = app.request("GET", &format!("/v1/orders/{}", order_id), None).await;
    assert_eq!(stored["suborders"][0]["status"], "PREPARING");
    assert_eq!(app.store.stock_quantity(app.store_id, app.cup).await, 1.0);
    assert_eq!(app.store.stock_quantity(app.store_id, app.beans).await, 100.0);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let app = TestApp::new().await;
    let missing = Uuid::new_v4();

    let (status, body) = app
        .request("POST", &format!("/v1/suborders/{}/advance", missing), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = app.request("GET", &format!("/v1/orders/{}", missing), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_order_validation() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request("POST", "/v1/orders", Some(json!({ "store_id": app.store_id, "suborders": [] })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_failed");

    let (status, _) = app
        .request(
            "POST",
            "/v1/orders",
            Some(json!({ "store_id": app.store_id, "suborders": [
                { "product_size_id": app.latte, "quantity": 0, "price_cents": 275 }
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_overflowing_total_is_a_bad_request() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            "POST",
            "/v1/orders",
            Some(json!({ "store_id": app.store_id, "suborders": [
                { "product_size_id": app.latte, "quantity": 3, "price_cents": i64::MAX / 2 }
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_failed");

    let (status, _) = app
        .request(
            "POST",
            "/v1/orders",
            Some(json!({ "store_id": app.store_id, "suborders": [
                { "product_size_id": app.latte, "quantity": 1, "price_cents": i64::MAX },
                { "product_size_id": app.latte, "quantity": 1, "price_cents": 1 }
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_store_is_a_bad_request() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            "POST",
            "/v1/orders",
            Some(json!({ "store_id": Uuid::new_v4(), "suborders": [
                { "product_size_id": app.latte, "quantity": 1, "price_cents": 275 }
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["code"], "invalid_order");
    assert!(app.store.list_active_orders(app.store_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_then_advance_is_rejected() {
    let app = TestApp::new().await;
    let order = app
        .place(json!([{ "product_size_id": app.latte, "quantity": 1, "price_cents": 275 }]))
        .await;
    let order_id = order["id"].as_str().unwrap();

    let (status, body) = app.request("GET", &format!("/v1/stores/{}/orders", app.store_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = app
        .request("POST", &format!("/v1/orders/{}/cancel", order_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");

    let (status, body) = app.advance(&order["suborders"][0]["id"]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "order_closed");

    let (_, body) = app.request("GET", &format!("/v1/stores/{}/orders", app.store_id), None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_locked_rows_time_out() {
    let app = TestApp::with_timeout(Duration::from_millis(50)).await;
    let order = app
        .place(json!([{ "product_size_id": app.latte, "quantity": 1, "price_cents": 275 }]))
        .await;

    let held = app.store.begin().await.unwrap();
    let (status, body) = app.advance(&order["suborders"][0]["id"]).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], "timeout");
    drop(held);

    assert_eq!(app.advance(&order["suborders"][0]["id"]).await.0, StatusCode::OK);
}
