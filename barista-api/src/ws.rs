//! Live order streams for store dashboards.
//!
//! Each socket owns one hub subscription for its lifetime. Inbound client
//! frames are ignored apart from close.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    response::Response,
    routing::get,
    Router,
};
use barista_hub::{FeedFrame, Frame, Subscription};
use barista_order::LifecycleManager;
use barista_shared::topics;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/stores/{store_id}/orders/ws", get(order_channel))
        .route("/v1/stores/{store_id}/orders/feed", get(order_feed))
}

/// GET /v1/stores/{store_id}/orders/ws
pub async fn order_channel(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
) -> Response {
    let subscription = state.hub.connect(topics::store_orders(store_id));
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        channel_session(sink, stream, subscription).await
    })
}

/// GET /v1/stores/{store_id}/orders/feed
pub async fn order_feed(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
) -> Response {
    let subscription = state.hub.connect(topics::store_order_feed(store_id));
    let lifecycle = state.lifecycle.clone();
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        feed_session(sink, stream, subscription, lifecycle, store_id).await
    })
}

pub(crate) async fn channel_session<S, R>(mut sink: S, stream: R, mut subscription: Subscription)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    if let Err(e) = subscription.register().await {
        warn!(topic = subscription.topic(), "Could not register connection: {}", e);
        let _ = sink.send(Message::Close(None)).await;
        return;
    }
    info!(topic = subscription.topic(), connection_id = subscription.id(), "Connection registered");

    pump(sink, stream, subscription).await;
}

/// Registers first and then loads the snapshot, so nothing published in
/// between is lost. Such an order may show up in both.
pub(crate) async fn feed_session<S, R>(
    mut sink: S,
    stream: R,
    mut subscription: Subscription,
    lifecycle: Arc<LifecycleManager>,
    store_id: Uuid,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    if let Err(e) = subscription.register().await {
        warn!(topic = subscription.topic(), "Could not register connection: {}", e);
        let _ = sink.send(Message::Close(None)).await;
        return;
    }

    let initial = match lifecycle.store().list_active_orders(store_id).await {
        Ok(orders) => serde_json::to_value(&orders).map(|payload| Frame::from(FeedFrame::InitialData(payload))),
        Err(e) => {
            warn!(store_id = %store_id, "Could not load active orders: {}", e);
            let _ = sink.send(Message::Close(None)).await;
            subscription.close().await;
            return;
        }
    };

    let sent = match initial.and_then(|frame| frame.encode()) {
        Ok(text) => sink.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!(store_id = %store_id, "Could not encode initial data: {}", e);
            false
        }
    };
    if !sent {
        subscription.close().await;
        return;
    }
    info!(topic = subscription.topic(), connection_id = subscription.id(), "Feed connection registered");

    pump(sink, stream, subscription).await;
}

async fn pump<S, R>(mut sink: S, mut stream: R, mut subscription: Subscription)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            frame = subscription.recv() => {
                let Some(frame) = frame else {
                    debug!(connection_id = subscription.id(), "Hub dropped the connection");
                    break;
                };
                if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(connection_id = subscription.id(), "Socket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(topic = subscription.topic(), connection_id = subscription.id(), "Connection closed");
    subscription.close().await;
}
