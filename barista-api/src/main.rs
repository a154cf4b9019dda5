use anyhow::Context;
use barista_api::{app, AppState};
use barista_hub::{Hub, HubConfig};
use barista_order::{LifecycleManager, LowStockDispatcher, OrderNotifier};
use barista_store::app_config::Config;
use barista_store::{DbClient, EventProducer, KafkaLowStockNotifier, PgOrderStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "barista_api=debug,barista_order=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Barista API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    if config.database.run_migrations {
        db.migrate().await.context("Failed to run migrations")?;
    }

    let producer = EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?;
    let low_stock = LowStockDispatcher::spawn(
        Arc::new(KafkaLowStockNotifier::new(producer, config.kafka.low_stock_topic.clone())),
        config.low_stock.workers,
        config.low_stock.queue_capacity,
    );

    let hub = Hub::spawn(HubConfig {
        command_buffer: config.hub.command_buffer,
        subscriber_buffer: config.hub.subscriber_buffer,
    });

    let lifecycle = LifecycleManager::new(
        Arc::new(PgOrderStore::new(db.pool.clone())),
        OrderNotifier::new(hub.clone()),
        low_stock,
        config.lifecycle.advance_timeout(),
    );

    let mut state = AppState::new(Arc::new(lifecycle), hub);
    if let Some(redis) = &config.redis {
        let client = RedisClient::new(&redis.url).await.context("Failed to connect to Redis")?;
        state = state.with_rate_limit(Arc::new(client), redis.rate_limit_per_minute);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
