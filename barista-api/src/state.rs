use barista_hub::HubHandle;
use barista_order::LifecycleManager;
use barista_store::RedisClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct RateLimit {
    pub redis: Arc<RedisClient>,
    pub per_minute: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleManager>,
    pub hub: HubHandle,
    pub rate_limit: Option<RateLimit>,
}

impl AppState {
    pub fn new(lifecycle: Arc<LifecycleManager>, hub: HubHandle) -> Self {
        Self {
            lifecycle,
            hub,
            rate_limit: None,
        }
    }

    pub fn with_rate_limit(mut self, redis: Arc<RedisClient>, per_minute: i64) -> Self {
        self.rate_limit = Some(RateLimit { redis, per_minute });
        self
    }
}
