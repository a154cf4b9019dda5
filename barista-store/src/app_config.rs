use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Rate limiting is off when absent.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub hub: HubSettings,
    #[serde(default)]
    pub low_stock: LowStockConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 { 10 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_rate_limit() -> i64 { 300 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_low_stock_topic")]
    pub low_stock_topic: String,
}

fn default_low_stock_topic() -> String { "inventory.low_stock".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct LifecycleConfig {
    pub advance_timeout_ms: u64,
}

impl LifecycleConfig {
    pub fn advance_timeout(&self) -> Duration {
        Duration::from_millis(self.advance_timeout_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { advance_timeout_ms: 5_000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HubSettings {
    pub command_buffer: usize,
    pub subscriber_buffer: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            command_buffer: 1024,
            subscriber_buffer: 64,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LowStockConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for LowStockConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides, `development` unless RUN_MODE says otherwise
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `BARISTA__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("BARISTA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/barista"
            [kafka]
            brokers = "localhost:9092"
            "#,
        )
        .unwrap();

        assert!(config.redis.is_none());
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.kafka.low_stock_topic, "inventory.low_stock");
        assert_eq!(config.lifecycle.advance_timeout(), Duration::from_secs(5));
        assert_eq!(config.hub.subscriber_buffer, 64);
        assert_eq!(config.low_stock.workers, 4);
    }

    #[test]
    fn test_overrides() {
        let config = parse(
            r#"
            [server]
            port = 9000
            [database]
            url = "postgres://db/barista"
            max_connections = 3
            [redis]
            url = "redis://cache"
            [kafka]
            brokers = "k1:9092,k2:9092"
            [lifecycle]
            advance_timeout_ms = 250
            [low_stock]
            workers = 1
            queue_capacity = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.redis.unwrap().rate_limit_per_minute, 300);
        assert_eq!(config.lifecycle.advance_timeout(), Duration::from_millis(250));
        assert_eq!(config.low_stock.queue_capacity, 8);
    }

    #[test]
    fn test_missing_database_is_rejected() {
        assert!(parse("[server]\nport = 1\n[kafka]\nbrokers = \"x\"").is_err());
    }
}
