use common::{PostgresConfig, TelemetryConfig};
use config::{Config, ConfigError, Environment};
use ingest_worker::{IngestWorkerConfig, MqttSubscriberConfig, SweeperConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where device state and readings live
    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageBackend,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Path to PostgreSQL migrations directory
    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    /// Path to goose binary
    #[serde(default = "default_postgres_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    // MQTT configuration
    /// Broker URL, mqtt://host:port
    #[serde(default = "default_mqtt_broker_url")]
    pub mqtt_broker_url: String,

    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    #[serde(default)]
    pub mqtt_username: Option<String>,

    #[serde(default)]
    pub mqtt_password: Option<String>,

    #[serde(default = "default_mqtt_sensor_topic")]
    pub mqtt_sensor_topic: String,

    #[serde(default = "default_mqtt_status_topic")]
    pub mqtt_status_topic: String,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    #[serde(default = "default_mqtt_retry_delay_secs")]
    pub mqtt_retry_delay_secs: u64,

    #[serde(default = "default_mqtt_max_retry_attempts")]
    pub mqtt_max_retry_attempts: u32,

    /// Messages processed concurrently
    #[serde(default = "default_ingest_concurrency")]
    pub ingest_concurrency: usize,

    // Broadcast configuration
    /// Publish change notifications to NATS
    #[serde(default = "default_broadcast_enabled")]
    pub broadcast_enabled: bool,

    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Subjects are `{base}.{channel}`
    #[serde(default = "default_broadcast_base_subject")]
    pub broadcast_base_subject: String,

    /// Pending notifications kept before new ones are dropped
    #[serde(default = "default_broadcast_buffer_size")]
    pub broadcast_buffer_size: usize,

    // Staleness configuration
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Silence after which an online device is marked offline
    #[serde(default = "default_offline_grace_secs")]
    pub offline_grace_secs: u64,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // Telemetry configuration
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Postgres
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "fleetwatch".to_string()
}

fn default_postgres_username() -> String {
    "fleetwatch".to_string()
}

fn default_postgres_password() -> String {
    "fleetwatch".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_migrations_dir() -> String {
    "crates/common/migrations/postgres".to_string()
}

fn default_postgres_goose_binary_path() -> String {
    "goose".to_string()
}

fn default_mqtt_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_mqtt_client_id() -> String {
    "fleetwatch-ingest".to_string()
}

fn default_mqtt_sensor_topic() -> String {
    "devices/+/sensors".to_string()
}

fn default_mqtt_status_topic() -> String {
    "devices/+/status".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    60
}

fn default_mqtt_retry_delay_secs() -> u64 {
    5
}

fn default_mqtt_max_retry_attempts() -> u32 {
    10
}

fn default_ingest_concurrency() -> usize {
    8
}

fn default_broadcast_enabled() -> bool {
    true
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_broadcast_base_subject() -> String {
    "fleetwatch".to_string()
}

fn default_broadcast_buffer_size() -> usize {
    1024
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_offline_grace_secs() -> u64 {
    60
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "fleetwatch".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("FLEETWATCH"))
            .build()?
            .try_deserialize()
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            migrations_dir: self.postgres_migrations_dir.clone(),
            goose_binary_path: self.postgres_goose_binary_path.clone(),
        }
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn ingest_worker_config(&self) -> IngestWorkerConfig {
        IngestWorkerConfig {
            mqtt: MqttSubscriberConfig {
                broker_url: self.mqtt_broker_url.clone(),
                client_id: self.mqtt_client_id.clone(),
                username: self.mqtt_username.clone(),
                password: self.mqtt_password.clone(),
                topics: vec![
                    self.mqtt_sensor_topic.clone(),
                    self.mqtt_status_topic.clone(),
                ],
                keep_alive: Duration::from_secs(self.mqtt_keep_alive_secs),
                retry_delay: Duration::from_secs(self.mqtt_retry_delay_secs),
                max_retry_attempts: self.mqtt_max_retry_attempts,
                ingest_concurrency: self.ingest_concurrency,
            },
            sweeper: SweeperConfig {
                interval: Duration::from_secs(self.sweep_interval_secs),
                grace_window: Duration::from_secs(self.offline_grace_secs),
            },
            broadcast_buffer_size: self.broadcast_buffer_size,
        }
    }
}
