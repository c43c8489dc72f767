//! Configuration management

use serde::{Deserialize, Serialize};

use crate::blob::BlobConfig;
use crate::delivery::DeliveryConfig;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/billrelay";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default interval between pipeline ticks in seconds.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;

/// Default directory for staged payload files.
pub const DEFAULT_INCOMING_DIR: &str = "./incoming";

/// Default cap on records delivered in one tick.
pub const DEFAULT_DELIVERY_BATCH_LIMIT: i64 = 500;

/// Advisory lock key guarding the pipeline body. One key per deployment.
pub const DEFAULT_PIPELINE_LOCK_KEY: i64 = 424_242;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub blob: BlobConfig,
    pub delivery: DeliveryConfig,
    pub pipeline: PipelineConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Pipeline tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Seconds between scheduled ticks
    pub tick_interval_secs: u64,
    /// Directory where fetched payloads are staged before decoding
    pub incoming_dir: String,
    /// Maximum records handed to the delivery stage per tick
    pub delivery_batch_limit: i64,
    /// Advisory lock key shared by all workers of one deployment
    pub lock_key: i64,
    /// Run a single tick and exit instead of looping
    pub run_once: bool,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: std::env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: std::env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
            },
            blob: BlobConfig::from_env(),
            delivery: DeliveryConfig::from_env(),
            pipeline: PipelineConfig {
                tick_interval_secs: std::env::var("PIPELINE_TICK_INTERVAL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TICK_INTERVAL_SECS),
                incoming_dir: std::env::var("PIPELINE_INCOMING_DIR")
                    .unwrap_or_else(|_| DEFAULT_INCOMING_DIR.to_string()),
                delivery_batch_limit: std::env::var("DELIVERY_BATCH_LIMIT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DELIVERY_BATCH_LIMIT),
                lock_key: std::env::var("PIPELINE_LOCK_KEY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_PIPELINE_LOCK_KEY),
                run_once: std::env::var("PIPELINE_RUN_ONCE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(false),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("DATABASE_URL must not be empty");
        }
        if self.database.max_connections < self.database.min_connections {
            anyhow::bail!(
                "DATABASE_MAX_CONNECTIONS ({}) must be >= DATABASE_MIN_CONNECTIONS ({})",
                self.database.max_connections,
                self.database.min_connections
            );
        }
        self.blob.validate()?;
        self.delivery.validate()?;
        if self.pipeline.delivery_batch_limit <= 0 {
            anyhow::bail!("DELIVERY_BATCH_LIMIT must be positive");
        }
        Ok(())
    }
}
