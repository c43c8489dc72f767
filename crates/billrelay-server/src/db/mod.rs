//! Database access layer
//!
//! Pool construction plus the stores wrapping all SQL touched by the
//! pipeline. Queries are runtime-checked (`sqlx::query` / `query_as`)
//! so the crate builds without a live database.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;

pub mod files;
pub mod lock;
pub mod records;

pub use files::{FileStore, RollupSnapshot};
pub use lock::{AdvisoryLock, LockGuard};
pub use records::RecordStore;

/// Build the shared connection pool from configuration
pub async fn init_pool(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await?;

    Ok(pool)
}
