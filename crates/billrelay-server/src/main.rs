//! Billrelay Server - Main entry point

use anyhow::Result;
use billrelay_common::logging::{init_logging, LogConfig};
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use billrelay_server::blob::BlobStoreClient;
use billrelay_server::config::Config;
use billrelay_server::delivery::DeliveryClient;
use billrelay_server::pipeline::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_filter("billrelay_server=debug,sqlx=warn");
    init_logging(&log_config)?;

    info!("Starting billrelay server");

    // Load configuration
    let config = Config::load()?;
    info!(
        tick_interval_secs = config.pipeline.tick_interval_secs,
        run_once = config.pipeline.run_once,
        "Configuration loaded"
    );

    // Initialize database connection pool
    let pool = billrelay_server::db::init_pool(&config.database).await?;
    info!("Database connection pool established");

    // Run migrations
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    info!("Database migrations completed");

    // Construct the HTTP clients once; they own their connection pools and
    // are shared with the stages for the process lifetime.
    let blob = BlobStoreClient::new(config.blob.clone())?;
    let delivery = DeliveryClient::new(config.delivery.clone())?;

    let orchestrator = Orchestrator::new(pool, &config, blob, delivery);

    if config.pipeline.run_once {
        orchestrator.run_tick().await?;
        info!("Single tick requested; exiting");
        return Ok(());
    }

    let mut interval = tokio::time::interval(Duration::from_secs(config.pipeline.tick_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("Entering tick loop");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = orchestrator.run_tick().await {
                    error!(error = ?e, "Pipeline tick failed");
                }
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received; stopping");
                break;
            }
        }
    }

    Ok(())
}
