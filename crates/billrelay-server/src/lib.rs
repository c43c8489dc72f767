//! Billrelay Server Library
//!
//! Periodic pipeline that relays billing payload files from a remote object
//! store to a downstream processing endpoint:
//!
//! - **Ingest**: list the source container, skip already-seen
//!   (name, etag) pairs, stage new payloads locally, record a file row
//! - **Decode**: turn each staged payload into individual records
//! - **Delivery**: send each record to the remote endpoint with bounded
//!   retry and exponential backoff
//! - **Rollup**: recompute each file's aggregate status from its records
//!
//! The whole sequence runs as a tick under one Postgres advisory lock, so a
//! deployment may schedule overlapping workers safely: exactly one advances
//! the pipeline, the rest skip.
//!
//! # Example
//!
//! ```no_run
//! use billrelay_server::blob::BlobStoreClient;
//! use billrelay_server::config::Config;
//! use billrelay_server::delivery::DeliveryClient;
//! use billrelay_server::pipeline::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = billrelay_server::db::init_pool(&config.database).await?;
//!     let blob = BlobStoreClient::new(config.blob.clone())?;
//!     let delivery = DeliveryClient::new(config.delivery.clone())?;
//!
//!     let orchestrator = Orchestrator::new(pool, &config, blob, delivery);
//!     orchestrator.run_tick().await?;
//!     Ok(())
//! }
//! ```

pub mod blob;
pub mod config;
pub mod db;
pub mod decode;
pub mod delivery;
pub mod models;
pub mod pipeline;

pub use config::Config;
pub use pipeline::{Orchestrator, TickOutcome, TickSummary};
