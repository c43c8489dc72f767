//! Pipeline orchestration
//!
//! One tick runs Ingest -> Decode -> Delivery -> Rollup under a single
//! Postgres advisory lock, so at most one worker advances the pipeline at a
//! time across the whole deployment. Stages hand off state only through the
//! files/records tables; a stage failure is logged and never aborts its
//! sibling stages.

use anyhow::Result;
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::blob::BlobStoreClient;
use crate::config::Config;
use crate::db::{AdvisoryLock, FileStore, RecordStore};
use crate::decode::BatchDecoder;
use crate::delivery::DeliveryClient;

pub mod decode;
pub mod delivery;
pub mod ingest;
pub mod rollup;

pub use decode::{DecodeStage, DecodeStats};
pub use delivery::{DeliveryStage, DeliveryStats};
pub use ingest::{IngestStage, IngestStats, SeenIndex};
pub use rollup::{RollupEngine, RollupStats};

/// Result of one tick invocation
#[derive(Debug)]
pub enum TickOutcome {
    /// Another worker held the pipeline lock; nothing ran
    Skipped,
    /// The pipeline body ran; per-stage counters attached
    Completed(TickSummary),
}

/// Per-stage counters for one completed tick
#[derive(Debug, Default)]
pub struct TickSummary {
    pub ingest: Option<IngestStats>,
    pub decode: Option<DecodeStats>,
    pub delivery: Option<DeliveryStats>,
    pub rollup: Option<RollupStats>,
    /// Stages that failed this tick (each already logged)
    pub stage_errors: usize,
}

/// Pipeline orchestrator
pub struct Orchestrator {
    lock: AdvisoryLock,
    ingest: IngestStage,
    decode: DecodeStage,
    delivery: DeliveryStage,
    rollup: RollupEngine,
}

impl Orchestrator {
    /// Wire up the stages from the shared pool and the constructed clients
    pub fn new(
        pool: PgPool,
        config: &Config,
        blob: BlobStoreClient,
        delivery_client: DeliveryClient,
    ) -> Self {
        let files = FileStore::new(pool.clone());
        let records = RecordStore::new(pool.clone());

        Self {
            lock: AdvisoryLock::new(pool.clone(), config.pipeline.lock_key),
            ingest: IngestStage::new(files.clone(), blob, &config.pipeline.incoming_dir),
            decode: DecodeStage::new(
                pool,
                files.clone(),
                records.clone(),
                BatchDecoder::new(),
            ),
            delivery: DeliveryStage::new(
                records,
                delivery_client,
                config.delivery.max_attempts,
                Duration::from_millis(config.delivery.base_backoff_ms),
                config.pipeline.delivery_batch_limit,
            ),
            rollup: RollupEngine::new(files),
        }
    }

    /// Run one pipeline tick
    ///
    /// Contention on the lock is expected under concurrent scheduling and
    /// comes back as `TickOutcome::Skipped`, not an error. The lock is
    /// released on every exit path.
    pub async fn run_tick(&self) -> Result<TickOutcome> {
        let started = Instant::now();

        let Some(guard) = self.lock.try_acquire().await? else {
            info!("Another worker holds the pipeline lock; skipping this tick");
            return Ok(TickOutcome::Skipped);
        };

        info!("Acquired pipeline lock; running tick");
        let mut summary = TickSummary::default();

        match self.ingest.run().await {
            Ok(stats) => summary.ingest = Some(stats),
            Err(e) => {
                summary.stage_errors += 1;
                error!(stage = "ingest", error = ?e, "Stage failed");
            },
        }

        match self.decode.run().await {
            Ok(stats) => summary.decode = Some(stats),
            Err(e) => {
                summary.stage_errors += 1;
                error!(stage = "decode", error = ?e, "Stage failed");
            },
        }

        match self.delivery.run().await {
            Ok(stats) => summary.delivery = Some(stats),
            Err(e) => {
                summary.stage_errors += 1;
                error!(stage = "delivery", error = ?e, "Stage failed");
            },
        }

        match self.rollup.run().await {
            Ok(stats) => summary.rollup = Some(stats),
            Err(e) => {
                summary.stage_errors += 1;
                error!(stage = "rollup", error = ?e, "Stage failed");
            },
        }

        guard.release().await;

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            stage_errors = summary.stage_errors,
            "Pipeline tick finished"
        );

        Ok(TickOutcome::Completed(summary))
    }
}
