//! Delivery stage: send NEW records to the remote endpoint with retry

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::RecordStore;
use crate::delivery::{DeliveryClient, DeliveryOutcome, DeliveryRequest};
use crate::models::{RecordRow, RecordStatus};

/// Counters for one delivery pass
#[derive(Debug, Default, Clone, Copy)]
pub struct DeliveryStats {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// How one record settled after its attempt budget
#[derive(Debug)]
struct Settled {
    status: RecordStatus,
    correlation_id: String,
    error: Option<String>,
}

/// Backoff before the next attempt: `base * 2^(attempt-1)`
///
/// Strictly increasing across attempts for any non-zero base.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Delivery stage
pub struct DeliveryStage {
    records: RecordStore,
    client: DeliveryClient,
    max_attempts: u32,
    base_backoff: Duration,
    batch_limit: i64,
}

impl DeliveryStage {
    pub fn new(
        records: RecordStore,
        client: DeliveryClient,
        max_attempts: u32,
        base_backoff: Duration,
        batch_limit: i64,
    ) -> Self {
        Self {
            records,
            client,
            max_attempts,
            base_backoff,
            batch_limit,
        }
    }

    /// Deliver one batch of NEW records
    ///
    /// The singleton pipeline lock guarantees no record is delivered
    /// concurrently by two workers; there is no per-record locking.
    pub async fn run(&self) -> Result<DeliveryStats> {
        let records = self.records.list_new(self.batch_limit).await?;
        info!(count = records.len(), "Found NEW records to deliver");

        let mut stats = DeliveryStats::default();

        for record in records {
            stats.attempted += 1;
            let settled = self.deliver_with_retry(&record).await;

            match settled.status {
                RecordStatus::Processed => {
                    self.records
                        .mark_processed(record.id, &settled.correlation_id)
                        .await?;
                    stats.delivered += 1;
                    info!(
                        record_id = %record.id,
                        entry_id = %record.entry_id,
                        correlation_id = %settled.correlation_id,
                        "Record delivered"
                    );
                },
                _ => {
                    let message = settled.error.unwrap_or_else(|| "delivery failed".to_string());
                    self.records
                        .mark_failed(record.id, &settled.correlation_id, &message)
                        .await?;
                    stats.failed += 1;
                    warn!(
                        record_id = %record.id,
                        entry_id = %record.entry_id,
                        error = %message,
                        "Record failed"
                    );
                },
            }
        }

        info!(
            attempted = stats.attempted,
            delivered = stats.delivered,
            failed = stats.failed,
            "Delivery pass complete"
        );

        Ok(stats)
    }

    async fn deliver_with_retry(&self, record: &RecordRow) -> Settled {
        let request = DeliveryRequest::from(record);
        let mut last_error = String::new();
        let mut correlation_id = String::new();

        for attempt in 1..=self.max_attempts {
            // Fresh correlation id per attempt; never reused.
            correlation_id = Uuid::new_v4().to_string();

            match self.client.deliver(&request, &correlation_id).await {
                Ok(DeliveryOutcome::Success) => {
                    return Settled {
                        status: RecordStatus::Processed,
                        correlation_id,
                        error: None,
                    };
                },
                Ok(DeliveryOutcome::Rejected(reason)) => {
                    // Explicit remote rejection is terminal: retrying could
                    // double-submit a record the remote already recorded.
                    return Settled {
                        status: RecordStatus::Failed,
                        correlation_id,
                        error: Some(format!("rejected: {}", reason)),
                    };
                },
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        entry_id = %record.entry_id,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %last_error,
                        "Delivery attempt failed"
                    );

                    if attempt < self.max_attempts {
                        tokio::time::sleep(backoff_delay(self.base_backoff, attempt)).await;
                    }
                },
            }
        }

        Settled {
            status: RecordStatus::Failed,
            correlation_id,
            error: Some(format!(
                "transport failure after {} attempts: {}",
                self.max_attempts, last_error
            )),
        }
    }
}
