//! Decode stage: turn staged payload files into NEW records

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::db::{FileStore, RecordStore};
use crate::decode::BatchDecoder;
use crate::models::{FileRow, FileStatus};

/// Counters for one decode pass
#[derive(Debug, Default, Clone, Copy)]
pub struct DecodeStats {
    pub files_decoded: usize,
    pub files_failed: usize,
    pub records_created: usize,
}

/// Decode stage
pub struct DecodeStage {
    pool: PgPool,
    files: FileStore,
    records: RecordStore,
    decoder: BatchDecoder,
}

impl DecodeStage {
    pub fn new(pool: PgPool, files: FileStore, records: RecordStore, decoder: BatchDecoder) -> Self {
        Self {
            pool,
            files,
            records,
            decoder,
        }
    }

    /// Decode every file currently in status NEW
    ///
    /// A file that cannot be decoded is marked FAILED with the reason and
    /// contributes no records; decoding continues with the next file.
    pub async fn run(&self) -> Result<DecodeStats> {
        let files = self.files.list_by_status(FileStatus::New).await?;
        info!(count = files.len(), "Found files with status NEW");

        let mut stats = DecodeStats::default();

        for file in files {
            match self.decode_file(&file).await {
                Ok(Some(count)) => {
                    stats.files_decoded += 1;
                    stats.records_created += count;
                    info!(
                        file_id = %file.id,
                        source_name = %file.source_name,
                        records = count,
                        "Decoded file"
                    );
                },
                Ok(None) => stats.files_failed += 1,
                Err(e) => {
                    // Persistence trouble while settling this file; leave it
                    // NEW so the next tick retries it.
                    stats.files_failed += 1;
                    error!(file_id = %file.id, error = %e, "Failed to settle file during decode");
                },
            }
        }

        info!(
            files_decoded = stats.files_decoded,
            files_failed = stats.files_failed,
            records_created = stats.records_created,
            "Decode pass complete"
        );

        Ok(stats)
    }

    /// Returns `Ok(Some(count))` on success, `Ok(None)` when the file was
    /// marked FAILED.
    async fn decode_file(&self, file: &FileRow) -> Result<Option<usize>> {
        let Some(path) = file.local_path.as_deref().filter(|p| !p.is_empty()) else {
            warn!(file_id = %file.id, "Local payload path missing; marking FAILED");
            self.files
                .mark_failed(file.id, "local payload path missing")
                .await?;
            return Ok(None);
        };

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file_id = %file.id, path, error = %e, "Payload unreadable; marking FAILED");
                self.files
                    .mark_failed(file.id, &format!("payload unreadable: {}", e))
                    .await?;
                return Ok(None);
            },
        };

        let entries = match self.decoder.decode(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(file_id = %file.id, error = %e, "Decode failed; marking FAILED");
                self.files
                    .mark_failed(file.id, &format!("decode failed: {}", e))
                    .await?;
                return Ok(None);
            },
        };

        // The record batch and the file's status flip commit atomically;
        // a failure rolls the whole batch back.
        let insert_result: Result<()> = async {
            let mut tx = self.pool.begin().await.context("Failed to open transaction")?;
            self.records
                .insert_batch(&mut tx, file.id, &entries)
                .await?;
            self.files
                .mark_processing(&mut tx, file.id, entries.len() as i32)
                .await?;
            tx.commit().await.context("Failed to commit record batch")?;
            Ok(())
        }
        .await;

        if let Err(e) = insert_result {
            warn!(file_id = %file.id, error = %e, "Record insert failed; marking FAILED");
            self.files
                .mark_failed(file.id, &format!("failed to persist records: {}", e))
                .await?;
            return Ok(None);
        }

        Ok(Some(entries.len()))
    }
}
