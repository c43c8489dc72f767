//! Rollup engine: recompute file status from record statuses

use anyhow::Result;
use tracing::{debug, info};

use crate::db::FileStore;
use crate::models::FileStatus;

/// Counters for one rollup pass
#[derive(Debug, Default, Clone, Copy)]
pub struct RollupStats {
    pub files_examined: usize,
    pub files_updated: usize,
}

/// Aggregate status for a file given its record status counts
///
/// `None` means "leave the file unchanged": a file with no records yet is
/// still in whatever state the decode stage left it.
pub fn rollup_decision(total: i64, processed: i64, failed: i64) -> Option<FileStatus> {
    if total == 0 {
        return None;
    }
    if processed == total {
        Some(FileStatus::Processed)
    } else if failed > 0 {
        Some(FileStatus::Failed)
    } else {
        Some(FileStatus::Processing)
    }
}

/// Rollup engine
pub struct RollupEngine {
    files: FileStore,
}

impl RollupEngine {
    pub fn new(files: FileStore) -> Self {
        Self { files }
    }

    /// Recompute every file's aggregate status and settled count
    ///
    /// `processed_count` is the settled count (PROCESSED plus FAILED), not
    /// the success count.
    pub async fn run(&self) -> Result<RollupStats> {
        let snapshots = self.files.rollup_snapshots().await?;

        let mut stats = RollupStats {
            files_examined: snapshots.len(),
            ..Default::default()
        };

        for snapshot in snapshots {
            let Some(decision) = rollup_decision(snapshot.total, snapshot.processed, snapshot.failed)
            else {
                continue;
            };

            let settled = snapshot.settled() as i32;
            if decision == snapshot.status() && settled == snapshot.processed_count {
                continue;
            }

            self.files
                .apply_rollup(snapshot.id, decision, settled)
                .await?;
            stats.files_updated += 1;

            match decision {
                FileStatus::Processed => {
                    info!(file_id = %snapshot.id, "File marked PROCESSED")
                },
                FileStatus::Failed => {
                    info!(file_id = %snapshot.id, "File marked FAILED (some records failed)")
                },
                _ => debug!(file_id = %snapshot.id, settled, "File remains PROCESSING"),
            }
        }

        info!(
            files_examined = stats.files_examined,
            files_updated = stats.files_updated,
            "Rollup pass complete"
        );

        Ok(stats)
    }
}
