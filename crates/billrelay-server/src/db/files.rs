//! Queries over the files table

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool};
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{FileRow, FileStatus};

/// Store for file rows, shared by the pipeline stages
#[derive(Clone)]
pub struct FileStore {
    pool: PgPool,
}

/// Per-file record status counts used by the rollup engine
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RollupSnapshot {
    pub id: Uuid,
    pub status: String,
    pub processed_count: i32,
    pub total: i64,
    pub processed: i64,
    pub failed: i64,
}

impl RollupSnapshot {
    pub fn status(&self) -> FileStatus {
        self.status.clone().into()
    }

    /// Records in a terminal status, whichever way they settled
    pub fn settled(&self) -> i64 {
        self.processed + self.failed
    }
}

impl FileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All (source_name, etag) pairs ever recorded
    pub async fn seen_pairs(&self) -> Result<HashSet<(String, String)>> {
        let pairs: Vec<(String, String)> =
            sqlx::query_as("SELECT source_name, etag FROM files")
                .fetch_all(&self.pool)
                .await
                .context("Failed to load recorded (source_name, etag) pairs")?;

        Ok(pairs.into_iter().collect())
    }

    /// Insert a newly observed file in status NEW
    ///
    /// The unique constraint on (source_name, etag) arbitrates concurrent
    /// writers: the loser inserts nothing and gets `None` back, which the
    /// ingest stage treats as handled-by-another-worker.
    pub async fn insert_new(
        &self,
        source_name: &str,
        etag: &str,
        local_path: &str,
    ) -> Result<Option<Uuid>> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO files (id, source_name, etag, local_path, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_name, etag) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(source_name)
        .bind(etag)
        .bind(local_path)
        .bind(FileStatus::New.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to insert file row")?;

        Ok(id)
    }

    /// Fetch all files currently in the given status, oldest first
    pub async fn list_by_status(&self, status: FileStatus) -> Result<Vec<FileRow>> {
        let rows = sqlx::query_as::<_, FileRow>(
            "SELECT * FROM files WHERE status = $1 ORDER BY created_at",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list files by status")?;

        Ok(rows)
    }

    /// Mark a file FAILED with an attached message
    pub async fn mark_failed(&self, id: Uuid, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files
            SET status = $1, error_message = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(FileStatus::Failed.as_str())
        .bind(message)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark file as failed")?;

        Ok(())
    }

    /// Transition a file to PROCESSING with its final record count
    ///
    /// Runs on the caller's transaction so the status flip commits together
    /// with the record batch insert.
    pub async fn mark_processing(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        total_records: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files
            SET status = $1, total_records = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(FileStatus::Processing.as_str())
        .bind(total_records)
        .bind(id)
        .execute(conn)
        .await
        .context("Failed to mark file as processing")?;

        Ok(())
    }

    /// Per-file record status counts for every file
    pub async fn rollup_snapshots(&self) -> Result<Vec<RollupSnapshot>> {
        let rows = sqlx::query_as::<_, RollupSnapshot>(
            r#"
            SELECT f.id,
                   f.status,
                   f.processed_count,
                   COUNT(r.id) AS total,
                   COUNT(r.id) FILTER (WHERE r.status = 'PROCESSED') AS processed,
                   COUNT(r.id) FILTER (WHERE r.status = 'FAILED') AS failed
            FROM files f
            LEFT JOIN records r ON r.file_id = f.id
            GROUP BY f.id, f.status, f.processed_count
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load rollup snapshots")?;

        Ok(rows)
    }

    /// Apply a rollup decision: aggregate status plus the settled count
    pub async fn apply_rollup(
        &self,
        id: Uuid,
        status: FileStatus,
        settled_count: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files
            SET status = $1, processed_count = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(settled_count)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to apply rollup to file")?;

        Ok(())
    }
}
