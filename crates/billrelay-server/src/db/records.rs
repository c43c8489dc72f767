//! Queries over the records table

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{DecodedEntry, RecordRow, RecordStatus};

/// Store for record rows
#[derive(Clone)]
pub struct RecordStore {
    pool: PgPool,
}

impl RecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one decoded batch on the caller's transaction
    ///
    /// All rows for a file commit (or roll back) together with the file's
    /// own status transition.
    pub async fn insert_batch(
        &self,
        conn: &mut PgConnection,
        file_id: Uuid,
        entries: &[DecodedEntry],
    ) -> Result<usize> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO records (
                    id, file_id, entry_id, name, amount, currency,
                    entry_timestamp, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(file_id)
            .bind(&entry.entry_id)
            .bind(&entry.name)
            .bind(&entry.amount)
            .bind(&entry.currency)
            .bind(&entry.timestamp)
            .bind(RecordStatus::New.as_str())
            .execute(&mut *conn)
            .await
            .context("Failed to insert record row")?;
        }

        Ok(entries.len())
    }

    /// Fetch NEW records up to the batch limit, oldest first
    pub async fn list_new(&self, limit: i64) -> Result<Vec<RecordRow>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT * FROM records
            WHERE status = $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(RecordStatus::New.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list NEW records")?;

        Ok(rows)
    }

    /// Settle a record as PROCESSED
    pub async fn mark_processed(&self, id: Uuid, correlation_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE records
            SET status = $1, correlation_id = $2, error_message = NULL,
                updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(RecordStatus::Processed.as_str())
        .bind(correlation_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark record as processed")?;

        Ok(())
    }

    /// Settle a record as FAILED with the delivery error attached
    pub async fn mark_failed(
        &self,
        id: Uuid,
        correlation_id: &str,
        error_message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE records
            SET status = $1, correlation_id = $2, error_message = $3,
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(RecordStatus::Failed.as_str())
        .bind(correlation_id)
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark record as failed")?;

        Ok(())
    }
}
