//! Postgres advisory lock for singleton pipeline execution
//!
//! `pg_try_advisory_lock` / `pg_advisory_unlock` are session-scoped, so the
//! guard owns the acquiring connection for its whole lifetime and the unlock
//! runs on that same session. Pooled connections are reused rather than
//! closed when returned, which means a lock that is never released would
//! survive the guard. `release` must run on every exit path, with a spawned
//! best-effort unlock as the fallback when a guard is dropped early.

use anyhow::{Context, Result};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::{debug, warn};

/// Advisory lock keyed by a fixed project-unique integer
#[derive(Clone)]
pub struct AdvisoryLock {
    pool: PgPool,
    key: i64,
}

impl AdvisoryLock {
    pub fn new(pool: PgPool, key: i64) -> Self {
        Self { pool, key }
    }

    /// Try to acquire the lock without blocking
    ///
    /// Returns `None` when another session holds it. That is expected
    /// contention, not an error.
    pub async fn try_acquire(&self) -> Result<Option<LockGuard>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for advisory lock")?;

        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(self.key)
            .fetch_one(&mut *conn)
            .await
            .context("pg_try_advisory_lock failed")?;

        if acquired {
            debug!(key = self.key, "Acquired advisory lock");
            Ok(Some(LockGuard {
                conn: Some(conn),
                key: self.key,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Scoped ownership of a held advisory lock
///
/// Call [`LockGuard::release`] on every exit path. Dropping the guard
/// without releasing spawns a best-effort unlock on the owned session.
pub struct LockGuard {
    conn: Option<PoolConnection<Postgres>>,
    key: i64,
}

impl LockGuard {
    /// Release the lock on the session that acquired it
    ///
    /// An unlock failure is logged, never re-raised.
    pub async fn release(mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        let result: Result<(bool,), sqlx::Error> =
            sqlx::query_as("SELECT pg_advisory_unlock($1)")
                .bind(self.key)
                .fetch_one(&mut *conn)
                .await;

        match result {
            Ok((true,)) => debug!(key = self.key, "Released advisory lock"),
            Ok((false,)) => warn!(key = self.key, "Advisory lock was not held at release"),
            Err(e) => warn!(key = self.key, error = %e, "Failed to release advisory lock"),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let key = self.key;
        warn!(key, "Lock guard dropped without explicit release; unlocking in background");

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
                    .bind(key)
                    .execute(&mut *conn)
                    .await
                {
                    warn!(key, error = %e, "Best-effort advisory unlock failed");
                }
            });
        }
    }
}
