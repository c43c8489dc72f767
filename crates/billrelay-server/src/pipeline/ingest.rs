//! Ingest stage: discover, dedup, fetch, and stage new payload files

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::blob::{BlobItem, BlobStoreClient};
use crate::db::FileStore;

/// Recorded (source_name, etag) pairs, used to skip already-seen blobs
///
/// The same name with a different etag is a changed source item and counts
/// as unseen; the identical pair is a no-op.
#[derive(Debug, Default)]
pub struct SeenIndex {
    pairs: HashSet<(String, String)>,
}

impl SeenIndex {
    pub fn new(pairs: HashSet<(String, String)>) -> Self {
        Self { pairs }
    }

    pub fn contains(&self, name: &str, etag: &str) -> bool {
        self.pairs
            .contains(&(name.to_string(), etag.to_string()))
    }

    /// The subset of the listing not yet recorded, in source order
    pub fn filter_unseen(&self, listing: Vec<BlobItem>) -> Vec<BlobItem> {
        listing
            .into_iter()
            .filter(|item| !self.contains(&item.name, &item.etag))
            .collect()
    }
}

/// Counters for one ingest pass
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestStats {
    pub listed: usize,
    pub ingested: usize,
    pub already_recorded: usize,
    pub fetch_failures: usize,
}

/// Ingest stage
pub struct IngestStage {
    files: FileStore,
    blob: BlobStoreClient,
    incoming_dir: PathBuf,
}

impl IngestStage {
    pub fn new(files: FileStore, blob: BlobStoreClient, incoming_dir: impl Into<PathBuf>) -> Self {
        Self {
            files,
            blob,
            incoming_dir: incoming_dir.into(),
        }
    }

    /// One ingest pass over the full source listing
    pub async fn run(&self) -> Result<IngestStats> {
        let listing = self
            .blob
            .list()
            .await
            .context("Failed to list source container")?;

        let seen = SeenIndex::new(self.files.seen_pairs().await?);
        let unseen = seen.filter_unseen(listing.clone());

        let mut stats = IngestStats {
            listed: listing.len(),
            ..Default::default()
        };

        if unseen.is_empty() {
            debug!("No unseen blobs in listing");
            return Ok(stats);
        }

        tokio::fs::create_dir_all(&self.incoming_dir)
            .await
            .context("Failed to create incoming directory")?;

        for item in unseen {
            match self.ingest_one(&item).await {
                Ok(Some(file_id)) => {
                    stats.ingested += 1;
                    info!(
                        file_id = %file_id,
                        source_name = %item.name,
                        "Recorded new file"
                    );
                },
                Ok(None) => {
                    // Another worker created this (name, etag) pair first.
                    stats.already_recorded += 1;
                    debug!(source_name = %item.name, etag = %item.etag, "Pair already recorded");
                },
                Err(e) => {
                    // No row is created, so the pair stays unseen and is
                    // retried on the next tick.
                    stats.fetch_failures += 1;
                    warn!(source_name = %item.name, error = %e, "Failed to ingest blob; will retry next tick");
                },
            }
        }

        info!(
            listed = stats.listed,
            ingested = stats.ingested,
            already_recorded = stats.already_recorded,
            fetch_failures = stats.fetch_failures,
            "Ingest pass complete"
        );

        Ok(stats)
    }

    async fn ingest_one(&self, item: &BlobItem) -> Result<Option<uuid::Uuid>> {
        let (bytes, fetched_etag) = self.blob.fetch(&item.name).await?;

        // The etag reported by the download is authoritative; the listing
        // may be stale for an item that changed between the two calls.
        let etag = fetched_etag.unwrap_or_else(|| item.etag.clone());

        let local_path = self.incoming_dir.join(local_file_name(&item.name));
        tokio::fs::write(&local_path, &bytes)
            .await
            .with_context(|| format!("Failed to stage payload at {}", local_path.display()))?;

        self.files
            .insert_new(&item.name, &etag, &local_path.to_string_lossy())
            .await
    }
}

/// Flatten a blob name (which may contain path segments) to a file name
fn local_file_name(blob_name: &str) -> String {
    Path::new(blob_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| blob_name.replace('/', "_"))
}
