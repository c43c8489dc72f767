//! Remote object-store access
//!
//! REST client for an Azure-blob-style container API: XML listing with
//! marker pagination plus plain GET downloads. The pipeline only depends on
//! the `(name, etag)` shape of the listing and the raw bytes of a fetch.

pub mod client;
pub mod config;

pub use client::{BlobItem, BlobStoreClient};
pub use config::BlobConfig;
