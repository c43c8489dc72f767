//! Object-store REST client (listing + downloads)

use billrelay_common::RelayError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::config::BlobConfig;

/// One entry of the container listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    pub name: String,
    pub etag: String,
}

/// Client for listing and fetching payload blobs
pub struct BlobStoreClient {
    client: Client,
    config: BlobConfig,
}

impl BlobStoreClient {
    /// Create a new client with configured timeouts
    pub fn new(config: BlobConfig) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs.max(config.list_timeout_secs)))
            .user_agent("billrelay/0.1")
            .build()
            .map_err(|e| RelayError::network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.config.endpoint(), self.config.container)
    }

    fn with_sas(&self, url: String) -> String {
        match &self.config.sas_token {
            Some(sas) => {
                let sep = if url.contains('?') { '&' } else { '?' };
                format!("{}{}{}", url, sep, sas.trim_start_matches('?'))
            },
            None => url,
        }
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.config.basic_user, &self.config.basic_pass) {
            (Some(user), Some(pass)) => request.basic_auth(user, Some(pass)),
            _ => request,
        }
    }

    /// List every blob in the container
    ///
    /// Follows `NextMarker` pagination internally and returns the full
    /// listing in source-reported order.
    pub async fn list(&self) -> Result<Vec<BlobItem>, RelayError> {
        let mut items = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let url = self.with_sas(format!("{}?restype=container&comp=list", self.container_url()));

            let mut request = self.client.get(&url);
            if let Some(ref m) = marker {
                request = request.query(&[("marker", m)]);
            }

            let response = self
                .apply_auth(request)
                .send()
                .await
                .map_err(|e| RelayError::network(format!("Blob listing request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(RelayError::network(format!(
                    "Blob listing returned HTTP {}",
                    response.status()
                )));
            }

            let body = response
                .text()
                .await
                .map_err(|e| RelayError::network(format!("Failed to read listing body: {}", e)))?;

            let page = parse_listing(&body)?;
            debug!(count = page.items.len(), "Fetched listing page");
            items.extend(page.items);

            match page.next_marker {
                Some(m) if !m.is_empty() => marker = Some(m),
                _ => break,
            }
        }

        info!(count = items.len(), container = %self.config.container, "Listed blobs");
        Ok(items)
    }

    /// Download one blob
    ///
    /// Returns the body bytes and the etag the download itself reported,
    /// which is authoritative over the listing's etag.
    pub async fn fetch(&self, name: &str) -> Result<(Vec<u8>, Option<String>), RelayError> {
        let url = self.with_sas(format!("{}/{}", self.container_url(), name));

        let response = self
            .apply_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|e| RelayError::network(format!("Blob download failed for {}: {}", name, e)))?;

        if !response.status().is_success() {
            return Err(RelayError::network(format!(
                "Blob download for {} returned HTTP {}",
                name,
                response.status()
            )));
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RelayError::network(format!("Failed to read blob body: {}", e)))?;

        debug!(name, bytes = bytes.len(), etag = ?etag, "Downloaded blob");
        Ok((bytes.to_vec(), etag))
    }
}

/// One parsed page of the container listing
struct ListingPage {
    items: Vec<BlobItem>,
    next_marker: Option<String>,
}

// XML shape of the `List Blobs` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    blobs: Option<BlobsNode>,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlobsNode {
    #[serde(rename = "Blob", default)]
    blobs: Vec<BlobNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobNode {
    name: String,
    #[serde(default)]
    properties: Option<PropertiesNode>,
}

#[derive(Debug, Deserialize)]
struct PropertiesNode {
    #[serde(rename = "Etag", default)]
    etag: Option<String>,
}

fn parse_listing(body: &str) -> Result<ListingPage, RelayError> {
    let results: EnumerationResults = quick_xml::de::from_str(body)
        .map_err(|e| RelayError::parse(format!("Malformed blob listing XML: {}", e)))?;

    let items = results
        .blobs
        .map(|b| b.blobs)
        .unwrap_or_default()
        .into_iter()
        .map(|blob| BlobItem {
            name: blob.name,
            etag: blob
                .properties
                .and_then(|p| p.etag)
                .unwrap_or_default()
                .trim_matches('"')
                .to_string(),
        })
        .collect();

    Ok(ListingPage {
        items,
        next_marker: results.next_marker.filter(|m| !m.is_empty()),
    })
}
