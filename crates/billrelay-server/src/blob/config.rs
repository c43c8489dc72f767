//! Object-store configuration (BLOB_* environment variables)

use serde::{Deserialize, Serialize};

/// Default request timeout for listing calls in seconds.
pub const DEFAULT_LIST_TIMEOUT_SECS: u64 = 30;

/// Default request timeout for downloads in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Object-store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Storage account name, used to derive the endpoint when no explicit
    /// base URL is configured
    pub account: String,
    /// Container holding the payload files
    pub container: String,
    /// Explicit endpoint override (emulators, proxies, tests)
    pub base_url: Option<String>,
    /// Shared-access signature appended to every request URL
    pub sas_token: Option<String>,
    /// Basic-auth credentials for proxies that expect them
    pub basic_user: Option<String>,
    pub basic_pass: Option<String>,
    pub list_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl BlobConfig {
    /// Load from BLOB_* environment variables
    pub fn from_env() -> Self {
        Self {
            account: std::env::var("BLOB_ACCOUNT").unwrap_or_default(),
            container: std::env::var("BLOB_CONTAINER").unwrap_or_default(),
            base_url: std::env::var("BLOB_BASE_URL").ok(),
            sas_token: std::env::var("BLOB_SAS_TOKEN").ok(),
            basic_user: std::env::var("BLOB_BASIC_USER").ok(),
            basic_pass: std::env::var("BLOB_BASIC_PASS").ok(),
            list_timeout_secs: std::env::var("BLOB_LIST_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_LIST_TIMEOUT_SECS),
            fetch_timeout_secs: std::env::var("BLOB_FETCH_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }

    /// Validate that an endpoint can be derived
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.container.is_empty() {
            anyhow::bail!("BLOB_CONTAINER must not be empty");
        }
        if self.account.is_empty() && self.base_url.is_none() {
            anyhow::bail!("Either BLOB_ACCOUNT or BLOB_BASE_URL must be set");
        }
        Ok(())
    }

    /// Root endpoint, without the container segment
    pub fn endpoint(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.blob.core.windows.net", self.account),
        }
    }
}
