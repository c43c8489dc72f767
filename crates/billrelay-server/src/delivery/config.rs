//! Delivery endpoint configuration (DELIVERY_* environment variables)

use serde::{Deserialize, Serialize};

/// Default remote-call timeout in seconds.
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 30;

/// Default maximum delivery attempts per record.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff base delay in milliseconds.
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;

/// Remote delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Endpoint accepting ProcessTransaction envelopes
    pub endpoint: String,
    /// Basic-auth credentials, when the endpoint requires them
    pub user: Option<String>,
    pub pass: Option<String>,
    pub timeout_secs: u64,
    /// Attempt budget per record; transport failures retry inside it
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts
    pub base_backoff_ms: u64,
}

impl DeliveryConfig {
    /// Load from DELIVERY_* environment variables
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("DELIVERY_ENDPOINT").unwrap_or_default(),
            user: std::env::var("DELIVERY_USER").ok(),
            pass: std::env::var("DELIVERY_PASS").ok(),
            timeout_secs: std::env::var("DELIVERY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DELIVERY_TIMEOUT_SECS),
            max_attempts: std::env::var("DELIVERY_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            base_backoff_ms: std::env::var("DELIVERY_BASE_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BASE_BACKOFF_MS),
        }
    }

    /// Validate endpoint and retry settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.endpoint.is_empty() {
            anyhow::bail!("DELIVERY_ENDPOINT must not be empty");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("DELIVERY_MAX_ATTEMPTS must be at least 1");
        }
        Ok(())
    }
}
