//! Billrelay Common Library
//!
//! Shared error handling and logging initialization for the billrelay
//! workspace members.
//!
//! # Example
//!
//! ```no_run
//! use billrelay_common::{Result, RelayError};
//! use billrelay_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> Result<()> {
//!     let config = LogConfig::from_env().map_err(|e| RelayError::Config(e.to_string()))?;
//!     init_logging(&config).map_err(|e| RelayError::Config(e.to_string()))?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{RelayError, Result};
