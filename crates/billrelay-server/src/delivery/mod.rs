//! Remote record delivery
//!
//! SOAP-style `ProcessTransaction` calls over HTTP. The client owns its
//! `reqwest::Client` (and connection pool) and is constructed once at
//! startup and passed into the delivery stage; there is no shared global
//! client state.

pub mod client;
pub mod config;

pub use client::{DeliveryClient, DeliveryError, DeliveryOutcome, DeliveryRequest};
pub use config::DeliveryConfig;
