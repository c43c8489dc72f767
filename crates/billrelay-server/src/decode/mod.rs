//! Payload decoding
//!
//! Payload files are gzip-compressed JSON-lines batches, one flat entry
//! object per line; the entry schema is owned by the upstream producer.
//! The adapter in [`batch`] turns a raw byte blob into well-formed
//! [`crate::models::DecodedEntry`] values with explicit defaulting rules
//! for the optional fields.

pub mod batch;

pub use batch::{BatchDecoder, DecodeError};
