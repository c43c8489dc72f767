//! Batch payload decoder with tolerant field extraction

use bigdecimal::BigDecimal;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::models::DecodedEntry;

/// Errors for payload decoding
///
/// Any of these fails the whole file; a batch is never partially decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Payload is not valid gzip: {0}")]
    Compression(#[source] std::io::Error),

    #[error("Payload is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Malformed entry at line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One entry as it appears on the wire
///
/// Producers disagree on field naming, so the known variants are accepted
/// as aliases. Absent optionals default to empty string / zero downstream.
#[derive(Debug, Default, Deserialize)]
struct RawEntry {
    #[serde(default, alias = "recordId", alias = "id")]
    record_id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "amt")]
    amount: Option<Value>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default, alias = "time")]
    timestamp: Option<String>,
}

impl RawEntry {
    fn into_entry(self) -> DecodedEntry {
        DecodedEntry {
            entry_id: coerce_string(self.record_id),
            name: self.name.unwrap_or_default(),
            amount: coerce_amount(self.amount),
            currency: self.currency.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or_default(),
        }
    }
}

fn coerce_string(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Coerce a wire amount into a fixed-precision decimal
///
/// Malformed numeric input falls back to zero instead of failing the batch.
/// The original bad value is lost; that trade-off is inherited behavior.
fn coerce_amount(value: Option<Value>) -> BigDecimal {
    let parsed = match value {
        Some(Value::Number(n)) => BigDecimal::from_str(&n.to_string()).ok(),
        Some(Value::String(s)) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    };

    parsed.unwrap_or_else(|| BigDecimal::from(0))
}

/// Decoder for gzip-compressed JSON-lines payload batches
#[derive(Debug, Clone, Default)]
pub struct BatchDecoder;

impl BatchDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a payload blob into its entries
    ///
    /// Accepts either a gzipped or a plain JSON-lines body (sniffed by the
    /// gzip magic bytes). Blank lines are skipped; a malformed line fails
    /// the whole batch.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<DecodedEntry>, DecodeError> {
        let text = decompress(bytes)?;

        let mut entries = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let raw: RawEntry = serde_json::from_str(line).map_err(|source| {
                DecodeError::Malformed {
                    line: index + 1,
                    source,
                }
            })?;
            entries.push(raw.into_entry());
        }

        debug!(count = entries.len(), "Decoded payload batch");
        Ok(entries)
    }
}

fn decompress(bytes: &[u8]) -> Result<String, DecodeError> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut decoder = GzDecoder::new(bytes);
        let mut text = String::new();
        decoder
            .read_to_string(&mut text)
            .map_err(DecodeError::Compression)?;
        Ok(text)
    } else {
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}
