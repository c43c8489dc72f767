//! Database models for payload files and their decoded records

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// File lifecycle status
///
/// `Processing` means the file's records exist but are not all settled yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    New,
    Processing,
    Processed,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &str {
        match self {
            FileStatus::New => "NEW",
            FileStatus::Processing => "PROCESSING",
            FileStatus::Processed => "PROCESSED",
            FileStatus::Failed => "FAILED",
        }
    }
}

impl From<String> for FileStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PROCESSING" => FileStatus::Processing,
            "PROCESSED" => FileStatus::Processed,
            "FAILED" => FileStatus::Failed,
            _ => FileStatus::New,
        }
    }
}

/// Record lifecycle status
///
/// A record settles directly from `New` to `Processed` or `Failed`; there is
/// no intermediate state persisted for the remote call itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    New,
    Processed,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RecordStatus::New => "NEW",
            RecordStatus::Processed => "PROCESSED",
            RecordStatus::Failed => "FAILED",
        }
    }

    /// A settled record has reached a terminal status
    pub fn is_settled(&self) -> bool {
        matches!(self, RecordStatus::Processed | RecordStatus::Failed)
    }
}

impl From<String> for RecordStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PROCESSED" => RecordStatus::Processed,
            "FAILED" => RecordStatus::Failed,
            _ => RecordStatus::New,
        }
    }
}

/// One source payload unit (maps to the files table)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRow {
    pub id: Uuid,
    pub source_name: String,
    pub etag: String,
    pub local_path: Option<String>,
    pub status: String,
    pub total_records: i32,
    pub processed_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRow {
    pub fn status(&self) -> FileStatus {
        self.status.clone().into()
    }
}

/// One decoded business entry (maps to the records table)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecordRow {
    pub id: Uuid,
    pub file_id: Uuid,
    pub entry_id: String,
    pub name: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub entry_timestamp: String,
    pub correlation_id: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordRow {
    pub fn status(&self) -> RecordStatus {
        self.status.clone().into()
    }
}

/// A decoded entry ready for insertion as a `NEW` record
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEntry {
    pub entry_id: String,
    pub name: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub timestamp: String,
}
