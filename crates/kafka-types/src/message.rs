//! Kafka message types.
//!
//! [`RawRecord`] is what a record stream yields: bytes plus broker metadata.
//! [`ConsumedRecord`] is the decoded, display-ready row kept by the record
//! table. Rows are immutable once created and shared behind `Arc`.

use chrono::{DateTime, Utc};

/// A record as received from the broker, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Kafka topic name
    pub topic: String,
    /// Kafka partition number
    pub partition: i32,
    /// Kafka offset within the partition
    pub offset: i64,
    /// Message timestamp in milliseconds since epoch (if available)
    pub timestamp: Option<i64>,
    /// Message key (if any)
    pub key: Option<Vec<u8>>,
    /// Message payload, `None` for tombstones
    pub payload: Option<Vec<u8>>,
}

/// One decoded row of the record table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    pub timestamp: DateTime<Utc>,
    pub key: Option<String>,
    pub value: String,
    pub partition: i32,
    pub offset: i64,
    /// The value could not be decoded and holds a placeholder instead
    pub decode_failed: bool,
}

impl ConsumedRecord {
    /// Tab separated `timestamp key value`, the format copied out of the table.
    pub fn to_clipboard_line(&self) -> String {
        format!(
            "{}\t{}\t{}",
            self.timestamp.to_rfc3339(),
            self.key.as_deref().unwrap_or("null"),
            self.value
        )
    }
}
