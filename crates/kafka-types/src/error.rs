//! Error types for kafka-types crate.

use thiserror::Error;

/// Errors raised while parsing user-supplied Kafka settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KafkaTypesError {
    #[error("Invalid start position '{0}': expected beginning, now, last-hour, last-day, last-week, last:<N> or since:<RFC3339>")]
    InvalidStartPosition(String),

    #[error("Invalid deserialization format '{0}': expected raw, string or avro")]
    InvalidFormat(String),
}

/// Result type alias for kafka-types operations.
pub type Result<T> = std::result::Result<T, KafkaTypesError>;
