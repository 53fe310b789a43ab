//! Kafka capability used by the insulator record stream controller.
//!
//! Features:
//!
//! - Topic Metadata: partition count, internal/compacted flags and a message count
//!   estimate from the partition watermarks
//! - Record Streams: explicit partition assignment from a chosen start position,
//!   either tailing live or replaying up to the watermarks seen at subscribe time
//! - Topic Admin: topic deletion with broker errors surfaced as-is
//! - Value Decoding: raw, UTF-8 string and Confluent-framed Avro via the schema registry

/// Kafka client traits and the rdkafka-backed [`Client`]
///
/// The controller only depends on [`KafkaClient`] and [`RecordStream`], so tests
/// can swap in the in-memory cluster from [`testing`].
pub mod client;

/// rdkafka `ClientConfig` built from a cluster profile
pub mod config;

/// Low-level record stream over an assigned `StreamConsumer`
///
/// Created by the client once start offsets have been resolved.
pub mod consumer;
pub mod decoder;
pub mod error;
pub mod schema_registry;
pub mod testing;

// Re-export from kafka-types for convenience
pub use kafka_types::{
    Cluster, ConsumeFrom, ConsumedRecord, DeserializationFormat, RawRecord, TopicMetadata,
};

pub use client::{Client, KafkaClient, RecordStream};
pub use consumer::KafkaRecordStream;
pub use decoder::{FormatDecoder, RecordDecoder};
pub use error::{Error, Result};
pub use schema_registry::SchemaRegistryClient;
