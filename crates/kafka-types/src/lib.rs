//! Kafka data model shared by the insulator crates.
//!
//! This crate holds the plain types that flow between the Kafka client
//! (`insulator-kafka`), the configuration repository (`insulator-config`)
//! and the record stream controller (`insulator-record-stream`):
//!
//! - [`cluster`] - connection profiles (endpoint, SSL, SASL, schema registry)
//! - [`consume`] - start positions and deserialization formats
//! - [`message`] - raw broker records and decoded table rows
//! - [`topic`] - topic metadata shown next to the record table
//!
//! It has no dependency on the Kafka client library so the controller and its
//! tests can be built against any record stream implementation.

pub mod cluster;
pub mod consume;
pub mod error;
pub mod message;
pub mod topic;

pub use cluster::{Cluster, SaslConfiguration, SchemaRegistryConfiguration, SslConfiguration};
pub use consume::{ConsumeFrom, DeserializationFormat};
pub use error::{KafkaTypesError, Result};
pub use message::{ConsumedRecord, RawRecord};
pub use topic::TopicMetadata;
