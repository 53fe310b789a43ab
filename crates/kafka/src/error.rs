use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Broker unreachable: {0}")]
    BrokerUnreachable(String),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Broker error: {0}")]
    BrokerError(String),

    /// A single record could not be decoded. Never fatal for a session.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Schema registry error: {0}")]
    SchemaRegistry(String),

    #[error("Schema registry is not configured for this cluster")]
    SchemaRegistryNotConfigured,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Classify an rdkafka error raised while working on `topic`.
    pub fn from_kafka(err: KafkaError, topic: &str) -> Self {
        match err.rdkafka_error_code() {
            Some(code) => Self::from_code(code, topic, err.to_string()),
            None => Self::BrokerError(err.to_string()),
        }
    }

    /// Classify a broker or librdkafka error code. `message` is kept verbatim.
    pub fn from_code(code: RDKafkaErrorCode, topic: &str, message: String) -> Self {
        match code {
            RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::Resolve
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::BrokerNotAvailable
            | RDKafkaErrorCode::NetworkException => Self::BrokerUnreachable(message),
            RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic => {
                Self::TopicNotFound(topic.to_string())
            }
            RDKafkaErrorCode::TopicAuthorizationFailed
            | RDKafkaErrorCode::ClusterAuthorizationFailed
            | RDKafkaErrorCode::GroupAuthorizationFailed => Self::PermissionDenied(message),
            _ => Self::BrokerError(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
