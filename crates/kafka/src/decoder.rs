//! Record value decoding.
//!
//! Values are decoded according to the session's [`DeserializationFormat`]:
//!
//! - `raw`: base64 of the bytes, never fails
//! - `string`: strict UTF-8
//! - `avro`: Confluent wire format (magic byte `0`, big-endian schema id, Avro
//!   datum), rendered as compact JSON
//!
//! Keys are always shown as text: lossy UTF-8, or base64 in `raw` mode.

use apache_avro::types::Value as AvroValue;
use async_trait::async_trait;
use base64::Engine;
use kafka_types::{Cluster, DeserializationFormat};

use crate::error::{Error, Result};
use crate::schema_registry::SchemaRegistryClient;

/// Confluent framing: magic byte + 4 byte schema id
const CONFLUENT_HEADER_LEN: usize = 5;

#[async_trait]
pub trait RecordDecoder: Send + Sync {
    /// Decode a record value into display text.
    async fn decode(&self, bytes: &[u8], format: DeserializationFormat) -> Result<String>;

    /// Decode a record key into display text. Never fails.
    fn decode_key(&self, bytes: &[u8], format: DeserializationFormat) -> String {
        match format {
            DeserializationFormat::Raw => base64::engine::general_purpose::STANDARD.encode(bytes),
            DeserializationFormat::String | DeserializationFormat::Avro => {
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }

    /// Whether `format` can be decoded at all (Avro needs a schema registry).
    fn supports(&self, format: DeserializationFormat) -> bool;
}

/// Decoder for the built-in formats
pub struct FormatDecoder {
    registry: Option<SchemaRegistryClient>,
}

impl FormatDecoder {
    pub fn new(registry: Option<SchemaRegistryClient>) -> Self {
        Self { registry }
    }

    /// Decoder for `cluster`, with Avro support when a registry is configured.
    pub fn for_cluster(cluster: &Cluster) -> Result<Self> {
        let registry = if cluster.is_schema_registry_configured() {
            Some(SchemaRegistryClient::new(&cluster.schema_registry_config)?)
        } else {
            None
        };
        Ok(Self::new(registry))
    }

    async fn decode_avro(&self, bytes: &[u8]) -> Result<String> {
        let registry = self
            .registry
            .as_ref()
            .ok_or(Error::SchemaRegistryNotConfigured)?;

        if bytes.len() < CONFLUENT_HEADER_LEN || bytes[0] != 0 {
            return Err(Error::Decode(
                "value is not in Confluent Avro wire format".to_string(),
            ));
        }
        let schema_id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let schema = registry.schema(schema_id).await?;

        let mut datum = &bytes[CONFLUENT_HEADER_LEN..];
        let value = apache_avro::from_avro_datum(&schema, &mut datum, None)
            .map_err(|e| Error::Decode(format!("avro decode with schema {schema_id}: {e}")))?;

        serde_json::to_string(&avro_to_json(&value))
            .map_err(|e| Error::Decode(format!("avro value is not representable as JSON: {e}")))
    }
}

#[async_trait]
impl RecordDecoder for FormatDecoder {
    async fn decode(&self, bytes: &[u8], format: DeserializationFormat) -> Result<String> {
        match format {
            DeserializationFormat::Raw => {
                Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            DeserializationFormat::String => String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::Decode(format!("value is not valid UTF-8: {e}"))),
            DeserializationFormat::Avro => self.decode_avro(bytes).await,
        }
    }

    fn supports(&self, format: DeserializationFormat) -> bool {
        !format.requires_schema_registry() || self.registry.is_some()
    }
}

fn avro_to_json(value: &AvroValue) -> serde_json::Value {
    let b64 = |b: &[u8]| {
        serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
    };
    match value {
        AvroValue::Null => serde_json::Value::Null,
        AvroValue::Boolean(b) => serde_json::Value::Bool(*b),
        AvroValue::Int(i) => serde_json::json!(i),
        AvroValue::Long(l) => serde_json::json!(l),
        AvroValue::Float(f) => serde_json::json!(f),
        AvroValue::Double(d) => serde_json::json!(d),
        AvroValue::Bytes(b) | AvroValue::Fixed(_, b) => b64(b),
        AvroValue::String(s) | AvroValue::Enum(_, s) => serde_json::Value::String(s.clone()),
        AvroValue::Union(_, inner) => avro_to_json(inner),
        AvroValue::Array(items) => serde_json::Value::Array(items.iter().map(avro_to_json).collect()),
        AvroValue::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), avro_to_json(v)))
                .collect(),
        ),
        AvroValue::Record(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), avro_to_json(v)))
                .collect(),
        ),
        AvroValue::Date(d) => serde_json::json!(d),
        AvroValue::TimeMillis(t) => serde_json::json!(t),
        AvroValue::TimeMicros(t) => serde_json::json!(t),
        AvroValue::TimestampMillis(t)
        | AvroValue::TimestampMicros(t)
        | AvroValue::TimestampNanos(t)
        | AvroValue::LocalTimestampMillis(t)
        | AvroValue::LocalTimestampMicros(t)
        | AvroValue::LocalTimestampNanos(t) => serde_json::json!(t),
        AvroValue::Decimal(d) => {
            let bytes: Vec<u8> = d.try_into().unwrap_or_default();
            b64(&bytes)
        }
        AvroValue::BigDecimal(d) => serde_json::Value::String(d.to_string()),
        AvroValue::Uuid(u) => serde_json::Value::String(u.to_string()),
        AvroValue::Duration(_) => serde_json::Value::Null,
    }
}
