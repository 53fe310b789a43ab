//! Cluster connection profiles.
//!
//! Profiles are stored as JSON by the configuration repository. Every field
//! except `name` and `endpoint` has a default so older files keep loading.
//!
//! ```json
//! {
//!     "guid": "1f0e3c1a-9a7e-4a55-8d0e-3f1e1c2b9a10",
//!     "name": "local",
//!     "endpoint": "localhost:9092",
//!     "useSasl": true,
//!     "saslConfiguration": { "saslUsername": "admin", "saslPassword": "secret", "useScram": true },
//!     "schemaRegistryConfig": { "endpoint": "http://localhost:8081" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    #[serde(default = "Uuid::new_v4")]
    pub guid: Uuid,
    pub name: String,
    /// Bootstrap servers, comma separated
    pub endpoint: String,

    #[serde(default, rename = "useSSL")]
    pub use_ssl: bool,
    #[serde(default)]
    pub ssl_configuration: SslConfiguration,

    #[serde(default)]
    pub use_sasl: bool,
    #[serde(default)]
    pub sasl_configuration: SaslConfiguration,

    #[serde(default)]
    pub schema_registry_config: SchemaRegistryConfiguration,
}

impl Cluster {
    /// Create a plaintext profile with no schema registry.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            guid: Uuid::new_v4(),
            name: name.into(),
            endpoint: endpoint.into(),
            use_ssl: false,
            ssl_configuration: SslConfiguration::default(),
            use_sasl: false,
            sasl_configuration: SaslConfiguration::default(),
            schema_registry_config: SchemaRegistryConfiguration::default(),
        }
    }

    pub fn is_schema_registry_configured(&self) -> bool {
        self.schema_registry_config
            .endpoint
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SslConfiguration {
    pub ssl_truststore_location: Option<String>,
    pub ssl_truststore_password: Option<String>,
    pub ssl_keystore_location: Option<String>,
    pub ssl_key_store_password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaslConfiguration {
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// SCRAM-SHA-512 instead of PLAIN
    pub use_scram: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaRegistryConfiguration {
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}
