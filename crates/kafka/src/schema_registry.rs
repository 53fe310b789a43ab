//! Minimal Confluent schema registry client.
//!
//! Only schema lookup by id is needed to decode Avro values, so that is all
//! this client does. Parsed schemas are cached for the lifetime of the client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use apache_avro::Schema;
use kafka_types::cluster::SchemaRegistryConfiguration;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    schema: String,
}

pub struct SchemaRegistryClient {
    http: HttpClient,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
    cache: RwLock<HashMap<u32, Arc<Schema>>>,
}

impl SchemaRegistryClient {
    pub fn new(config: &SchemaRegistryConfiguration) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(Error::SchemaRegistryNotConfigured)?;

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::SchemaRegistry(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Writer schema registered under `id`.
    pub async fn schema(&self, id: u32) -> Result<Arc<Schema>> {
        if let Some(schema) = self.cache.read().await.get(&id) {
            return Ok(Arc::clone(schema));
        }

        let url = format!("{}/schemas/ids/{id}", self.endpoint);
        tracing::debug!("Fetching schema {id} from {url}");

        let mut request = self.http.get(&url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::SchemaRegistry(format!("Failed to fetch schema from '{url}': {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::SchemaRegistry(format!(
                "Schema registry returned status {status} for {url}"
            )));
        }

        let body: SchemaResponse = response
            .json()
            .await
            .map_err(|e| Error::SchemaRegistry(format!("Invalid response from '{url}': {e}")))?;

        let schema = Schema::parse_str(&body.schema)
            .map_err(|e| Error::SchemaRegistry(format!("Failed to parse schema {id}: {e}")))?;
        let schema = Arc::new(schema);

        self.cache.write().await.insert(id, Arc::clone(&schema));
        Ok(schema)
    }

    #[cfg(test)]
    pub(crate) async fn insert_schema(&self, id: u32, schema: Schema) {
        self.cache.write().await.insert(id, Arc::new(schema));
    }
}
