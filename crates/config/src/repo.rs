//! Configuration repository trait

use anyhow::Result;
use async_trait::async_trait;
use kafka_types::Cluster;

use crate::Configuration;

/// Read access to the stored configuration.
#[async_trait]
pub trait ConfigurationRepo: Send + Sync {
    /// Load the whole configuration. A missing store yields an empty one.
    async fn get_configuration(&self) -> Result<Configuration>;

    /// Resolve a cluster by name or guid.
    async fn find_cluster(&self, name_or_guid: &str) -> Result<Cluster> {
        let configuration = self.get_configuration().await?;
        configuration
            .find_cluster(name_or_guid)
            .cloned()
            .ok_or_else(|| {
                let known: Vec<&str> = configuration
                    .clusters
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect();
                anyhow::anyhow!(
                    "Cluster '{name_or_guid}' not found (configured: {})",
                    if known.is_empty() {
                        "none".to_string()
                    } else {
                        known.join(", ")
                    }
                )
            })
    }
}
