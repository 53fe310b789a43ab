use kafka_types::Cluster;
use serde::{Deserialize, Serialize};

/// Contents of the configuration file.
///
/// Unknown top-level keys (UI settings and the like) are ignored.
///
/// ```json
/// {
///     "clusters": [
///         { "name": "local", "endpoint": "localhost:9092" }
///     ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

impl Configuration {
    /// Find a cluster by guid, then by exact name, then by case-insensitive name.
    pub fn find_cluster(&self, name_or_guid: &str) -> Option<&Cluster> {
        let needle = name_or_guid.trim();
        self.clusters
            .iter()
            .find(|c| c.guid.to_string() == needle)
            .or_else(|| self.clusters.iter().find(|c| c.name == needle))
            .or_else(|| {
                self.clusters
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(needle))
            })
    }
}
