use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use kafka_types::{Cluster, ConsumeFrom, RawRecord, TopicMetadata};
use rdkafka::admin::{AdminClient, AdminOptions, ResourceSpecifier};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer as RdkafkaConsumer};
use tracing::{debug, info, warn};

use crate::config::client_config;
use crate::consumer::{plan_assignment, topic_watermarks, KafkaRecordStream, METADATA_TIMEOUT};
use crate::error::{Error, Result};

/// Timeout for admin requests (delete, describe configs)
const ADMIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Cluster operations needed by the record stream controller.
#[async_trait]
pub trait KafkaClient: Send + Sync {
    /// One-shot topic metadata lookup.
    async fn fetch_topic_metadata(&self, topic: &str) -> Result<TopicMetadata>;

    /// Open a record stream on every partition of `topic`.
    ///
    /// With `follow` the stream tails the topic forever, otherwise it ends once
    /// every partition reached the high watermark observed when subscribing.
    async fn subscribe(
        &self,
        topic: &str,
        from: ConsumeFrom,
        follow: bool,
    ) -> Result<Box<dyn RecordStream>>;

    /// Delete a topic. Irreversible.
    async fn delete_topic(&self, topic: &str) -> Result<()>;
}

/// A stream of raw records owned by one consumption session.
#[async_trait]
pub trait RecordStream: Send {
    /// Next record, `Ok(None)` at the end of a bounded replay.
    async fn next(&mut self) -> Result<Option<RawRecord>>;

    /// Release the underlying consumer. Further calls to `next` return `Ok(None)`.
    async fn close(&mut self);
}

/// rdkafka-backed client for one cluster profile
pub struct Client {
    cluster_name: String,
    config: ClientConfig,
}

impl Client {
    /// Build a client for `cluster` and check that a broker answers.
    pub async fn connect(cluster: &Cluster) -> Result<Self> {
        let client = Self::new(cluster)?;
        let config = client.config.clone();
        let name = client.cluster_name.clone();

        tokio::task::spawn_blocking(move || {
            let consumer: BaseConsumer = config
                .create()
                .map_err(|e| Error::from_kafka(e, ""))?;
            let metadata = consumer
                .fetch_metadata(None, METADATA_TIMEOUT)
                .map_err(|e| Error::from_kafka(e, ""))?;
            info!(
                "Connected to cluster {name}: {} broker(s), {} topic(s)",
                metadata.brokers().len(),
                metadata.topics().len()
            );
            Ok::<_, Error>(())
        })
        .await
        .map_err(|e| Error::BrokerError(format!("Connection check failed: {e}")))??;

        Ok(client)
    }

    /// Build a client without contacting the cluster.
    pub fn new(cluster: &Cluster) -> Result<Self> {
        Ok(Self {
            cluster_name: cluster.name.clone(),
            config: client_config(cluster)?,
        })
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    fn admin(&self, topic: &str) -> Result<AdminClient<DefaultClientContext>> {
        self.config
            .create()
            .map_err(|e| Error::from_kafka(e, topic))
    }

    /// Whether `cleanup.policy` of the topic contains `compact`.
    async fn is_compacted(&self, topic: &str) -> Result<bool> {
        let admin = self.admin(topic)?;
        let opts = AdminOptions::new().request_timeout(Some(ADMIN_TIMEOUT));
        let results = admin
            .describe_configs(&[ResourceSpecifier::Topic(topic)], &opts)
            .await
            .map_err(|e| Error::from_kafka(e, topic))?;

        for result in results {
            let resource = result.map_err(|code| {
                Error::from_code(
                    code,
                    topic,
                    format!("Failed to describe topic '{topic}': {code}"),
                )
            })?;
            if let Some(entry) = resource.get("cleanup.policy") {
                return Ok(entry
                    .value
                    .as_deref()
                    .is_some_and(|policy| policy.contains("compact")));
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl KafkaClient for Client {
    async fn fetch_topic_metadata(&self, topic: &str) -> Result<TopicMetadata> {
        let config = self.config.clone();
        let name = topic.to_string();
        let watermarks = tokio::task::spawn_blocking(move || {
            let consumer: BaseConsumer = config
                .create()
                .map_err(|e| Error::from_kafka(e, &name))?;
            topic_watermarks(&consumer, &name)
        })
        .await
        .map_err(|e| Error::BrokerError(format!("Metadata lookup failed: {e}")))??;

        // Describing configs needs extra ACLs; the flag is best-effort
        let is_compacted = match self.is_compacted(topic).await {
            Ok(compacted) => compacted,
            Err(e) => {
                warn!("Could not read cleanup.policy of topic {topic}: {e}");
                false
            }
        };

        let message_count = watermarks
            .iter()
            .map(|w| u64::try_from(w.high - w.low).unwrap_or(0))
            .sum();

        debug!("Loaded metadata of topic {topic}: {watermarks:?}");

        Ok(TopicMetadata {
            name: topic.to_string(),
            is_internal: TopicMetadata::is_internal_name(topic),
            partition_count: watermarks.len(),
            is_compacted,
            message_count,
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        from: ConsumeFrom,
        follow: bool,
    ) -> Result<Box<dyn RecordStream>> {
        let config = self.config.clone();
        let name = topic.to_string();
        let plan = tokio::task::spawn_blocking(move || {
            plan_assignment(&config, &name, &from, Utc::now())
        })
        .await
        .map_err(|e| Error::BrokerError(format!("Offset lookup failed: {e}")))??;

        debug!("Partition plan for topic {topic} from {from}: {plan:?}");

        let stream = KafkaRecordStream::open(&self.config, topic, &plan, follow)?;
        Ok(Box::new(stream))
    }

    async fn delete_topic(&self, topic: &str) -> Result<()> {
        let admin = self.admin(topic)?;
        let opts = AdminOptions::new().operation_timeout(Some(ADMIN_TIMEOUT));

        let results = admin
            .delete_topics(&[topic], &opts)
            .await
            .map_err(|e| Error::from_kafka(e, topic))?;

        for result in results {
            match result {
                Ok(name) => info!("Topic '{name}' deleted from cluster {}", self.cluster_name),
                Err((name, code)) => {
                    return Err(Error::from_code(
                        code,
                        &name,
                        format!("Failed to delete topic '{name}': {code}"),
                    ));
                }
            }
        }

        Ok(())
    }
}
