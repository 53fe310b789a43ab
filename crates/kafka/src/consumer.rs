use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kafka_types::{ConsumeFrom, RawRecord};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer as RdkafkaConsumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message as RdkafkaMessage;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info, warn};

use crate::client::RecordStream;
use crate::error::{Error, Result};

/// Timeout for blocking metadata, watermark and offset lookups
pub(crate) const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Low and high watermark of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PartitionWatermarks {
    pub partition: i32,
    pub low: i64,
    pub high: i64,
}

/// Where one partition starts and, for bounded replay, where it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub partition: i32,
    pub start: i64,
    /// High watermark at subscribe time (exclusive)
    pub end: i64,
}

impl PartitionPlan {
    fn is_exhausted(&self) -> bool {
        self.start >= self.end
    }
}

/// Start offset for positions that do not need a timestamp lookup.
pub(crate) fn start_offset(from: &ConsumeFrom, low: i64, high: i64) -> Option<i64> {
    match from {
        ConsumeFrom::Beginning => Some(low),
        ConsumeFrom::Now => Some(high),
        ConsumeFrom::LastRecords(n) => {
            let n = i64::try_from(*n).unwrap_or(i64::MAX);
            Some(high.saturating_sub(n).max(low))
        }
        ConsumeFrom::LastHour
        | ConsumeFrom::LastDay
        | ConsumeFrom::LastWeek
        | ConsumeFrom::Since(_) => None,
    }
}

/// Partition ids of `topic` with their watermarks. Blocking.
pub(crate) fn topic_watermarks(
    consumer: &BaseConsumer,
    topic: &str,
) -> Result<Vec<PartitionWatermarks>> {
    let metadata = consumer
        .fetch_metadata(Some(topic), METADATA_TIMEOUT)
        .map_err(|e| Error::from_kafka(e, topic))?;

    let topic_metadata = metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?;

    if let Some(err) = topic_metadata.error() {
        let code = rdkafka::error::RDKafkaErrorCode::from(err);
        return Err(Error::from_code(
            code,
            topic,
            format!("Failed to load metadata of topic '{topic}': {code}"),
        ));
    }

    let mut watermarks = Vec::with_capacity(topic_metadata.partitions().len());
    for partition in topic_metadata.partitions() {
        let (low, high) = consumer
            .fetch_watermarks(topic, partition.id(), METADATA_TIMEOUT)
            .map_err(|e| Error::from_kafka(e, topic))?;
        watermarks.push(PartitionWatermarks {
            partition: partition.id(),
            low,
            high,
        });
    }
    watermarks.sort_by_key(|w| w.partition);
    Ok(watermarks)
}

/// Resolve start and end offsets of every partition. Blocking.
pub(crate) fn plan_assignment(
    config: &ClientConfig,
    topic: &str,
    from: &ConsumeFrom,
    now: DateTime<Utc>,
) -> Result<Vec<PartitionPlan>> {
    let consumer: BaseConsumer = config
        .create()
        .map_err(|e| Error::from_kafka(e, topic))?;
    let watermarks = topic_watermarks(&consumer, topic)?;

    let Some(since) = from.start_timestamp(now) else {
        return Ok(watermarks
            .iter()
            .map(|w| PartitionPlan {
                partition: w.partition,
                start: start_offset(from, w.low, w.high).unwrap_or(w.low),
                end: w.high,
            })
            .collect());
    };

    let mut lookup = TopicPartitionList::new();
    for w in &watermarks {
        lookup
            .add_partition_offset(topic, w.partition, Offset::Offset(since.timestamp_millis()))
            .map_err(|e| Error::from_kafka(e, topic))?;
    }
    let resolved = consumer
        .offsets_for_times(lookup, METADATA_TIMEOUT)
        .map_err(|e| Error::from_kafka(e, topic))?;

    let mut starts = HashMap::new();
    for elem in resolved.elements() {
        if let Offset::Offset(offset) = elem.offset() {
            starts.insert(elem.partition(), offset);
        }
    }

    // No record at or after the timestamp: start at the end of the partition
    Ok(watermarks
        .iter()
        .map(|w| PartitionPlan {
            partition: w.partition,
            start: starts.get(&w.partition).copied().unwrap_or(w.high).max(w.low),
            end: w.high,
        })
        .collect())
}

/// A record stream over a `StreamConsumer` with explicit partition assignment.
///
/// No consumer group offsets are committed; every stream uses a throwaway
/// group id so browsing never moves anyone else's position.
pub struct KafkaRecordStream {
    consumer: Option<StreamConsumer>,
    topic: String,
    follow: bool,
    /// Partitions still replaying, mapped to their end offset (bounded mode only)
    remaining: HashMap<i32, i64>,
}

impl KafkaRecordStream {
    /// Create the consumer and assign it to the planned offsets.
    pub fn open(
        base: &ClientConfig,
        topic: &str,
        plan: &[PartitionPlan],
        follow: bool,
    ) -> Result<Self> {
        let mut config = base.clone();
        config
            .set("group.id", format!("insulator-{}", uuid::Uuid::new_v4()))
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", (!follow).to_string());

        let consumer: StreamConsumer = config
            .create()
            .map_err(|e| Error::from_kafka(e, topic))?;

        let mut assignment = TopicPartitionList::new();
        for p in plan {
            assignment
                .add_partition_offset(topic, p.partition, Offset::Offset(p.start))
                .map_err(|e| Error::from_kafka(e, topic))?;
        }
        consumer
            .assign(&assignment)
            .map_err(|e| Error::from_kafka(e, topic))?;

        let remaining = if follow {
            HashMap::new()
        } else {
            plan.iter()
                .filter(|p| !p.is_exhausted())
                .map(|p| (p.partition, p.end))
                .collect()
        };

        info!(
            "Assigned {} partition(s) of topic {topic} (follow: {follow})",
            plan.len()
        );

        Ok(Self {
            consumer: Some(consumer),
            topic: topic.to_string(),
            follow,
            remaining,
        })
    }

    /// Record the position reached in a partition during bounded replay.
    ///
    /// Returns false when the record lies beyond the replay window.
    fn advance(&mut self, partition: i32, offset: i64) -> bool {
        let Some(&end) = self.remaining.get(&partition) else {
            return false;
        };
        if offset >= end {
            self.remaining.remove(&partition);
            return false;
        }
        if offset + 1 >= end {
            self.remaining.remove(&partition);
        }
        true
    }
}

#[async_trait]
impl RecordStream for KafkaRecordStream {
    async fn next(&mut self) -> Result<Option<RawRecord>> {
        loop {
            if !self.follow && self.remaining.is_empty() {
                return Ok(None);
            }
            let Some(consumer) = self.consumer.as_ref() else {
                return Ok(None);
            };

            let record = match consumer.recv().await {
                Ok(msg) => RawRecord {
                    topic: msg.topic().to_string(),
                    partition: msg.partition(),
                    offset: msg.offset(),
                    timestamp: msg.timestamp().to_millis(),
                    key: msg.key().map(<[u8]>::to_vec),
                    payload: msg.payload().map(<[u8]>::to_vec),
                },
                Err(KafkaError::PartitionEOF(partition)) => {
                    debug!("Reached end of partition {partition} of topic {}", self.topic);
                    self.remaining.remove(&partition);
                    continue;
                }
                Err(e) => return Err(Error::from_kafka(e, &self.topic)),
            };

            if !self.follow && !self.advance(record.partition, record.offset) {
                continue;
            }
            return Ok(Some(record));
        }
    }

    async fn close(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            if let Err(e) = consumer.unassign() {
                warn!("Failed to unassign consumer of topic {}: {e}", self.topic);
            }
            debug!("Closed consumer of topic {}", self.topic);
        }
    }
}
