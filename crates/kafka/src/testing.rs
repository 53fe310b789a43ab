//! In-memory Kafka cluster for tests
//!
//! Implements [`KafkaClient`] without a broker: topics are vectors of
//! partitions, offsets are vector indices, and live streams wake up when
//! records are produced. Open streams and delete calls are counted so tests can
//! assert on resource release and on how often the broker was asked to delete.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kafka_types::{ConsumeFrom, RawRecord, TopicMetadata};
use tokio::sync::{Mutex, Notify};

use crate::client::{KafkaClient, RecordStream};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct InMemoryTopic {
    partitions: Vec<Vec<RawRecord>>,
    compacted: bool,
}

#[derive(Debug)]
struct State {
    topics: HashMap<String, InMemoryTopic>,
    reachable: bool,
    deny_deletes: bool,
    delete_calls: usize,
}

#[derive(Clone)]
pub struct InMemoryCluster {
    state: Arc<Mutex<State>>,
    produced: Arc<Notify>,
    open_streams: Arc<AtomicUsize>,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                topics: HashMap::new(),
                reachable: true,
                deny_deletes: false,
                delete_calls: 0,
            })),
            produced: Arc::new(Notify::new()),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn create_topic(&self, topic: &str, partitions: usize) {
        let mut state = self.state.lock().await;
        state.topics.insert(
            topic.to_string(),
            InMemoryTopic {
                partitions: vec![Vec::new(); partitions.max(1)],
                compacted: false,
            },
        );
    }

    pub async fn set_compacted(&self, topic: &str, compacted: bool) {
        if let Some(t) = self.state.lock().await.topics.get_mut(topic) {
            t.compacted = compacted;
        }
    }

    /// Simulate losing (or regaining) every broker.
    pub async fn set_reachable(&self, reachable: bool) {
        self.state.lock().await.reachable = reachable;
    }

    /// Make delete requests fail with an authorization error.
    pub async fn deny_deletes(&self) {
        self.state.lock().await.deny_deletes = true;
    }

    /// Append a record stamped with the current time. Returns its offset.
    pub async fn produce(
        &self,
        topic: &str,
        partition: i32,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<i64> {
        self.produce_at(topic, partition, key, Some(payload), Utc::now())
            .await
    }

    /// Append a record with an explicit timestamp; `None` payload is a tombstone.
    pub async fn produce_at(
        &self,
        topic: &str,
        partition: i32,
        key: Option<&str>,
        payload: Option<&[u8]>,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        let offset = {
            let mut state = self.state.lock().await;
            let records = state
                .topics
                .get_mut(topic)
                .and_then(|t| t.partitions.get_mut(partition as usize))
                .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?;
            let offset = records.len() as i64;
            records.push(RawRecord {
                topic: topic.to_string(),
                partition,
                offset,
                timestamp: Some(timestamp.timestamp_millis()),
                key: key.map(|k| k.as_bytes().to_vec()),
                payload: payload.map(<[u8]>::to_vec),
            });
            offset
        };
        self.produced.notify_waiters();
        Ok(offset)
    }

    pub async fn delete_calls(&self) -> usize {
        self.state.lock().await.delete_calls
    }

    pub async fn topic_exists(&self, topic: &str) -> bool {
        self.state.lock().await.topics.contains_key(topic)
    }

    /// Streams handed out and not yet closed or dropped.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

fn unreachable() -> Error {
    Error::BrokerUnreachable("in-memory cluster is offline".to_string())
}

#[async_trait]
impl KafkaClient for InMemoryCluster {
    async fn fetch_topic_metadata(&self, topic: &str) -> Result<TopicMetadata> {
        let state = self.state.lock().await;
        if !state.reachable {
            return Err(unreachable());
        }
        let t = state
            .topics
            .get(topic)
            .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?;
        Ok(TopicMetadata {
            name: topic.to_string(),
            is_internal: TopicMetadata::is_internal_name(topic),
            partition_count: t.partitions.len(),
            is_compacted: t.compacted,
            message_count: t.partitions.iter().map(|p| p.len() as u64).sum(),
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        from: ConsumeFrom,
        follow: bool,
    ) -> Result<Box<dyn RecordStream>> {
        let state = self.state.lock().await;
        if !state.reachable {
            return Err(unreachable());
        }
        let t = state
            .topics
            .get(topic)
            .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?;

        let since = from.start_timestamp(Utc::now()).map(|ts| ts.timestamp_millis());
        let mut positions = Vec::with_capacity(t.partitions.len());
        let mut ends = Vec::with_capacity(t.partitions.len());
        for records in &t.partitions {
            let len = records.len();
            let start = match (from, since) {
                (_, Some(since)) => records
                    .iter()
                    .position(|r| r.timestamp.unwrap_or(0) >= since)
                    .unwrap_or(len),
                (ConsumeFrom::Beginning, None) => 0,
                (ConsumeFrom::LastRecords(n), None) => {
                    len.saturating_sub(usize::try_from(n).unwrap_or(usize::MAX))
                }
                _ => len,
            };
            positions.push(start);
            ends.push(len);
        }

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryStream {
            cluster: self.clone(),
            topic: topic.to_string(),
            positions,
            ends: if follow { None } else { Some(ends) },
            next_partition: 0,
            open: true,
        }))
    }

    async fn delete_topic(&self, topic: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.reachable {
            return Err(unreachable());
        }
        state.delete_calls += 1;
        if state.deny_deletes {
            return Err(Error::PermissionDenied(format!(
                "Failed to delete topic '{topic}': Broker: Topic authorization failed"
            )));
        }
        if state.topics.remove(topic).is_none() {
            return Err(Error::TopicNotFound(topic.to_string()));
        }
        drop(state);
        self.produced.notify_waiters();
        Ok(())
    }
}

struct InMemoryStream {
    cluster: InMemoryCluster,
    topic: String,
    positions: Vec<usize>,
    /// Replay window per partition, `None` when following
    ends: Option<Vec<usize>>,
    next_partition: usize,
    open: bool,
}

impl InMemoryStream {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.cluster.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl RecordStream for InMemoryStream {
    async fn next(&mut self) -> Result<Option<RawRecord>> {
        loop {
            if !self.open {
                return Ok(None);
            }
            let produced = Arc::clone(&self.cluster.produced);
            let notified = produced.notified();
            {
                let state = self.cluster.state.lock().await;
                if !state.reachable {
                    return Err(unreachable());
                }
                let t = state
                    .topics
                    .get(&self.topic)
                    .ok_or_else(|| Error::TopicNotFound(self.topic.clone()))?;

                // Round-robin over partitions so arrival interleaves like a real consumer
                let count = self.positions.len();
                for step in 0..count {
                    let p = (self.next_partition + step) % count;
                    let limit = match &self.ends {
                        Some(ends) => ends[p],
                        None => t.partitions[p].len(),
                    };
                    if self.positions[p] < limit {
                        let record = t.partitions[p][self.positions[p]].clone();
                        self.positions[p] += 1;
                        self.next_partition = (p + 1) % count;
                        return Ok(Some(record));
                    }
                }
                if self.ends.is_some() {
                    return Ok(None);
                }
            }
            notified.await;
        }
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for InMemoryStream {
    fn drop(&mut self) {
        self.release();
    }
}
