//! The record stream controller.
//!
//! A controller backs one topic view. It owns at most one consumption session
//! at a time: a producer task that pulls raw records from a [`RecordStream`],
//! decodes them and appends them to the shared [`RowStore`]. Every write is
//! fenced by the session generation, so a superseded producer can never touch
//! the rows of its successor. The producer always closes its stream before it
//! publishes [`SessionStatus::Stopped`].

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use insulator_kafka::{
    ConsumedRecord, DeserializationFormat, KafkaClient, RawRecord, RecordDecoder, RecordStream,
    TopicMetadata,
};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::confirm::{ConfirmAction, DeleteOutcome};
use crate::error::{Error, Result};
use crate::events::{Counters, StreamEvent, Subscription};
use crate::session::{ConsumeRequest, SessionHandle, SessionOutcome, SessionStatus};
use crate::store::{RecordFilter, RowStore, SortColumn, SortOrder};

/// Default number of retained rows
pub const DEFAULT_MAX_ROWS: usize = 10_000;

/// Default number of events buffered per subscriber before it lags
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Rows kept before the oldest are evicted
    pub max_rows: usize,
    pub event_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

struct Rows {
    store: RowStore,
    /// Generation of the session allowed to append
    generation: u64,
}

/// State shared between the controller and its producer task.
struct Shared {
    rows: Mutex<Rows>,
    status: watch::Sender<SessionStatus>,
    counters: watch::Sender<Counters>,
    metadata: watch::Sender<Option<TopicMetadata>>,
    events: broadcast::Sender<StreamEvent>,
}

impl Shared {
    fn emit(&self, event: StreamEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_status(&self, status: SessionStatus) {
        if self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        }) {
            debug!("Session status changed to {status:?}");
            self.emit(StreamEvent::StatusChanged(status));
        }
    }

    fn transition(&self, from: SessionStatus, to: SessionStatus) {
        if self.status.send_if_modified(|current| {
            if *current == from {
                *current = to;
                true
            } else {
                false
            }
        }) {
            debug!("Session status changed to {to:?}");
            self.emit(StreamEvent::StatusChanged(to));
        }
    }

    /// Append a row unless the session was superseded or cancelled.
    async fn append(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        row: ConsumedRecord,
    ) -> bool {
        let mut rows = self.rows.lock().await;
        if rows.generation != generation || cancel.is_cancelled() {
            return false;
        }

        let row = Arc::new(row);
        let decode_failed = row.decode_failed;
        let outcome = rows.store.push(Arc::clone(&row));
        self.counters.send_modify(|c| {
            c.consumed += 1;
            if decode_failed {
                c.decode_errors += 1;
            }
            c.evicted += outcome.evicted as u64;
        });

        if outcome.evicted > 0 {
            self.emit(StreamEvent::RowsEvicted(outcome.evicted));
        }
        self.emit(StreamEvent::RowAppended {
            seq: outcome.seq,
            row,
            visible: outcome.visible,
        });
        true
    }

    /// Cancel a session and publish `Stopping`.
    ///
    /// Both happen under the rows lock: no row is appended after the token is
    /// observed there, and `finish` (which takes the same lock) can only
    /// publish `Stopped` afterwards.
    async fn request_stop(&self, cancel: &CancellationToken) {
        let _rows = self.rows.lock().await;
        cancel.cancel();
        self.transition(SessionStatus::Running, SessionStatus::Stopping);
    }

    /// Publish the end of a session, if no newer session took over.
    async fn finish(&self, generation: u64) {
        let rows = self.rows.lock().await;
        if rows.generation == generation {
            self.set_status(SessionStatus::Stopped);
        }
    }
}

struct ActiveSession {
    generation: u64,
    topic: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Controller behind one topic view.
pub struct RecordStreamController {
    client: Arc<dyn KafkaClient>,
    decoder: Arc<dyn RecordDecoder>,
    shared: Arc<Shared>,
    active: Mutex<Option<ActiveSession>>,
}

impl RecordStreamController {
    pub fn new(
        client: Arc<dyn KafkaClient>,
        decoder: Arc<dyn RecordDecoder>,
        settings: StreamSettings,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::Idle);
        let (counters, _) = watch::channel(Counters::default());
        let (metadata, _) = watch::channel(None);
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));

        Self {
            client,
            decoder,
            shared: Arc::new(Shared {
                rows: Mutex::new(Rows {
                    store: RowStore::new(settings.max_rows),
                    generation: 0,
                }),
                status,
                counters,
                metadata,
                events,
            }),
            active: Mutex::new(None),
        }
    }

    /// Fetch metadata of `topic` and publish it to metadata watchers.
    pub async fn load_metadata(&self, topic: &str) -> Result<TopicMetadata> {
        let metadata = self.client.fetch_topic_metadata(topic).await?;
        info!(
            "Topic {topic}: {} partition(s), ~{} message(s), internal: {}, compacted: {}",
            metadata.partition_count,
            metadata.message_count,
            metadata.is_internal,
            metadata.is_compacted
        );
        self.shared.metadata.send_replace(Some(metadata.clone()));
        Ok(metadata)
    }

    /// Start a new session, stopping the current one first.
    ///
    /// The previous producer is cancelled and awaited before the new stream is
    /// opened, so its consumer is released and none of its rows reach the new
    /// session. The row table and counters start empty.
    pub async fn start_consumption(&self, request: ConsumeRequest) -> Result<SessionHandle> {
        if !self.decoder.supports(request.format) {
            return Err(insulator_kafka::Error::SchemaRegistryNotConfigured.into());
        }

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!(
                "Stopping session {} before starting a new one",
                previous.generation
            );
            self.stop_and_join(previous).await;
        }

        let stream = self
            .client
            .subscribe(&request.topic, request.from, request.follow)
            .await?;

        let generation = {
            let mut rows = self.shared.rows.lock().await;
            rows.generation += 1;
            rows.store.clear();
            self.shared.counters.send_replace(Counters::default());
            self.shared.emit(StreamEvent::Cleared);
            self.shared.set_status(SessionStatus::Running);
            rows.generation
        };

        info!(
            "Consuming topic {} from {} as {} (session {generation}, follow: {})",
            request.topic, request.from, request.format, request.follow
        );

        let (outcome_tx, outcome_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(
            Arc::clone(&self.shared),
            Arc::clone(&self.decoder),
            stream,
            request.format,
            generation,
            cancel.clone(),
            outcome_tx,
        ));

        *active = Some(ActiveSession {
            generation,
            topic: request.topic,
            cancel,
            task,
        });

        Ok(SessionHandle::new(generation, outcome_rx))
    }

    /// Request the current session to stop. Returns without waiting for the
    /// producer; status moves to `Stopping` and then `Stopped`.
    pub async fn stop_consumption(&self) {
        let active = self.active.lock().await;
        let Some(session) = active.as_ref() else {
            return;
        };
        if session.cancel.is_cancelled() {
            return;
        }
        info!("Stopping session {}", session.generation);
        self.shared.request_stop(&session.cancel).await;
    }

    /// Stop the current session, wait for it, then drop every row and reset
    /// the counters.
    pub async fn clear(&self) {
        let mut active = self.active.lock().await;
        if let Some(session) = active.take() {
            self.stop_and_join(session).await;
        }

        let mut rows = self.shared.rows.lock().await;
        rows.store.clear();
        self.shared.counters.send_replace(Counters::default());
        self.shared.emit(StreamEvent::Cleared);
        debug!("Record table cleared");
    }

    /// Stop the current session and wait until its consumer is released.
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        if let Some(session) = active.take() {
            self.stop_and_join(session).await;
        }
    }

    /// Delete `topic` after asking `confirm`. A declined confirmation never
    /// reaches the broker.
    pub async fn delete_topic(
        &self,
        topic: &str,
        confirm: &dyn ConfirmAction,
    ) -> Result<DeleteOutcome> {
        // Held so no session can start on the topic while it is deleted
        let active = self.active.lock().await;
        if let Some(session) = active.as_ref() {
            if session.topic == topic && self.shared.status.borrow().is_running() {
                return Err(Error::InvalidState(format!(
                    "topic '{topic}' is being consumed; stop the session before deleting it"
                )));
            }
        }

        let question = format!("Delete topic '{topic}'? This cannot be undone.");
        if !confirm.confirm(&question).await {
            info!("Deletion of topic {topic} declined");
            return Ok(DeleteOutcome::Declined);
        }

        self.client.delete_topic(topic).await?;
        info!("Deleted topic {topic}");
        Ok(DeleteOutcome::Deleted)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.shared.events.subscribe())
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    pub fn counters(&self) -> watch::Receiver<Counters> {
        self.shared.counters.subscribe()
    }

    /// Metadata from the last successful [`Self::load_metadata`].
    pub fn metadata(&self) -> watch::Receiver<Option<TopicMetadata>> {
        self.shared.metadata.subscribe()
    }

    pub fn consumed_count(&self) -> u64 {
        self.shared.counters.borrow().consumed
    }

    /// Snapshot of the rows passing the filter, in display order.
    pub async fn visible_rows(&self) -> Vec<Arc<ConsumedRecord>> {
        self.shared.rows.lock().await.store.visible()
    }

    /// Visible rows that arrived after `seq`, in arrival order. Lets a
    /// subscriber that lagged resume where it left off.
    pub async fn visible_rows_after(&self, seq: Option<u64>) -> Vec<(u64, Arc<ConsumedRecord>)> {
        self.shared.rows.lock().await.store.visible_after(seq)
    }

    /// Number of retained rows, ignoring the filter.
    pub async fn row_count(&self) -> usize {
        self.shared.rows.lock().await.store.len()
    }

    pub async fn set_filter(&self, text: &str) {
        self.shared
            .rows
            .lock()
            .await
            .store
            .set_filter(RecordFilter::new(text));
        self.shared.emit(StreamEvent::ViewChanged);
    }

    pub async fn set_sort(&self, column: SortColumn, order: SortOrder) {
        self.shared.rows.lock().await.store.set_sort(column, order);
        self.shared.emit(StreamEvent::ViewChanged);
    }

    async fn stop_and_join(&self, session: ActiveSession) {
        self.shared.request_stop(&session.cancel).await;
        if let Err(e) = session.task.await {
            error!("Producer of session {} panicked: {e}", session.generation);
            // Its stream was dropped with the task; publish the stop ourselves
            self.shared.finish(session.generation).await;
        }
    }
}

impl Drop for RecordStreamController {
    fn drop(&mut self) {
        // The producer closes its stream once it sees the cancellation
        if let Ok(active) = self.active.try_lock() {
            if let Some(session) = active.as_ref() {
                session.cancel.cancel();
            }
        }
    }
}

async fn run_session(
    shared: Arc<Shared>,
    decoder: Arc<dyn RecordDecoder>,
    mut stream: Box<dyn RecordStream>,
    format: DeserializationFormat,
    generation: u64,
    cancel: CancellationToken,
    outcome_tx: watch::Sender<Option<SessionOutcome>>,
) {
    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break SessionOutcome::Cancelled,
            next = stream.next() => next,
        };

        match next {
            Ok(Some(raw)) => {
                let row = materialize(decoder.as_ref(), &raw, format).await;
                if !shared.append(generation, &cancel, row).await {
                    break SessionOutcome::Cancelled;
                }
            }
            Ok(None) => break SessionOutcome::EndOfStream,
            Err(e) => {
                error!("Session {generation} failed: {e}");
                break SessionOutcome::Failed(e);
            }
        }
    };

    stream.close().await;
    shared.finish(generation).await;
    info!("Session {generation} ended: {outcome:?}");
    outcome_tx.send_replace(Some(outcome));
}

/// Turn a raw record into a table row. Decode failures become placeholder rows.
async fn materialize(
    decoder: &dyn RecordDecoder,
    raw: &RawRecord,
    format: DeserializationFormat,
) -> ConsumedRecord {
    let timestamp: DateTime<Utc> = raw
        .timestamp
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);
    let key = raw.key.as_deref().map(|k| decoder.decode_key(k, format));

    let (value, decode_failed) = match raw.payload.as_deref() {
        None => ("null".to_string(), false),
        Some(bytes) => match decoder.decode(bytes, format).await {
            Ok(value) => (value, false),
            Err(e) => {
                warn!(
                    "Could not decode record {}/{}@{}: {e}",
                    raw.topic, raw.partition, raw.offset
                );
                let reason = match e {
                    insulator_kafka::Error::Decode(reason) => reason,
                    other => other.to_string(),
                };
                (format!("<decode error: {reason}>"), true)
            }
        },
    };

    debug!(
        "Received record {}/{}@{}",
        raw.topic, raw.partition, raw.offset
    );

    ConsumedRecord {
        timestamp,
        key,
        value,
        partition: raw.partition,
        offset: raw.offset,
        decode_failed,
    }
}
