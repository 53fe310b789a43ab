//! Controller behaviour against the in-memory cluster

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use insulator_kafka::testing::InMemoryCluster;
use insulator_kafka::{ConsumeFrom, DeserializationFormat, FormatDecoder};
use insulator_record_stream::{
    ConfirmAction, ConsumeRequest, DeleteOutcome, Error, RecordStreamController, SessionOutcome,
    SessionStatus, SortColumn, SortOrder, StreamEvent, StreamSettings,
};

const WAIT: Duration = Duration::from_secs(5);

fn controller(cluster: &InMemoryCluster) -> RecordStreamController {
    controller_with(cluster, StreamSettings::default())
}

fn controller_with(cluster: &InMemoryCluster, settings: StreamSettings) -> RecordStreamController {
    RecordStreamController::new(
        Arc::new(cluster.clone()),
        Arc::new(FormatDecoder::new(None)),
        settings,
    )
}

fn string_request(topic: &str, from: ConsumeFrom) -> ConsumeRequest {
    ConsumeRequest::new(topic, from, DeserializationFormat::String)
}

async fn produce_all(cluster: &InMemoryCluster, topic: &str, records: &[(&str, &str)]) {
    for (key, value) in records {
        cluster
            .produce(topic, 0, Some(key), value.as_bytes())
            .await
            .unwrap();
    }
}

async fn wait_consumed(controller: &RecordStreamController, count: u64) {
    let mut counters = controller.counters();
    tokio::time::timeout(WAIT, counters.wait_for(|c| c.consumed >= count))
        .await
        .expect("timed out waiting for records")
        .expect("controller dropped");
}

async fn values(controller: &RecordStreamController) -> Vec<String> {
    controller
        .visible_rows()
        .await
        .iter()
        .map(|r| r.value.clone())
        .collect()
}

#[tokio::test]
async fn test_bounded_replay_of_orders_consumes_every_record() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 1).await;
    produce_all(
        &cluster,
        "orders",
        &[("o1", "a"), ("o2", "b"), ("o3", "c"), ("o4", "d"), ("o5", "e")],
    )
    .await;

    let controller = controller(&cluster);
    let mut session = controller
        .start_consumption(string_request("orders", ConsumeFrom::Beginning).bounded())
        .await?;

    let outcome = tokio::time::timeout(WAIT, session.finished()).await?;
    assert_eq!(outcome, SessionOutcome::EndOfStream);
    assert_eq!(controller.consumed_count(), 5);
    assert_eq!(*controller.status().borrow(), SessionStatus::Stopped);
    assert_eq!(values(&controller).await, ["a", "b", "c", "d", "e"]);
    assert_eq!(cluster.open_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn test_stop_reaches_stopped_and_freezes_the_count() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 2).await;

    let controller = controller(&cluster);
    let mut session = controller
        .start_consumption(string_request("orders", ConsumeFrom::Now))
        .await?;
    assert_eq!(*controller.status().borrow(), SessionStatus::Running);

    produce_all(&cluster, "orders", &[("k1", "one"), ("k2", "two")]).await;
    wait_consumed(&controller, 2).await;

    controller.stop_consumption().await;
    let outcome = tokio::time::timeout(WAIT, session.finished()).await?;
    assert_eq!(outcome, SessionOutcome::Cancelled);
    assert_eq!(*controller.status().borrow(), SessionStatus::Stopped);
    assert_eq!(cluster.open_streams(), 0);

    produce_all(&cluster, "orders", &[("k3", "three")]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(controller.consumed_count(), 2);
    assert_eq!(controller.row_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn test_immediate_stop_from_every_start_position() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 2).await;
    produce_all(&cluster, "orders", &[("k1", "a"), ("k2", "b")]).await;

    let positions = [
        ConsumeFrom::Beginning,
        ConsumeFrom::Now,
        ConsumeFrom::LastHour,
        ConsumeFrom::LastDay,
        ConsumeFrom::LastWeek,
        ConsumeFrom::LastRecords(1),
        ConsumeFrom::Since(chrono::Utc::now() - chrono::Duration::minutes(5)),
    ];
    for from in positions {
        let controller = controller(&cluster);
        let mut session = controller
            .start_consumption(string_request("orders", from))
            .await?;
        controller.stop_consumption().await;
        tokio::time::timeout(WAIT, session.finished()).await?;

        assert_eq!(*controller.status().borrow(), SessionStatus::Stopped, "{from}");
        assert_eq!(cluster.open_streams(), 0, "{from}");

        let frozen = controller.consumed_count();
        produce_all(&cluster, "orders", &[("k3", "c")]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(controller.consumed_count(), frozen, "{from}");
    }
    Ok(())
}

#[tokio::test]
async fn test_stop_is_idempotent() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 1).await;
    let controller = controller(&cluster);

    // Nothing running yet
    controller.stop_consumption().await;
    assert_eq!(*controller.status().borrow(), SessionStatus::Idle);

    let mut session = controller
        .start_consumption(string_request("orders", ConsumeFrom::Now))
        .await?;
    controller.stop_consumption().await;
    controller.stop_consumption().await;
    assert_eq!(
        tokio::time::timeout(WAIT, session.finished()).await?,
        SessionOutcome::Cancelled
    );
    controller.stop_consumption().await;
    assert_eq!(*controller.status().borrow(), SessionStatus::Stopped);
    Ok(())
}

#[tokio::test]
async fn test_restart_never_mixes_sessions() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("first", 1).await;
    cluster.create_topic("second", 1).await;
    produce_all(&cluster, "first", &[("first-1", "x"), ("first-2", "y")]).await;
    produce_all(&cluster, "second", &[("second-1", "z")]).await;

    let controller = controller(&cluster);
    let first = controller
        .start_consumption(string_request("first", ConsumeFrom::Beginning))
        .await?;
    wait_consumed(&controller, 2).await;

    let second = controller
        .start_consumption(string_request("second", ConsumeFrom::Beginning))
        .await?;
    // The first producer was awaited before the second stream opened
    assert_eq!(first.outcome(), Some(SessionOutcome::Cancelled));
    assert!(second.generation() > first.generation());
    assert_eq!(cluster.open_streams(), 1);

    produce_all(&cluster, "first", &[("first-3", "late")]).await;
    produce_all(&cluster, "second", &[("second-2", "w")]).await;
    wait_consumed(&controller, 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let rows = controller.visible_rows().await;
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .all(|r| r.key.as_deref().is_some_and(|k| k.starts_with("second"))));
    assert_eq!(controller.consumed_count(), 2);

    controller.shutdown().await;
    assert_eq!(cluster.open_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn test_clear_stops_and_empties_the_table() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 1).await;
    produce_all(&cluster, "orders", &[("k1", "a"), ("k2", "b"), ("k3", "c")]).await;

    let controller = controller(&cluster);
    let session = controller
        .start_consumption(string_request("orders", ConsumeFrom::Beginning))
        .await?;
    wait_consumed(&controller, 3).await;

    controller.clear().await;
    assert_eq!(session.outcome(), Some(SessionOutcome::Cancelled));
    assert_eq!(*controller.status().borrow(), SessionStatus::Stopped);
    assert_eq!(controller.consumed_count(), 0);
    assert_eq!(controller.row_count().await, 0);
    assert!(controller.visible_rows().await.is_empty());
    assert_eq!(cluster.open_streams(), 0);

    produce_all(&cluster, "orders", &[("k4", "d")]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(controller.consumed_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_filter_matches_key_or_value_and_keeps_hidden_rows() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("events", 1).await;
    produce_all(
        &cluster,
        "events",
        &[
            ("order-1", "paid"),
            ("user-1", "created"),
            ("shipment", "Order shipped"),
        ],
    )
    .await;

    let controller = controller(&cluster);
    let mut session = controller
        .start_consumption(string_request("events", ConsumeFrom::Beginning).bounded())
        .await?;
    tokio::time::timeout(WAIT, session.finished()).await?;

    controller.set_filter("ORDER").await;
    assert_eq!(values(&controller).await, ["paid", "Order shipped"]);
    assert_eq!(controller.row_count().await, 3);

    controller.set_filter("").await;
    assert_eq!(controller.visible_rows().await.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_sort_stays_consistent_as_rows_arrive() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("letters", 1).await;

    let controller = controller(&cluster);
    controller
        .set_sort(SortColumn::Value, SortOrder::Ascending)
        .await;
    let _session = controller
        .start_consumption(string_request("letters", ConsumeFrom::Now))
        .await?;

    produce_all(&cluster, "letters", &[("k", "c"), ("k", "a")]).await;
    wait_consumed(&controller, 2).await;
    assert_eq!(values(&controller).await, ["a", "c"]);

    produce_all(&cluster, "letters", &[("k", "b")]).await;
    wait_consumed(&controller, 3).await;
    assert_eq!(values(&controller).await, ["a", "b", "c"]);

    controller
        .set_sort(SortColumn::Value, SortOrder::Descending)
        .await;
    assert_eq!(values(&controller).await, ["c", "b", "a"]);

    controller.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_undecodable_values_become_placeholder_rows() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("mixed", 1).await;
    cluster.produce("mixed", 0, Some("bad"), &[0xff, 0xfe]).await?;
    cluster
        .produce_at("mixed", 0, Some("gone"), None, chrono::Utc::now())
        .await?;
    cluster.produce("mixed", 0, Some("good"), b"hello").await?;

    let controller = controller(&cluster);
    let mut session = controller
        .start_consumption(string_request("mixed", ConsumeFrom::Beginning).bounded())
        .await?;
    assert_eq!(
        tokio::time::timeout(WAIT, session.finished()).await?,
        SessionOutcome::EndOfStream
    );

    let rows = controller.visible_rows().await;
    assert_eq!(rows.len(), 3);
    assert!(rows[0].decode_failed);
    assert!(rows[0]
        .value
        .starts_with("<decode error: value is not valid UTF-8"));
    assert_eq!(rows[1].value, "null");
    assert!(!rows[1].decode_failed);
    assert_eq!(rows[2].value, "hello");

    let counters = *controller.counters().borrow();
    assert_eq!(counters.consumed, 3);
    assert_eq!(counters.decode_errors, 1);
    Ok(())
}

#[tokio::test]
async fn test_row_cap_evicts_the_oldest_rows() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 1).await;
    produce_all(
        &cluster,
        "orders",
        &[("1", "a"), ("2", "b"), ("3", "c"), ("4", "d"), ("5", "e")],
    )
    .await;

    let controller = controller_with(
        &cluster,
        StreamSettings {
            max_rows: 3,
            ..StreamSettings::default()
        },
    );
    let mut session = controller
        .start_consumption(string_request("orders", ConsumeFrom::Beginning).bounded())
        .await?;
    tokio::time::timeout(WAIT, session.finished()).await?;

    assert_eq!(values(&controller).await, ["c", "d", "e"]);
    let counters = *controller.counters().borrow();
    assert_eq!(counters.consumed, 5);
    assert_eq!(counters.evicted, 2);
    Ok(())
}

#[tokio::test]
async fn test_stream_failure_keeps_rows_and_stops() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 1).await;
    produce_all(&cluster, "orders", &[("k1", "a")]).await;

    let controller = controller(&cluster);
    let mut session = controller
        .start_consumption(string_request("orders", ConsumeFrom::Beginning))
        .await?;
    wait_consumed(&controller, 1).await;

    cluster.set_reachable(false).await;
    // Wakes the waiting stream, which then sees the outage
    produce_all(&cluster, "orders", &[("k2", "b")]).await;

    let outcome = tokio::time::timeout(WAIT, session.finished()).await?;
    assert!(matches!(
        outcome,
        SessionOutcome::Failed(insulator_kafka::Error::BrokerUnreachable(_))
    ));
    assert_eq!(*controller.status().borrow(), SessionStatus::Stopped);
    assert_eq!(controller.row_count().await, 1);
    assert_eq!(cluster.open_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn test_load_metadata_publishes_topic_details() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 3).await;
    cluster.set_compacted("orders", true).await;
    produce_all(&cluster, "orders", &[("k1", "a"), ("k2", "b")]).await;

    let controller = controller(&cluster);
    let metadata = controller.load_metadata("orders").await?;
    assert_eq!(metadata.partition_count, 3);
    assert_eq!(metadata.message_count, 2);
    assert!(metadata.is_compacted);
    assert!(!metadata.is_internal);
    assert_eq!(controller.metadata().borrow().as_ref(), Some(&metadata));
    Ok(())
}

#[tokio::test]
async fn test_load_metadata_errors() {
    let cluster = InMemoryCluster::new();
    let controller = controller(&cluster);

    let err = controller.load_metadata("missing").await.unwrap_err();
    assert_eq!(
        err,
        Error::Kafka(insulator_kafka::Error::TopicNotFound("missing".to_string()))
    );

    cluster.set_reachable(false).await;
    let err = controller.load_metadata("missing").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Kafka(insulator_kafka::Error::BrokerUnreachable(_))
    ));
    assert!(controller.metadata().borrow().is_none());
}

#[tokio::test]
async fn test_avro_without_registry_is_rejected() {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 1).await;
    let controller = controller(&cluster);

    let err = controller
        .start_consumption(ConsumeRequest::new(
            "orders",
            ConsumeFrom::Beginning,
            DeserializationFormat::Avro,
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Error::Kafka(insulator_kafka::Error::SchemaRegistryNotConfigured)
    );
    assert_eq!(*controller.status().borrow(), SessionStatus::Idle);
    assert_eq!(cluster.open_streams(), 0);
}

#[tokio::test]
async fn test_subscribe_to_missing_topic_fails() {
    let cluster = InMemoryCluster::new();
    let controller = controller(&cluster);

    let err = controller
        .start_consumption(string_request("missing", ConsumeFrom::Beginning))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Error::Kafka(insulator_kafka::Error::TopicNotFound("missing".to_string()))
    );
    assert_eq!(*controller.status().borrow(), SessionStatus::Idle);
}

#[tokio::test]
async fn test_declined_delete_never_reaches_the_broker() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 1).await;
    let controller = controller(&cluster);

    let asked = AtomicUsize::new(0);
    let decline = |question: &str| {
        assert!(question.contains("orders"));
        asked.fetch_add(1, Ordering::SeqCst);
        false
    };

    let outcome = controller.delete_topic("orders", &decline).await?;
    assert_eq!(outcome, DeleteOutcome::Declined);
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(cluster.delete_calls().await, 0);
    assert!(cluster.topic_exists("orders").await);
    Ok(())
}

#[tokio::test]
async fn test_confirmed_delete_calls_the_broker_once() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 1).await;
    let controller = controller(&cluster);

    let outcome = controller.delete_topic("orders", &|_: &str| true).await?;
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert_eq!(cluster.delete_calls().await, 1);
    assert!(!cluster.topic_exists("orders").await);
    Ok(())
}

/// Answers only once someone else has said so.
struct AnswerLater {
    answered: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl ConfirmAction for AnswerLater {
    async fn confirm(&self, _question: &str) -> bool {
        self.answered.notified().await;
        true
    }
}

#[tokio::test]
async fn test_waiting_for_confirmation_leaves_the_runtime_free() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 1).await;
    let controller = controller(&cluster);

    let answered = Arc::new(tokio::sync::Notify::new());
    let confirm = AnswerLater {
        answered: Arc::clone(&answered),
    };
    // Single-threaded runtime: this only runs if confirm yields while it waits
    let answer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        answered.notify_one();
    });

    let outcome = tokio::time::timeout(WAIT, controller.delete_topic("orders", &confirm)).await??;
    assert_eq!(outcome, DeleteOutcome::Deleted);
    answer.await?;
    assert_eq!(cluster.delete_calls().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_delete_surfaces_broker_errors() {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 1).await;
    cluster.deny_deletes().await;
    let controller = controller(&cluster);

    let err = controller
        .delete_topic("orders", &|_: &str| true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Kafka(insulator_kafka::Error::PermissionDenied(_))
    ));
    assert_eq!(cluster.delete_calls().await, 1);

    let err = controller
        .delete_topic("missing", &|_: &str| true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Kafka(insulator_kafka::Error::PermissionDenied(_))
    ));
}

#[tokio::test]
async fn test_deleting_the_consumed_topic_is_rejected() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 1).await;
    let controller = controller(&cluster);
    let mut session = controller
        .start_consumption(string_request("orders", ConsumeFrom::Now))
        .await?;

    let err = controller
        .delete_topic("orders", &|_: &str| true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert_eq!(cluster.delete_calls().await, 0);

    controller.stop_consumption().await;
    tokio::time::timeout(WAIT, session.finished()).await?;
    let outcome = controller.delete_topic("orders", &|_: &str| true).await?;
    assert_eq!(outcome, DeleteOutcome::Deleted);
    Ok(())
}

#[tokio::test]
async fn test_subscription_sees_rows_and_status_changes() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 1).await;
    produce_all(&cluster, "orders", &[("k1", "a"), ("k2", "b")]).await;

    let controller = controller(&cluster);
    let mut events = controller.subscribe();
    controller
        .start_consumption(string_request("orders", ConsumeFrom::Beginning).bounded())
        .await?;

    let mut appended = Vec::new();
    let mut statuses = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await?
            .expect("controller alive");
        match event {
            StreamEvent::RowAppended { row, visible, .. } => {
                assert!(visible);
                appended.push(row.value.clone());
            }
            StreamEvent::StatusChanged(status) => {
                statuses.push(status);
                if status == SessionStatus::Stopped {
                    break;
                }
            }
            _ => {}
        }
    }

    assert_eq!(appended, ["a", "b"]);
    assert_eq!(statuses, [SessionStatus::Running, SessionStatus::Stopped]);
    events.unsubscribe();
    Ok(())
}

#[tokio::test]
async fn test_stop_publishes_stopping_then_stopped() -> anyhow::Result<()> {
    let cluster = InMemoryCluster::new();
    cluster.create_topic("orders", 2).await;
    let controller = controller(&cluster);

    for _ in 0..20 {
        let mut events = controller.subscribe();
        let mut session = controller
            .start_consumption(string_request("orders", ConsumeFrom::Now))
            .await?;
        produce_all(&cluster, "orders", &[("k1", "a")]).await;

        controller.stop_consumption().await;
        tokio::time::timeout(WAIT, session.finished()).await?;

        let mut statuses = Vec::new();
        while let Some(event) = events.try_recv() {
            if let StreamEvent::StatusChanged(status) = event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            [
                SessionStatus::Running,
                SessionStatus::Stopping,
                SessionStatus::Stopped
            ]
        );
    }
    Ok(())
}
