//! Events and counters published to the presentation layer.

use std::sync::Arc;

use insulator_kafka::ConsumedRecord;
use tokio::sync::broadcast;

use crate::session::SessionStatus;

/// Change notifications pushed to subscribers of a controller.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    RowAppended {
        /// Arrival sequence number, increasing across sessions
        seq: u64,
        row: Arc<ConsumedRecord>,
        /// Passes the current filter
        visible: bool,
    },
    /// Oldest rows dropped by the row cap
    RowsEvicted(usize),
    Cleared,
    /// Filter or sort changed; re-read the visible rows
    ViewChanged,
    StatusChanged(SessionStatus),
    /// The subscriber fell behind and missed this many events; catch up with
    /// `RecordStreamController::visible_rows_after`
    Lagged(u64),
}

/// Aggregate counters of the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Rows accepted, including decode placeholders and rows evicted since
    pub consumed: u64,
    pub decode_errors: u64,
    pub evicted: u64,
}

/// A live subscription to a controller's events.
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) detaches.
pub struct Subscription {
    receiver: broadcast::Receiver<StreamEvent>,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<StreamEvent>) -> Self {
        Self { receiver }
    }

    /// Next event, `None` once the controller is gone.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => Some(StreamEvent::Lagged(missed)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => Some(StreamEvent::Lagged(missed)),
            Err(_) => None,
        }
    }

    pub fn unsubscribe(self) {}
}
