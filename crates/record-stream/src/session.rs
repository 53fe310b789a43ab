//! Session state shared with the presentation layer.

use insulator_kafka::{ConsumeFrom, DeserializationFormat};
use tokio::sync::watch;

/// Lifecycle of the controller's consumption session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    /// Cancellation requested, producer still releasing its consumer
    Stopping,
    Stopped,
}

impl SessionStatus {
    /// Label of the consume/stop button.
    pub fn action_label(&self) -> &'static str {
        match self {
            Self::Idle | Self::Stopped => "Consume",
            Self::Running => "Stop",
            Self::Stopping => "Stopping...",
        }
    }

    pub fn is_action_enabled(&self) -> bool {
        !matches!(self, Self::Stopping)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Why a session's producer task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Bounded replay reached the watermarks captured at subscribe time
    EndOfStream,
    Cancelled,
    /// The record stream failed; rows received so far are kept
    Failed(insulator_kafka::Error),
}

/// What to consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeRequest {
    pub topic: String,
    pub from: ConsumeFrom,
    pub format: DeserializationFormat,
    /// Keep tailing after the existing records (default), or stop at the end
    pub follow: bool,
}

impl ConsumeRequest {
    pub fn new(topic: impl Into<String>, from: ConsumeFrom, format: DeserializationFormat) -> Self {
        Self {
            topic: topic.into(),
            from,
            format,
            follow: true,
        }
    }

    /// Stop once the records present at subscribe time were read.
    pub fn bounded(mut self) -> Self {
        self.follow = false;
        self
    }
}

/// Handle to one started session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    generation: u64,
    outcome: watch::Receiver<Option<SessionOutcome>>,
}

impl SessionHandle {
    pub(crate) fn new(generation: u64, outcome: watch::Receiver<Option<SessionOutcome>>) -> Self {
        Self {
            generation,
            outcome,
        }
    }

    /// Session number; newer sessions have larger generations.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Outcome, if the producer has already finished and released its consumer.
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait until the producer has finished and released its consumer.
    pub async fn finished(&mut self) -> SessionOutcome {
        match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(SessionOutcome::Cancelled),
            // Producer dropped without reporting (aborted runtime)
            Err(_) => SessionOutcome::Cancelled,
        }
    }
}
