//! Confirmation of destructive operations.

use async_trait::async_trait;

/// Asks the user before a destructive operation.
///
/// Implementations may wait on the user for as long as it takes; the
/// controller awaits the answer without blocking its runtime.
#[async_trait]
pub trait ConfirmAction: Send + Sync {
    /// `true` only on an explicit yes.
    async fn confirm(&self, question: &str) -> bool;
}

/// Closures answer immediately, handy for fixed answers and tests.
#[async_trait]
impl<F> ConfirmAction for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    async fn confirm(&self, question: &str) -> bool {
        self(question)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The user said no; the broker was not contacted
    Declined,
}
