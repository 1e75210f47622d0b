//! The Handler contract — what the Worker Runtime calls into
//! for each task kind. Handlers are opaque, pluggable, and own whatever
//! vision/text/LLM processing this scheduler deliberately does not
//! interpret.

use crate::model::FailureClassification;
use async_trait::async_trait;
use tokio::sync::watch;

/// A cooperative cancellation signal, observed by handlers that want to
/// abandon work early when the process is shutting down or their lease has
/// gone stale. Handlers that ignore it are
/// permitted but will not terminate before completion.
#[derive(Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn new(receiver: watch::Receiver<bool>) -> Self {
        Self(receiver)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation has been requested. Handlers that support
    /// cooperative cancellation can `tokio::select!` on this alongside their
    /// own work.
    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        let _ = self.0.changed().await;
    }
}

/// The counterpart source half, held by the Worker Runtime.
#[derive(Clone)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self(tx), CancelSignal::new(rx))
    }

    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// A handler failure, carrying the classification the Lease Engine needs to
/// decide between retry and terminal failure.
#[derive(Debug, Clone)]
pub struct HandlerError {
    pub message: String,
    pub classification: FailureClassification,
}

impl HandlerError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            classification: FailureClassification::Transient,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            classification: FailureClassification::Permanent,
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerError {}

/// Invoked by the Worker Runtime once per claimed task. Implementations must be idempotent with
/// respect to externally-visible side effects, or detect and recover from
/// duplicate executions, because at-least-once is the delivery contract: a
/// lease reclaim can hand the same task to a second worker while a first,
/// zombified execution is still running.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task kind this handler executes; must match an entry in the
    /// worker's advertised capabilities for `claim_next` to ever hand it
    /// work of this kind.
    fn kind(&self) -> &str;

    async fn execute(
        &self,
        payload: serde_json::Value,
        cancel: CancelSignal,
    ) -> std::result::Result<serde_json::Value, HandlerError>;
}
