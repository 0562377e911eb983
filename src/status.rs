//! Status events for observers

use serde::Serialize;
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber
pub const STATUS_CAPACITY: usize = 32;

/// A status change: whether the engine is active, plus a human-readable note
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub active: bool,
    pub message: String,
}

/// Broadcasts [`StatusEvent`]s to any number of subscribers
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: broadcast::Sender<StatusEvent>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new(STATUS_CAPACITY)
    }
}

impl StatusReporter {
    /// Create a reporter with the given per-subscriber buffer
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; dropped silently when nobody listens
    pub fn report(&self, active: bool, message: impl Into<String>) {
        let event = StatusEvent {
            active,
            message: message.into(),
        };
        tracing::debug!(active = event.active, message = %event.message, "status");
        let _ = self.tx.send(event);
    }
}
