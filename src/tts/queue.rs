//! Single-flight playback queue
//!
//! Text is spoken strictly in enqueue order, one item at a time. The first
//! enqueue on an idle queue spawns a drive task that keeps calling
//! [`PlaybackQueue::process_next`] until the FIFO is empty. Every item
//! advances the queue whether it succeeded, failed, or panicked. A disabled
//! queue drops new text instead of speaking it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use super::backend::SpeechBackend;
use super::request::SynthesisConfig;
use crate::status::StatusReporter;

/// One pending utterance
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub text: String,
    pub config: Option<SynthesisConfig>,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<QueueEntry>,
    is_speaking: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    backend: Arc<dyn SpeechBackend>,
    // Held while an item is being spoken
    in_flight: tokio::sync::Mutex<()>,
    idle: Notify,
    status: Option<StatusReporter>,
    enabled: AtomicBool,
}

/// FIFO of text to speak; cheap to clone
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<QueueInner>,
}

impl PlaybackQueue {
    /// Create a queue speaking through `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn SpeechBackend>) -> Self {
        Self::build(backend, None)
    }

    /// Create a queue that also reports speaking status
    #[must_use]
    pub fn with_status(backend: Arc<dyn SpeechBackend>, status: StatusReporter) -> Self {
        Self::build(backend, Some(status))
    }

    fn build(backend: Arc<dyn SpeechBackend>, status: Option<StatusReporter>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                backend,
                in_flight: tokio::sync::Mutex::new(()),
                idle: Notify::new(),
                status,
                enabled: AtomicBool::new(true),
            }),
        }
    }

    /// Turn speech output on or off; items already queued still play
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
        tracing::debug!(enabled, "speech output toggled");
    }

    /// Whether enqueued text is spoken
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// Append text; starts processing if nothing is speaking
    ///
    /// Blank text, and any text while the queue is disabled, is ignored.
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, text: impl Into<String>, config: Option<SynthesisConfig>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        if !self.is_enabled() {
            tracing::debug!(chars = text.chars().count(), "speech disabled, text dropped");
            return;
        }

        let start = {
            let Ok(mut state) = self.inner.state.lock() else {
                tracing::error!("playback queue state poisoned");
                return;
            };
            state.pending.push_back(QueueEntry { text, config });
            tracing::debug!(pending = state.pending.len(), "speech enqueued");

            if state.is_speaking {
                false
            } else {
                state.is_speaking = true;
                true
            }
        };

        if start {
            let queue = self.clone();
            tokio::spawn(async move { while queue.process_next().await {} });
        }
    }

    /// Speak the next pending item
    ///
    /// Returns `false` once the queue is empty, after clearing the speaking
    /// flag. Concurrent callers are serialized so at most one item is ever
    /// in flight.
    pub async fn process_next(&self) -> bool {
        let _guard = self.inner.in_flight.lock().await;

        let entry = {
            let Ok(mut state) = self.inner.state.lock() else {
                tracing::error!("playback queue state poisoned");
                return false;
            };
            if let Some(entry) = state.pending.pop_front() {
                state.is_speaking = true;
                entry
            } else {
                state.is_speaking = false;
                drop(state);
                self.report(false, "speech queue idle");
                self.inner.idle.notify_waiters();
                return false;
            }
        };

        self.report(true, "speaking");

        // A panicking backend must not wedge the queue
        let backend = Arc::clone(&self.inner.backend);
        let QueueEntry { text, config } = entry;
        let outcome =
            tokio::spawn(async move { backend.speak(&text, config.as_ref()).await }).await;

        match outcome {
            Ok(Ok(())) => tracing::debug!("speech item finished"),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "speech item failed");
                self.report(false, format!("speech failed: {e}"));
            }
            Err(e) => tracing::error!(error = %e, "speech task panicked"),
        }

        true
    }

    /// Resolve once nothing is pending or speaking
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Whether an item is currently being synthesized or played
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.inner.state.lock().is_ok_and(|s| s.is_speaking)
    }

    /// Number of items waiting behind the current one
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().map_or(0, |s| s.pending.len())
    }

    fn is_idle(&self) -> bool {
        self.inner
            .state
            .lock()
            .is_ok_and(|s| !s.is_speaking && s.pending.is_empty())
    }

    fn report(&self, active: bool, message: impl Into<String>) {
        if let Some(status) = &self.inner.status {
            status.report(active, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::Result;

    #[derive(Default)]
    struct CountingBackend {
        spoken: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechBackend for CountingBackend {
        async fn speak(&self, text: &str, _: Option<&SynthesisConfig>) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_items_spoken_in_order() {
        let backend = Arc::new(CountingBackend::default());
        let queue = PlaybackQueue::new(Arc::clone(&backend) as Arc<dyn SpeechBackend>);

        queue.enqueue("one", None);
        queue.enqueue("two", None);
        queue.enqueue("three", None);
        queue.wait_idle().await;

        assert_eq!(*backend.spoken.lock().unwrap(), vec!["one", "two", "three"]);
        assert!(!queue.is_speaking());
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_blank_text_ignored() {
        let backend = Arc::new(CountingBackend::default());
        let queue = PlaybackQueue::new(Arc::clone(&backend) as Arc<dyn SpeechBackend>);

        queue.enqueue("   ", None);
        queue.wait_idle().await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_on_fresh_queue() {
        let queue = PlaybackQueue::new(Arc::new(CountingBackend::default()));
        queue.wait_idle().await;
    }

    #[tokio::test]
    async fn test_disabled_queue_drops_text() {
        let backend = Arc::new(CountingBackend::default());
        let queue = PlaybackQueue::new(Arc::clone(&backend) as Arc<dyn SpeechBackend>);

        queue.set_enabled(false);
        queue.enqueue("muted", None);
        assert!(!queue.is_speaking());
        assert_eq!(queue.pending_len(), 0);
        queue.wait_idle().await;

        queue.set_enabled(true);
        queue.enqueue("audible", None);
        queue.wait_idle().await;
        assert_eq!(*backend.spoken.lock().unwrap(), vec!["audible"]);
    }

    struct PanickingBackend;

    #[async_trait]
    impl SpeechBackend for PanickingBackend {
        async fn speak(&self, text: &str, _: Option<&SynthesisConfig>) -> Result<()> {
            assert_ne!(text, "boom", "backend exploded");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panicking_item_does_not_stall() {
        let queue = PlaybackQueue::new(Arc::new(PanickingBackend));
        queue.enqueue("boom", None);
        queue.enqueue("fine", None);
        queue.wait_idle().await;
        assert!(!queue.is_speaking());
    }
}
