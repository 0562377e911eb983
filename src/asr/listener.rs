//! Microphone-to-recognizer control loop
//!
//! Glues an [`AudioSource`], the [`VoiceActivityDetector`] and an
//! [`UplinkSession`] together. All state sits behind one async mutex, so a
//! hotkey calling [`Listener::stop`] never interleaves with a frame being
//! forwarded. Captured frames wait in an inbox the run loop and `stop` share;
//! the inbox lock is always taken before the state lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify, mpsc};

use super::session::{UplinkEvent, UplinkMessage, UplinkSession};
use crate::status::StatusReporter;
use crate::vad::{VadConfig, VadEvent, VadMode, VoiceActivityDetector};
use crate::voice::AudioSource;
use crate::{Error, Result};

/// Capacity of the capture frame channel
pub const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Pause before VAD may reopen a session after a failed start
const START_RETRY_DELAY: Duration = Duration::from_secs(2);

type SharedSource = Arc<std::sync::Mutex<Box<dyn AudioSource>>>;

struct ListenerState {
    vad: VoiceActivityDetector,
    session: UplinkSession,
    source: SharedSource,
    frames: mpsc::Sender<Vec<i16>>,
    last_start_failure: Option<Instant>,
}

/// Frames captured but not yet run through VAD
struct FrameInbox {
    rx: Mutex<mpsc::Receiver<Vec<i16>>>,
    // Asks the run loop to let go of `rx`
    release: Notify,
}

/// Drives recognition from captured audio and start/stop signals
#[derive(Clone)]
pub struct Listener {
    state: Arc<Mutex<ListenerState>>,
    inbox: Arc<FrameInbox>,
    mode: VadMode,
    status: StatusReporter,
}

impl Listener {
    /// Create a listener; its audio source feeds an internal frame channel
    #[must_use]
    pub fn new(
        vad: VadConfig,
        session: UplinkSession,
        source: Box<dyn AudioSource>,
        status: StatusReporter,
    ) -> Self {
        let (frames, frames_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let mode = vad.mode;
        Self {
            state: Arc::new(Mutex::new(ListenerState {
                vad: VoiceActivityDetector::new(vad),
                session,
                source: Arc::new(std::sync::Mutex::new(source)),
                frames,
                last_start_failure: None,
            })),
            inbox: Arc::new(FrameInbox {
                rx: Mutex::new(frames_rx),
                release: Notify::new(),
            }),
            mode,
            status,
        }
    }

    /// Open the microphone if the mode monitors continuously
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the microphone cannot be opened
    pub async fn init(&self) -> Result<()> {
        if !self.mode.retains_microphone() {
            tracing::info!(mode = %self.mode, "listener ready, waiting for trigger");
            return Ok(());
        }

        let state = self.state.lock().await;
        start_source(&state).await?;
        tracing::info!(mode = %self.mode, "microphone monitoring");
        self.status.report(false, format!("monitoring ({} mode)", self.mode));
        Ok(())
    }

    /// Begin listening; a no-op if already listening
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be opened or the microphone fails
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.vad.is_listening() {
            return Ok(());
        }

        if let Err(e) = state.session.start().await {
            self.status.report(false, format!("recognition unavailable: {e}"));
            return Err(e);
        }

        if !self.mode.retains_microphone() {
            if let Err(e) = start_source(&state).await {
                state.session.close().await;
                self.status.report(false, format!("microphone unavailable: {e}"));
                return Err(e);
            }
        }

        state.vad.set_listening(true);
        self.status.report(true, "listening");
        Ok(())
    }

    /// Stop listening; a no-op if not listening
    ///
    /// Frames already captured are forwarded before the terminal frame.
    ///
    /// # Errors
    ///
    /// Returns error if the terminal frame cannot be sent
    pub async fn stop(&self) -> Result<()> {
        self.inbox.release.notify_one();
        let mut frames = self.inbox.rx.lock().await;
        let mut state = self.state.lock().await;
        if !state.vad.is_listening() {
            return Ok(());
        }

        if !self.mode.retains_microphone() {
            stop_source(&state.source).await;
        }

        // Bounded so a retained microphone cannot keep the drain going
        let mut drained = 0;
        while drained < FRAME_CHANNEL_CAPACITY {
            let Ok(frame) = frames.try_recv() else { break };
            self.process_frame(&mut state, &frame, Instant::now()).await;
            drained += 1;
        }
        if drained > 0 {
            tracing::debug!(frames = drained, "forwarded buffered audio before stopping");
        }

        state.vad.set_listening(false);
        self.status.report(false, "stopped listening");

        state.session.finish().await
    }

    /// Start if idle, stop if listening
    ///
    /// # Errors
    ///
    /// Returns error from [`Listener::start`] or [`Listener::stop`]
    pub async fn toggle(&self) -> Result<()> {
        if self.is_listening().await {
            self.stop().await
        } else {
            self.start().await
        }
    }

    /// Whether audio is currently forwarded to the recognizer
    pub async fn is_listening(&self) -> bool {
        self.state.lock().await.vad.is_listening()
    }

    /// Operating mode
    #[must_use]
    pub const fn mode(&self) -> VadMode {
        self.mode
    }

    /// Run one captured frame through VAD and act on the outcome
    pub async fn handle_frame(&self, frame: &[i16], now: Instant) {
        let mut state = self.state.lock().await;
        self.process_frame(&mut state, frame, now).await;
    }

    async fn process_frame(&self, state: &mut ListenerState, frame: &[i16], now: Instant) {
        if !state.vad.is_listening()
            && state
                .last_start_failure
                .is_some_and(|at| now.saturating_duration_since(at) < START_RETRY_DELAY)
        {
            return;
        }

        for event in state.vad.process(frame, now) {
            match event {
                VadEvent::StartSession => {
                    if let Err(e) = state.session.start().await {
                        tracing::warn!(error = %e, "could not open recognition session");
                        state.vad.reset();
                        state.last_start_failure = Some(now);
                        self.status.report(false, format!("recognition unavailable: {e}"));
                        return;
                    }
                    state.last_start_failure = None;
                    self.status.report(true, "voice detected");
                }
                VadEvent::Audio(bytes) => match state.session.send_audio(&bytes, false).await {
                    Ok(()) => {}
                    Err(Error::SessionAlreadyClosed) => {
                        tracing::debug!("audio after terminal frame dropped");
                    }
                    Err(e) => tracing::warn!(error = %e, "audio frame not sent"),
                },
                VadEvent::StopSession => {
                    if let Err(e) = state.session.finish().await {
                        tracing::warn!(error = %e, "terminal frame not sent");
                    }
                    self.status.report(false, "silence, stopped listening");
                }
            }
        }
    }

    /// React to a session event; transcripts go to `transcripts`
    pub async fn handle_event(&self, message: UplinkMessage, transcripts: &mpsc::UnboundedSender<String>) {
        match message.event {
            UplinkEvent::Transcript(text) => {
                if transcripts.send(text).is_err() {
                    tracing::warn!("transcript receiver gone");
                }
            }
            UplinkEvent::SideChannel(text) => {
                tracing::warn!(message = %text, "recognition service message");
            }
            UplinkEvent::ServerError { code, message: text } => {
                let mut state = self.state.lock().await;
                if state.session.request_id() == Some(message.request_id.as_str()) {
                    state.session.close().await;
                    self.reset_listening(&mut state).await;
                }
                self.status.report(false, format!("recognition error {code}: {text}"));
            }
            UplinkEvent::Closed => {
                let mut state = self.state.lock().await;
                if state.session.request_id() == Some(message.request_id.as_str()) {
                    state.session.close().await;
                    if state.vad.is_listening() {
                        self.reset_listening(&mut state).await;
                        self.status.report(false, "recognition connection closed");
                    }
                }
            }
        }
    }

    async fn reset_listening(&self, state: &mut ListenerState) {
        if !self.mode.retains_microphone() {
            stop_source(&state.source).await;
        }
        state.vad.reset();
    }

    /// Process captured frames and session events until both streams end
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<UplinkMessage>,
        transcripts: mpsc::UnboundedSender<String>,
    ) {
        let mut frames_open = true;
        let mut events_open = true;

        while frames_open || events_open {
            // Held while a received frame is handled; released between turns
            let mut frames = self.inbox.rx.lock().await;
            tokio::select! {
                frame = frames.recv(), if frames_open => match frame {
                    Some(frame) => self.handle_frame(&frame, Instant::now()).await,
                    None => frames_open = false,
                },
                message = events.recv(), if events_open => match message {
                    Some(message) => self.handle_event(message, &transcripts).await,
                    None => events_open = false,
                },
                () = self.inbox.release.notified() => {}
            }
        }
    }

    /// Release the microphone and the connection
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        stop_source(&state.source).await;
        state.vad.reset();
        state.session.close().await;
        tracing::debug!("listener shut down");
    }
}

/// Start capture on the blocking pool; opening a device may block
async fn start_source(state: &ListenerState) -> Result<()> {
    let frames = state.frames.clone();
    with_source(&state.source, move |source| source.start(frames)).await
}

/// Stop capture on the blocking pool; joining the capture thread may block
async fn stop_source(source: &SharedSource) {
    let result = with_source(source, |source| {
        source.stop();
        Ok(())
    })
    .await;
    if let Err(e) = result {
        tracing::warn!(error = %e, "audio source did not stop cleanly");
    }
}

async fn with_source<F>(source: &SharedSource, op: F) -> Result<()>
where
    F: FnOnce(&mut dyn AudioSource) -> Result<()> + Send + 'static,
{
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || {
        let mut source = source
            .lock()
            .map_err(|_| Error::Audio("audio source lock poisoned".to_string()))?;
        op(&mut **source)
    })
    .await
    .map_err(|e| Error::Audio(format!("audio source task failed: {e}")))?
}
