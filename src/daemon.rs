//! Daemon - wires capture, recognition, dispatch and speech together
//!
//! One [`Listener`] owns the microphone and the recognition connection, a
//! [`PlaybackQueue`] owns speech output, and recognized text is handed to
//! the [`AgentRegistry`]. The daemon itself only forwards trigger signals and
//! waits for shutdown.

use std::io::IsTerminal;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::asr::{Listener, UplinkSession};
use crate::config::{Config, TtsConfig};
use crate::dispatch::{AgentMessage, AgentRegistry};
use crate::status::StatusReporter;
use crate::transport::{Connector, WsConnector};
use crate::trigger::{TriggerSignal, TriggerSource, select_trigger_source};
use crate::tts::{DownlinkSession, LogOnlySpeech, PlaybackQueue, SpeechRouter};
use crate::voice::{AudioPlayback, AudioSink, DiscardSink, MicrophoneCapture};
use crate::Result;

/// Name the console agent registers under
pub const CONSOLE_AGENT: &str = "console";

/// The speechwire daemon
pub struct Daemon {
    config: Config,
    echo: bool,
    hotkeys: Option<mpsc::Receiver<TriggerSignal>>,
    connector: Arc<dyn Connector>,
    registry: Arc<AgentRegistry>,
}

impl Daemon {
    /// Create a daemon using websocket connections
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            echo: false,
            hotkeys: None,
            connector: Arc::new(WsConnector::default()),
            registry: Arc::new(AgentRegistry::new()),
        }
    }

    /// Speak recognized text back through the playback queue
    #[must_use]
    pub const fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Take trigger signals from an OS hotkey listener instead of the terminal
    #[must_use]
    pub fn with_hotkeys(mut self, hotkeys: mpsc::Receiver<TriggerSignal>) -> Self {
        self.hotkeys = Some(hotkeys);
        self
    }

    /// Use a different connection factory
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Registry recognized text is dispatched to
    #[must_use]
    pub fn registry(&self) -> Arc<AgentRegistry> {
        Arc::clone(&self.registry)
    }

    /// Run until interrupted or told to quit
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot be opened
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            echo,
            hotkeys,
            connector,
            registry,
        } = self;
        let Config { vad, asr, tts, agent } = config;

        let status = StatusReporter::default();
        let status_task = tokio::spawn(log_status(status.clone()));

        let queue = speech_queue(tts, Arc::clone(&connector), Some(status.clone()));

        let auto_start = asr.auto_start;
        let (session, events_rx) = UplinkSession::new(connector, Arc::new(asr));
        let microphone = MicrophoneCapture::new()?;
        let listener = Listener::new(vad, session, Box::new(microphone), status.clone());
        init_listener(&listener, auto_start).await?;

        let (transcripts_tx, mut transcripts_rx) = mpsc::unbounded_channel::<String>();
        let listen_task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.run(events_rx, transcripts_tx).await })
        };

        let (console_tx, console_rx) = mpsc::unbounded_channel();
        registry.register(CONSOLE_AGENT, console_tx);
        let console_task = tokio::spawn(run_console_agent(console_rx, echo.then(|| queue.clone())));

        let dispatch_task = {
            let registry = Arc::clone(&registry);
            let sender = agent.player_name;
            tokio::spawn(async move {
                while let Some(text) = transcripts_rx.recv().await {
                    tracing::info!(text = %text, "recognized");
                    registry.dispatch(&sender, &text);
                }
            })
        };

        let mut trigger = select_trigger_source(hotkeys, std::io::stdin().is_terminal());
        tracing::info!(mode = %listener.mode(), "speechwire ready");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                signal = next_signal(&mut trigger) => {
                    let Some(signal) = signal else {
                        tracing::info!("trigger source closed");
                        trigger = None;
                        continue;
                    };
                    if signal == TriggerSignal::Quit {
                        tracing::info!("quit requested");
                        break;
                    }
                    if let Err(e) = apply_signal(&listener, signal).await {
                        tracing::error!(error = %e, ?signal, "trigger failed");
                    }
                }
            }
        }

        listener.shutdown().await;
        listen_task.abort();
        dispatch_task.abort();
        console_task.abort();
        status_task.abort();
        registry.unregister(CONSOLE_AGENT);

        tracing::info!("speechwire stopped");
        Ok(())
    }
}

/// Prepare the microphone for the listener's mode; optionally start listening
///
/// A failed auto-start is only logged, the listener then waits for a trigger.
///
/// # Errors
///
/// Returns error if the microphone cannot be opened
pub async fn init_listener(listener: &Listener, auto_start: bool) -> Result<()> {
    listener.init().await?;
    if auto_start {
        tracing::info!("starting recognition at launch");
        if let Err(e) = listener.start().await {
            tracing::warn!(error = %e, "recognition auto-start failed");
        }
    }
    Ok(())
}

/// Build the playback queue for `tts`
///
/// Falls back to discarding audio when no output device is present.
#[must_use]
pub fn speech_queue(
    tts: TtsConfig,
    connector: Arc<dyn Connector>,
    status: Option<StatusReporter>,
) -> PlaybackQueue {
    let engine = tts.engine;
    let enabled = tts.enabled;
    let sink: Arc<dyn AudioSink> = match AudioPlayback::new() {
        Ok(playback) => Arc::new(playback),
        Err(e) => {
            tracing::warn!(error = %e, "audio output unavailable, synthesized audio will be discarded");
            Arc::new(DiscardSink)
        }
    };

    let router = SpeechRouter::new(
        engine,
        Arc::new(DownlinkSession::new(connector, Arc::new(tts))),
        sink,
        Arc::new(LogOnlySpeech),
    );

    let queue = match status {
        Some(status) => PlaybackQueue::with_status(Arc::new(router), status),
        None => PlaybackQueue::new(Arc::new(router)),
    };
    queue.set_enabled(enabled);
    queue
}

/// Forward a start/stop signal to the listener
///
/// # Errors
///
/// Returns error from the listener
pub async fn apply_signal(listener: &Listener, signal: TriggerSignal) -> Result<()> {
    match signal {
        TriggerSignal::Toggle => listener.toggle().await,
        TriggerSignal::Start => listener.start().await,
        TriggerSignal::Stop => listener.stop().await,
        TriggerSignal::Quit => Ok(()),
    }
}

async fn next_signal(trigger: &mut Option<Box<dyn TriggerSource>>) -> Option<TriggerSignal> {
    match trigger {
        Some(source) => source.next().await,
        None => std::future::pending().await,
    }
}

/// Print messages addressed to the console; optionally speak them back
async fn run_console_agent(
    mut messages: mpsc::UnboundedReceiver<AgentMessage>,
    echo: Option<PlaybackQueue>,
) {
    while let Some(message) = messages.recv().await {
        println!("[{}] {}", message.sender, message.text);
        if let Some(queue) = &echo {
            queue.enqueue(message.text, None);
        }
    }
}

async fn log_status(status: StatusReporter) {
    let mut rx = status.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => tracing::info!(active = event.active, "{}", event.message),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "status events skipped");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}
