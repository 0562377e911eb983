//! One recognition conversation with the remote service

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::request::{HandshakeRequest, transcript_of};
use crate::config::AsrConfig;
use crate::protocol::{self, FramePayload};
use crate::transport::{ConnectionReader, ConnectionWriter, Connector, Endpoint};
use crate::{Error, Result};

/// Lifecycle of an uplink session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never started
    Idle,
    /// Opening the connection
    Connecting,
    /// Sending the handshake
    Negotiating,
    /// Accepting audio
    Streaming,
    /// Terminal frame sent, waiting for the server to finish
    Closing,
    /// Connection released
    Closed,
}

impl SessionState {
    /// Whether a connection is held or being opened
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Negotiating | Self::Streaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Negotiating => "negotiating",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Something the server said during a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UplinkEvent {
    /// Recognized text from one server message
    Transcript(String),
    /// Server-error frame
    ServerError { code: u32, message: String },
    /// Message outside the framed protocol
    SideChannel(String),
    /// The connection ended
    Closed,
}

/// An event tagged with the session it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkMessage {
    pub request_id: String,
    pub event: UplinkEvent,
}

/// Client side of the recognition protocol
///
/// Owns the connection and sequence counter of the current conversation.
/// Results are read by a dispatch task and delivered as [`UplinkMessage`]s.
pub struct UplinkSession {
    connector: Arc<dyn Connector>,
    config: Arc<AsrConfig>,
    state: SessionState,
    sequence: i32,
    request_id: Option<String>,
    terminal_sent: bool,
    writer: Option<ConnectionWriter>,
    dispatch: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<UplinkMessage>,
}

impl UplinkSession {
    /// Create an idle session and the receiver for its events
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        config: Arc<AsrConfig>,
    ) -> (Self, mpsc::UnboundedReceiver<UplinkMessage>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                connector,
                config,
                state: SessionState::Idle,
                sequence: 1,
                request_id: None,
                terminal_sent: false,
                writer: None,
                dispatch: None,
                events,
            },
            rx,
        )
    }

    /// Open a new conversation
    ///
    /// A no-op while a conversation is active. Any previous connection is
    /// dropped first.
    ///
    /// # Errors
    ///
    /// Returns `CredentialsMissing` if the keys are not configured, or
    /// `Connection` if the connection or handshake fails
    pub async fn start(&mut self) -> Result<()> {
        if self.state.is_active() {
            tracing::debug!(state = %self.state, "session already active");
            return Ok(());
        }

        let config = Arc::clone(&self.config);
        let (app_key, access_key) = config.credentials()?;

        self.teardown().await;

        self.sequence = 1;
        self.terminal_sent = false;
        let request_id = uuid::Uuid::new_v4().to_string();
        self.request_id = Some(request_id.clone());
        self.state = SessionState::Connecting;

        let endpoint = Endpoint::new(&config.url)
            .header("X-Api-Resource-Id", &config.resource_id)
            .header("X-Api-Access-Key", access_key)
            .header("X-Api-App-Key", app_key)
            .header("X-Api-Request-Id", &request_id);

        tracing::debug!(request_id = %request_id, url = %config.url, "opening recognition session");

        let connection = match self.connector.connect(&endpoint).await {
            Ok(connection) => connection,
            Err(e) => {
                self.state = SessionState::Closed;
                tracing::error!(error = %e, "recognition connect failed");
                return Err(e);
            }
        };
        let (writer, reader) = connection.split();

        self.state = SessionState::Negotiating;
        let handshake =
            protocol::encode_full_request(&HandshakeRequest::new(&config), Some(self.sequence))?;
        if let Err(e) = writer.send(handshake).await {
            self.state = SessionState::Closed;
            return Err(e);
        }
        self.sequence += 1;

        self.dispatch = Some(tokio::spawn(dispatch_loop(
            reader,
            self.events.clone(),
            request_id,
        )));
        self.writer = Some(writer);
        self.state = SessionState::Streaming;

        tracing::info!("recognition session started");
        Ok(())
    }

    /// Send one chunk of PCM audio
    ///
    /// The terminal chunk (`is_last`) carries the negated current sequence
    /// number and ends the conversation. Without an open connection the
    /// chunk is logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns `SessionAlreadyClosed` if the terminal frame was already sent
    pub async fn send_audio(&mut self, audio: &[u8], is_last: bool) -> Result<()> {
        if self.terminal_sent {
            return Err(Error::SessionAlreadyClosed);
        }

        let writer = match (&self.writer, self.state) {
            (Some(writer), SessionState::Streaming) if writer.is_open() => writer,
            _ => {
                tracing::warn!(state = %self.state, bytes = audio.len(), "no open connection, audio dropped");
                return Ok(());
            }
        };

        let frame = protocol::encode_audio_frame(audio, self.sequence, is_last)?;
        if let Err(e) = writer.send(frame).await {
            tracing::warn!(error = %e, "audio send failed");
            self.state = SessionState::Closed;
            return Ok(());
        }

        tracing::trace!(sequence = self.sequence, bytes = audio.len(), is_last, "audio frame sent");

        if is_last {
            self.terminal_sent = true;
            self.state = SessionState::Closing;
        } else {
            self.sequence += 1;
        }
        Ok(())
    }

    /// Send the empty terminal frame if the conversation is streaming
    ///
    /// The connection stays open so the final result can arrive.
    ///
    /// # Errors
    ///
    /// Returns error if the terminal frame cannot be encoded
    pub async fn finish(&mut self) -> Result<()> {
        if self.state != SessionState::Streaming {
            return Ok(());
        }
        self.send_audio(&[], true).await
    }

    /// Drop the connection and stop reading results
    pub async fn close(&mut self) {
        self.teardown().await;
        if self.state != SessionState::Idle {
            self.state = SessionState::Closed;
        }
    }

    async fn teardown(&mut self) {
        if let Some(task) = self.dispatch.take() {
            task.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.close().await;
            tracing::debug!("recognition connection closed");
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Sequence number the next audio frame will carry
    #[must_use]
    pub const fn sequence(&self) -> i32 {
        self.sequence
    }

    /// Request id of the current or last conversation
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

/// Read server messages until the connection ends
async fn dispatch_loop(
    mut reader: ConnectionReader,
    events: mpsc::UnboundedSender<UplinkMessage>,
    request_id: String,
) {
    let emit = |event: UplinkEvent| {
        let _ = events.send(UplinkMessage {
            request_id: request_id.clone(),
            event,
        });
    };

    while let Some(message) = reader.next().await {
        let bytes = match message {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "recognition connection failed");
                break;
            }
        };

        match protocol::decode(&bytes) {
            Ok(frame) => {
                if let FramePayload::SideChannel(message) = &frame.payload {
                    tracing::warn!(message = %message, "recognition side-channel message");
                    emit(UplinkEvent::SideChannel(message.clone()));
                } else if let Some(text) = transcript_of(&frame) {
                    tracing::debug!(sequence = ?frame.sequence, text = %text, "recognized");
                    emit(UplinkEvent::Transcript(text));
                }
            }
            Err(Error::Server { code, message }) => {
                tracing::error!(code, message = %message, "recognition server error");
                emit(UplinkEvent::ServerError { code, message });
            }
            Err(e) => {
                tracing::warn!(error = %e, bytes = bytes.len(), "dropping undecodable frame");
            }
        }
    }

    tracing::debug!(request_id = %request_id, "recognition connection ended");
    emit(UplinkEvent::Closed);
}
