//! One synthesis request over a fresh connection

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::backend::Synthesizer;
use super::emotion::EmotionMap;
use super::request::{RequestIdentity, SynthesisConfig, SynthesisRequest};
use crate::config::TtsConfig;
use crate::protocol::{self, FramePayload};
use crate::transport::{ConnectionReader, Connector, Endpoint};
use crate::{Error, Result};

/// Progress of the current or most recent synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    /// Nothing synthesized yet
    Idle,
    /// Opening the connection
    Connecting,
    /// Sending the request
    Requesting,
    /// Collecting audio chunks
    Receiving,
    /// Terminal chunk received
    Completed,
    /// Rejected, dropped or timed out
    Failed,
}

#[derive(Debug)]
struct Progress {
    state: SynthesisState,
    request_id: Option<String>,
}

/// Synthesizes text through the remote service
///
/// Every call opens its own connection, sends one request and collects the
/// streamed audio until the terminal frame.
pub struct DownlinkSession {
    connector: Arc<dyn Connector>,
    config: Arc<TtsConfig>,
    emotions: EmotionMap,
    progress: Mutex<Progress>,
}

impl DownlinkSession {
    /// Create a session factory
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: Arc<TtsConfig>) -> Self {
        let emotions = EmotionMap::with_aliases(&config.emotion_aliases);
        Self {
            connector,
            config,
            emotions,
            progress: Mutex::new(Progress {
                state: SynthesisState::Idle,
                request_id: None,
            }),
        }
    }

    /// State of the current or last synthesis
    #[must_use]
    pub fn state(&self) -> SynthesisState {
        self.progress
            .lock()
            .map_or(SynthesisState::Failed, |p| p.state)
    }

    /// Request id of the current or last synthesis
    #[must_use]
    pub fn request_id(&self) -> Option<String> {
        self.progress.lock().ok().and_then(|p| p.request_id.clone())
    }

    fn begin(&self, request_id: &str) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.request_id = Some(request_id.to_string());
            progress.state = SynthesisState::Connecting;
        }
        tracing::debug!(reqid = %request_id, "synthesis connecting");
    }

    fn transition(&self, state: SynthesisState) {
        if let Ok(mut progress) = self.progress.lock() {
            tracing::debug!(
                reqid = ?progress.request_id,
                from = ?progress.state,
                to = ?state,
                "synthesis state"
            );
            progress.state = state;
        }
    }

    /// Build the request for `text`, resolving its emotion marker
    ///
    /// # Errors
    ///
    /// Returns `CredentialsMissing` if the app id or token is not configured
    pub fn build_request(
        &self,
        text: &str,
        overrides: Option<&SynthesisConfig>,
    ) -> Result<SynthesisRequest> {
        let (app_id, token) = self.config.credentials()?;
        let voice = self.config.voice.resolve(overrides);
        let parsed = self.emotions.parse(text, &voice.emotion);

        Ok(SynthesisRequest::new(
            RequestIdentity {
                app_id,
                token,
                cluster: &self.config.cluster,
                uid: &self.config.uid,
            },
            &voice,
            parsed,
            uuid::Uuid::new_v4().to_string(),
        ))
    }

    /// Synthesize `text` and return the assembled MP3
    ///
    /// # Errors
    ///
    /// Returns `CredentialsMissing` before connecting, `Server` if the service
    /// rejects the request, or `Connection` if the connection fails, closes
    /// before the terminal frame, or exceeds the synthesis timeout
    pub async fn synthesize(
        &self,
        text: &str,
        overrides: Option<&SynthesisConfig>,
    ) -> Result<Vec<u8>> {
        let request = self.build_request(text, overrides)?;
        let frame = protocol::encode_full_request(&request, None)?;

        tracing::debug!(
            reqid = %request.request.reqid,
            voice = %request.audio.voice_type,
            emotion = %request.audio.emotion,
            chars = request.request.text.chars().count(),
            "synthesis request"
        );

        let endpoint = Endpoint::new(&self.config.url)
            .header("Authorization", format!("Bearer; {}", request.app.token));

        self.begin(&request.request.reqid);
        let result =
            tokio::time::timeout(self.config.synthesis_timeout, self.exchange(&endpoint, frame))
                .await
                .map_err(|_| Error::Connection("synthesis timed out".to_string()))
                .and_then(|outcome| outcome);

        self.transition(if result.is_ok() {
            SynthesisState::Completed
        } else {
            SynthesisState::Failed
        });
        result
    }

    async fn exchange(&self, endpoint: &Endpoint, request: Vec<u8>) -> Result<Vec<u8>> {
        let (writer, mut reader) = self.connector.connect(endpoint).await?.split();
        self.transition(SynthesisState::Requesting);
        writer.send(request).await?;
        self.transition(SynthesisState::Receiving);

        let result = collect_audio(&mut reader).await;
        writer.close().await;
        result
    }
}

/// Gather audio chunks in arrival order until the terminal frame
async fn collect_audio(reader: &mut ConnectionReader) -> Result<Vec<u8>> {
    let mut chunks: Vec<Vec<u8>> = Vec::new();

    while let Some(message) = reader.next().await {
        let frame = match protocol::decode(&message?) {
            Ok(frame) => frame,
            Err(e) if e.is_decode_error() => {
                tracing::warn!(error = %e, "dropping undecodable synthesis frame");
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "synthesis failed");
                return Err(e);
            }
        };

        let terminal = frame.is_terminal();
        match frame.payload {
            FramePayload::Audio(chunk) => {
                tracing::trace!(sequence = ?frame.sequence, bytes = chunk.len(), "audio chunk");
                chunks.push(chunk);
            }
            FramePayload::SideChannel(message) => {
                tracing::warn!(message = %message, "synthesis rejected");
                return Err(Error::Server { code: 0, message });
            }
            FramePayload::Frontend(_) | FramePayload::Ack => {}
            other => {
                tracing::debug!(payload = ?other, "ignoring synthesis frame");
            }
        }

        if terminal {
            let audio = chunks.concat();
            tracing::debug!(chunks = chunks.len(), bytes = audio.len(), "synthesis complete");
            return Ok(audio);
        }
    }

    Err(Error::Connection(
        "connection closed before terminal frame".to_string(),
    ))
}

#[async_trait]
impl Synthesizer for DownlinkSession {
    async fn synthesize(&self, text: &str, overrides: Option<&SynthesisConfig>) -> Result<Vec<u8>> {
        Self::synthesize(self, text, overrides).await
    }
}
