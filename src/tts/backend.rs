//! Synthesis backends and selection between them

use std::sync::Arc;

use async_trait::async_trait;

use super::request::SynthesisConfig;
use crate::config::TtsEngine;
use crate::voice::AudioSink;
use crate::{Error, Result};

/// Speaks one queue item to completion
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Resolves once the text was spoken or failed
    ///
    /// # Errors
    ///
    /// Returns error if neither synthesis nor fallback succeeded
    async fn speak(&self, text: &str, overrides: Option<&SynthesisConfig>) -> Result<()>;
}

/// Turns text into a playable audio resource
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text`
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str, overrides: Option<&SynthesisConfig>) -> Result<Vec<u8>>;
}

/// Host-side speech used when the remote service is unavailable
#[async_trait]
pub trait LocalSpeech: Send + Sync {
    /// Speak `text` locally
    ///
    /// # Errors
    ///
    /// Returns error if local speech fails
    async fn speak(&self, text: &str) -> Result<()>;
}

/// Local speech that only logs the text
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlySpeech;

#[async_trait]
impl LocalSpeech for LogOnlySpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        tracing::info!(text, "local speech");
        Ok(())
    }
}

/// Routes queue items to the remote synthesizer or the local fallback
pub struct SpeechRouter {
    engine: TtsEngine,
    remote: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    local: Arc<dyn LocalSpeech>,
}

impl SpeechRouter {
    /// Create a router
    #[must_use]
    pub fn new(
        engine: TtsEngine,
        remote: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
        local: Arc<dyn LocalSpeech>,
    ) -> Self {
        Self {
            engine,
            remote,
            sink,
            local,
        }
    }
}

#[async_trait]
impl SpeechBackend for SpeechRouter {
    async fn speak(&self, text: &str, overrides: Option<&SynthesisConfig>) -> Result<()> {
        if self.engine == TtsEngine::Local {
            return self.local.speak(text).await;
        }

        match self.remote.synthesize(text, overrides).await {
            Ok(audio) => self.sink.play(audio).await,
            Err(e @ (Error::CredentialsMissing(_) | Error::Connection(_))) => {
                tracing::warn!(error = %e, "remote synthesis unavailable, using local speech");
                self.local.speak(text).await
            }
            Err(e) => Err(e),
        }
    }
}
