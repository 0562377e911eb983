//! Recognition handshake payload and result extraction

use serde::{Deserialize, Serialize};

use crate::config::AsrConfig;
use crate::protocol::{DecodedFrame, FramePayload};
use crate::voice::SAMPLE_RATE;

/// Handshake sent as the first frame of every recognition session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub user: HandshakeUser,
    pub audio: AudioFormat,
    pub request: RecognitionParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeUser {
    pub uid: String,
}

/// Format of the audio frames that follow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub format: String,
    pub sample_rate: u32,
    pub bits: u16,
    pub channel: u16,
    pub codec: String,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            format: "pcm".to_string(),
            sample_rate: SAMPLE_RATE,
            bits: 16,
            channel: 1,
            codec: "raw".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionParams {
    pub model_name: String,
    pub enable_punc: bool,
}

impl HandshakeRequest {
    /// Handshake for the configured user and model
    #[must_use]
    pub fn new(config: &AsrConfig) -> Self {
        Self {
            user: HandshakeUser {
                uid: config.uid.clone(),
            },
            audio: AudioFormat::default(),
            request: RecognitionParams {
                model_name: config.model_name.clone(),
                enable_punc: config.enable_punc,
            },
        }
    }
}

/// Recognized text carried by a server response, if any
///
/// Only full server responses with a non-blank `result.text` count.
#[must_use]
pub fn transcript_of(frame: &DecodedFrame) -> Option<String> {
    let FramePayload::Response(body) = &frame.payload else {
        return None;
    };

    body.get("result")
        .and_then(|result| result.get("text"))
        .and_then(serde_json::Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(ToString::to_string)
}
