//! Synthesis request payload

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_VOICE_ID;

use super::emotion::ParsedText;

/// Voice parameters applied to a synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Voice type id
    pub voice_id: String,
    /// Emotion used when the text carries no marker
    pub emotion: String,
    /// Speaking rate multiplier
    pub speed_ratio: f32,
    /// Loudness multiplier
    pub volume_ratio: f32,
    /// Pitch multiplier
    pub pitch_ratio: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice_id: DEFAULT_VOICE_ID.to_string(),
            emotion: "neutral".to_string(),
            speed_ratio: 1.0,
            volume_ratio: 1.0,
            pitch_ratio: 1.0,
        }
    }
}

impl VoiceSettings {
    /// Apply a per-request override on top of these defaults
    #[must_use]
    pub fn resolve(&self, overrides: Option<&SynthesisConfig>) -> Self {
        let Some(o) = overrides else {
            return self.clone();
        };

        Self {
            voice_id: o.voice_id.clone().unwrap_or_else(|| self.voice_id.clone()),
            emotion: o.emotion.clone().unwrap_or_else(|| self.emotion.clone()),
            speed_ratio: o.speed_ratio.unwrap_or(self.speed_ratio),
            volume_ratio: o.volume_ratio.unwrap_or(self.volume_ratio),
            pitch_ratio: o.pitch_ratio.unwrap_or(self.pitch_ratio),
        }
    }
}

/// Per-request voice override; unset fields fall back to the defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    pub voice_id: Option<String>,
    pub emotion: Option<String>,
    pub speed_ratio: Option<f32>,
    pub volume_ratio: Option<f32>,
    pub pitch_ratio: Option<f32>,
}

impl SynthesisConfig {
    /// Override only the voice
    #[must_use]
    pub fn voice(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: Some(voice_id.into()),
            ..Self::default()
        }
    }

    /// Override only the default emotion
    #[must_use]
    pub fn emotion(emotion: impl Into<String>) -> Self {
        Self {
            emotion: Some(emotion.into()),
            ..Self::default()
        }
    }
}

/// Full synthesis request as sent in the client frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub app: AppSection,
    pub user: UserSection,
    pub audio: AudioSection,
    pub request: RequestSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSection {
    pub appid: String,
    pub token: String,
    pub cluster: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSection {
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSection {
    pub voice_type: String,
    pub encoding: String,
    pub speed_ratio: f32,
    pub volume_ratio: f32,
    pub pitch_ratio: f32,
    pub emotion: String,
    pub enable_emotion: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSection {
    pub reqid: String,
    pub text: String,
    pub text_type: String,
    pub operation: String,
}

/// Service identity attached to a request
#[derive(Debug, Clone, Copy)]
pub struct RequestIdentity<'a> {
    pub app_id: &'a str,
    pub token: &'a str,
    pub cluster: &'a str,
    pub uid: &'a str,
}

impl SynthesisRequest {
    /// Build a request for already-parsed text
    #[must_use]
    pub fn new(
        identity: RequestIdentity<'_>,
        voice: &VoiceSettings,
        parsed: ParsedText,
        reqid: String,
    ) -> Self {
        Self {
            app: AppSection {
                appid: identity.app_id.to_string(),
                token: identity.token.to_string(),
                cluster: identity.cluster.to_string(),
            },
            user: UserSection {
                uid: identity.uid.to_string(),
            },
            audio: AudioSection {
                voice_type: voice.voice_id.clone(),
                encoding: "mp3".to_string(),
                speed_ratio: voice.speed_ratio,
                volume_ratio: voice.volume_ratio,
                pitch_ratio: voice.pitch_ratio,
                emotion: parsed.emotion,
                enable_emotion: true,
            },
            request: RequestSection {
                reqid,
                text: parsed.text,
                text_type: "plain".to_string(),
                operation: "submit".to_string(),
            },
        }
    }
}
