//! Configuration management for speechwire

pub mod file;

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::tts::VoiceSettings;
use crate::vad::{
    DEFAULT_AMPLITUDE_THRESHOLD, DEFAULT_BATCH_FRAMES, DEFAULT_SILENCE_TIMEOUT, VadConfig, VadMode,
};
use crate::{Error, Result};

use file::SpeechwireConfigFile;

/// Recognition endpoint (non-streaming big model)
pub const DEFAULT_ASR_URL: &str = "wss://openspeech.bytedance.com/api/v3/sauc/bigmodel_nostream";

/// Recognition billing resource
pub const DEFAULT_ASR_RESOURCE_ID: &str = "volc.bigasr.sauc.duration";

/// Synthesis endpoint (binary websocket)
pub const DEFAULT_TTS_URL: &str = "wss://openspeech.bytedance.com/api/v1/tts/ws_binary";

/// Synthesis cluster
pub const DEFAULT_TTS_CLUSTER: &str = "volcano_tts";

/// Default synthesis voice
pub const DEFAULT_VOICE_ID: &str = "zh_male_yangguangqingnian_emo_v2_mars_bigtts";

/// Upper bound for one synthesis item
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_UID: &str = "speechwire_user";

/// speechwire configuration
#[derive(Debug)]
pub struct Config {
    /// Voice activity detection
    pub vad: VadConfig,

    /// Speech recognition service
    pub asr: AsrConfig,

    /// Speech synthesis service
    pub tts: TtsConfig,

    /// Recognized-text routing
    pub agent: AgentConfig,
}

/// Speech recognition service configuration
#[derive(Debug)]
pub struct AsrConfig {
    /// Websocket endpoint
    pub url: String,
    /// `X-Api-Resource-Id` header value
    pub resource_id: String,
    /// User id sent in the handshake
    pub uid: String,
    /// Recognition model
    pub model_name: String,
    /// Ask the service to punctuate
    pub enable_punc: bool,
    /// Start listening as soon as the daemon is up
    pub auto_start: bool,
    /// `X-Api-App-Key` header value
    pub app_key: Option<SecretString>,
    /// `X-Api-Access-Key` header value
    pub access_key: Option<SecretString>,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ASR_URL.to_string(),
            resource_id: DEFAULT_ASR_RESOURCE_ID.to_string(),
            uid: DEFAULT_UID.to_string(),
            model_name: "bigmodel".to_string(),
            enable_punc: true,
            auto_start: false,
            app_key: None,
            access_key: None,
        }
    }
}

impl AsrConfig {
    /// App key and access key
    ///
    /// # Errors
    ///
    /// Returns `CredentialsMissing` if either is absent or empty
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let app_key = non_empty(self.app_key.as_ref())
            .ok_or_else(|| Error::CredentialsMissing("asr app key".to_string()))?;
        let access_key = non_empty(self.access_key.as_ref())
            .ok_or_else(|| Error::CredentialsMissing("asr access key".to_string()))?;
        Ok((app_key, access_key))
    }
}

/// Which synthesis backend speaks queued text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TtsEngine {
    /// Remote websocket service
    #[default]
    Remote,
    /// Local fallback only
    Local,
}

impl FromStr for TtsEngine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "remote" | "bytedance" | "volc" => Ok(Self::Remote),
            "local" | "system" => Ok(Self::Local),
            other => Err(Error::Config(format!("unknown tts engine: {other}"))),
        }
    }
}

/// Speech synthesis service configuration
#[derive(Debug)]
pub struct TtsConfig {
    /// Speak queued text at all
    pub enabled: bool,
    /// Websocket endpoint
    pub url: String,
    /// Service cluster
    pub cluster: String,
    /// User id sent with each request
    pub uid: String,
    /// Backend selection
    pub engine: TtsEngine,
    /// Default voice parameters
    pub voice: VoiceSettings,
    /// Extra emotion-marker aliases
    pub emotion_aliases: HashMap<String, String>,
    /// Upper bound for one synthesis item
    pub synthesis_timeout: Duration,
    /// Application id
    pub app_id: Option<SecretString>,
    /// Bearer token
    pub token: Option<SecretString>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: DEFAULT_TTS_URL.to_string(),
            cluster: DEFAULT_TTS_CLUSTER.to_string(),
            uid: DEFAULT_UID.to_string(),
            engine: TtsEngine::default(),
            voice: VoiceSettings::default(),
            emotion_aliases: HashMap::new(),
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT,
            app_id: None,
            token: None,
        }
    }
}

impl TtsConfig {
    /// App id and token
    ///
    /// # Errors
    ///
    /// Returns `CredentialsMissing` if either is absent or empty
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let app_id = non_empty(self.app_id.as_ref())
            .ok_or_else(|| Error::CredentialsMissing("tts app id".to_string()))?;
        let token = non_empty(self.token.as_ref())
            .ok_or_else(|| Error::CredentialsMissing("tts token".to_string()))?;
        Ok((app_id, token))
    }
}

/// Recognized-text routing configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Sender name attached to recognized text
    pub player_name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            player_name: "player".to_string(),
        }
    }
}

fn non_empty(secret: Option<&SecretString>) -> Option<&str> {
    secret
        .map(|s| s.expose_secret())
        .filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if the merged values are out of range
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Load configuration from an explicit file path (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if the merged values are out of range
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::from_sources(file::load_config_from(path), |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the merged values are out of range
    pub fn from_sources<F>(fc: SpeechwireConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vad_mode = env("SPEECHWIRE_VAD_MODE")
            .and_then(|s| parse_or_warn::<VadMode>("SPEECHWIRE_VAD_MODE", &s))
            .or(fc.vad.mode)
            .unwrap_or_default();

        let vad = VadConfig {
            mode: vad_mode,
            silence_timeout: fc
                .vad
                .silence_timeout_ms
                .map_or(DEFAULT_SILENCE_TIMEOUT, Duration::from_millis),
            amplitude_threshold: fc
                .vad
                .amplitude_threshold
                .unwrap_or(DEFAULT_AMPLITUDE_THRESHOLD),
            batch_frames: fc.vad.batch_frames.unwrap_or(DEFAULT_BATCH_FRAMES),
        };

        if vad.batch_frames == 0 {
            return Err(Error::Config("vad.batch_frames must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&vad.amplitude_threshold) {
            return Err(Error::Config(format!(
                "vad.amplitude_threshold must be within [0, 1], got {}",
                vad.amplitude_threshold
            )));
        }

        // Credentials (env > toml > None)
        let asr_defaults = AsrConfig::default();
        let asr = AsrConfig {
            url: fc.asr.url.unwrap_or(asr_defaults.url),
            resource_id: fc.asr.resource_id.unwrap_or(asr_defaults.resource_id),
            uid: fc.asr.uid.unwrap_or(asr_defaults.uid),
            model_name: fc.asr.model_name.unwrap_or(asr_defaults.model_name),
            enable_punc: fc.asr.enable_punc.unwrap_or(asr_defaults.enable_punc),
            auto_start: env("SPEECHWIRE_ASR_AUTO_START")
                .and_then(|s| parse_flag("SPEECHWIRE_ASR_AUTO_START", &s))
                .or(fc.asr.auto_start)
                .unwrap_or(asr_defaults.auto_start),
            app_key: env("SPEECHWIRE_ASR_APP_KEY")
                .or(fc.credentials.asr.app_key)
                .map(SecretString::from),
            access_key: env("SPEECHWIRE_ASR_ACCESS_KEY")
                .or(fc.credentials.asr.access_key)
                .map(SecretString::from),
        };

        let voice_defaults = VoiceSettings::default();
        let voice = VoiceSettings {
            voice_id: env("SPEECHWIRE_TTS_VOICE")
                .or(fc.tts.voice_id)
                .unwrap_or(voice_defaults.voice_id),
            emotion: fc.tts.emotion.unwrap_or(voice_defaults.emotion),
            speed_ratio: fc.tts.speed_ratio.unwrap_or(voice_defaults.speed_ratio),
            volume_ratio: fc.tts.volume_ratio.unwrap_or(voice_defaults.volume_ratio),
            pitch_ratio: fc.tts.pitch_ratio.unwrap_or(voice_defaults.pitch_ratio),
        };

        let tts_defaults = TtsConfig::default();
        let tts = TtsConfig {
            enabled: env("SPEECHWIRE_TTS_ENABLED")
                .and_then(|s| parse_flag("SPEECHWIRE_TTS_ENABLED", &s))
                .or(fc.tts.enabled)
                .unwrap_or(tts_defaults.enabled),
            url: fc.tts.url.unwrap_or(tts_defaults.url),
            cluster: fc.tts.cluster.unwrap_or(tts_defaults.cluster),
            uid: fc.tts.uid.unwrap_or(tts_defaults.uid),
            engine: env("SPEECHWIRE_TTS_ENGINE")
                .or(fc.tts.engine)
                .and_then(|s| parse_or_warn::<TtsEngine>("tts engine", &s))
                .unwrap_or_default(),
            voice,
            emotion_aliases: fc.tts.emotions.unwrap_or_default(),
            synthesis_timeout: fc
                .tts
                .synthesis_timeout_ms
                .map_or(DEFAULT_SYNTHESIS_TIMEOUT, Duration::from_millis),
            app_id: env("SPEECHWIRE_TTS_APP_ID")
                .or(fc.credentials.tts.app_id)
                .map(SecretString::from),
            token: env("SPEECHWIRE_TTS_TOKEN")
                .or(fc.credentials.tts.token)
                .map(SecretString::from),
        };

        let agent = AgentConfig {
            player_name: fc
                .agent
                .player_name
                .unwrap_or_else(|| AgentConfig::default().player_name),
        };

        tracing::debug!(
            vad_mode = %vad.mode,
            asr_auto_start = asr.auto_start,
            tts_enabled = tts.enabled,
            tts_engine = ?tts.engine,
            voice = %tts.voice.voice_id,
            asr_credentials = asr.credentials().is_ok(),
            tts_credentials = tts.credentials().is_ok(),
            "configuration loaded"
        );

        Ok(Self {
            vad,
            asr,
            tts,
            agent,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            asr: AsrConfig::default(),
            tts: TtsConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

fn parse_or_warn<T: FromStr<Err = Error>>(source: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(source, value, error = %e, "ignoring invalid setting");
            None
        }
    }
}

fn parse_flag(source: &str, value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(source, value, "ignoring invalid flag");
            None
        }
    }
}
