//! TOML configuration file loading
//!
//! Supports `~/.config/speechwire/config.toml` as a persistent config source.
//! All fields are optional: the file is a partial overlay on top of defaults.
//! Keys are snake_case; the camelCase spellings used by older settings files
//! are accepted as aliases.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::vad::VadMode;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SpeechwireConfigFile {
    /// Voice activity detection
    #[serde(default)]
    pub vad: VadFileConfig,

    /// Speech recognition service
    #[serde(default)]
    pub asr: AsrFileConfig,

    /// Speech synthesis service and voice
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Service credentials
    #[serde(default, alias = "appCredentials")]
    pub credentials: CredentialsFileConfig,

    /// Recognized-text routing
    #[serde(default)]
    pub agent: AgentFileConfig,
}

/// Voice activity detection settings
#[derive(Debug, Default, Deserialize)]
pub struct VadFileConfig {
    /// `off`, `manual`, `auto`, `continuous` or 0-3
    pub mode: Option<VadMode>,

    /// Trailing silence before AUTO mode stops (ms)
    #[serde(alias = "silenceTimeoutMs")]
    pub silence_timeout_ms: Option<u64>,

    /// Normalized amplitude threshold
    #[serde(alias = "amplitudeThreshold")]
    pub amplitude_threshold: Option<f32>,

    /// Frames per AUTO-mode evaluation
    #[serde(alias = "batchFrames")]
    pub batch_frames: Option<usize>,
}

/// Speech recognition service settings
#[derive(Debug, Default, Deserialize)]
pub struct AsrFileConfig {
    pub url: Option<String>,

    #[serde(alias = "resourceId")]
    pub resource_id: Option<String>,

    pub uid: Option<String>,

    #[serde(alias = "modelName")]
    pub model_name: Option<String>,

    #[serde(alias = "enablePunc")]
    pub enable_punc: Option<bool>,

    /// Start listening at launch
    #[serde(alias = "autoStart", alias = "asr_auto_start")]
    pub auto_start: Option<bool>,
}

/// Speech synthesis settings
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Speech output on or off
    #[serde(alias = "enableTts", alias = "enable_tts")]
    pub enabled: Option<bool>,

    pub url: Option<String>,
    pub cluster: Option<String>,
    pub uid: Option<String>,

    /// `remote` or `local`
    pub engine: Option<String>,

    #[serde(alias = "voiceId")]
    pub voice_id: Option<String>,

    /// Default emotion tag
    pub emotion: Option<String>,

    #[serde(alias = "speedRatio")]
    pub speed_ratio: Option<f32>,

    #[serde(alias = "volumeRatio")]
    pub volume_ratio: Option<f32>,

    #[serde(alias = "pitchRatio")]
    pub pitch_ratio: Option<f32>,

    /// Extra marker aliases (alias -> emotion tag)
    pub emotions: Option<HashMap<String, String>>,

    #[serde(alias = "synthesisTimeoutMs")]
    pub synthesis_timeout_ms: Option<u64>,
}

/// Credentials for both services
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsFileConfig {
    #[serde(default)]
    pub asr: AsrCredentialsFile,

    #[serde(default)]
    pub tts: TtsCredentialsFile,
}

/// Recognition service credentials
#[derive(Debug, Default, Deserialize)]
pub struct AsrCredentialsFile {
    #[serde(alias = "appKey")]
    pub app_key: Option<String>,

    #[serde(alias = "accessKey")]
    pub access_key: Option<String>,
}

/// Synthesis service credentials
#[derive(Debug, Default, Deserialize)]
pub struct TtsCredentialsFile {
    #[serde(alias = "appId")]
    pub app_id: Option<String>,

    pub token: Option<String>,
}

/// Agent routing settings
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    /// Sender name attached to recognized text
    #[serde(alias = "playerName")]
    pub player_name: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `SpeechwireConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> SpeechwireConfigFile {
    config_file_path().map_or_else(SpeechwireConfigFile::default, |path| load_config_from(&path))
}

/// Load a config file from an explicit path, falling back to defaults
pub fn load_config_from(path: &Path) -> SpeechwireConfigFile {
    if !path.exists() {
        return SpeechwireConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                SpeechwireConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            SpeechwireConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/speechwire/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("speechwire").join("config.toml"))
}
