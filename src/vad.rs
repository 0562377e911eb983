//! Voice activity detection
//!
//! Decides which captured frames reach the uplink. The detector is a plain
//! state machine: callers feed it PCM frames with a timestamp and act on the
//! returned [`VadEvent`]s. Taking `&mut self` means one evaluation runs at a
//! time; the listener owns the only instance.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default trailing-silence window before AUTO mode ends a session
pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default normalized amplitude separating voice from silence
pub const DEFAULT_AMPLITUDE_THRESHOLD: f32 = 0.01;

/// Default number of capture frames evaluated together in AUTO mode
pub const DEFAULT_BATCH_FRAMES: usize = 5;

/// How listening is started and stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "ModeValue")]
pub enum VadMode {
    /// Listening only through explicit start/stop
    Off,
    /// Push-to-talk via hotkey
    #[default]
    Manual,
    /// Amplitude-driven start and stop
    Auto,
    /// Always listening
    Continuous,
}

impl VadMode {
    /// Map the numeric mode used in settings files (0-3)
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Off),
            1 => Some(Self::Manual),
            2 => Some(Self::Auto),
            3 => Some(Self::Continuous),
            _ => None,
        }
    }

    /// Whether the microphone stays open between sessions for monitoring
    #[must_use]
    pub const fn retains_microphone(self) -> bool {
        matches!(self, Self::Auto | Self::Continuous)
    }

    /// Lowercase mode name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::Continuous => "continuous",
        }
    }
}

impl fmt::Display for VadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VadMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(index) = trimmed.parse::<u8>() {
            return Self::from_index(index)
                .ok_or_else(|| Error::Config(format!("unknown vad mode index: {index}")));
        }

        match trimmed.to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "manual" | "hotkey" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            "continuous" => Ok(Self::Continuous),
            other => Err(Error::Config(format!("unknown vad mode: {other}"))),
        }
    }
}

/// Settings files write the mode either as a name or as 0-3
#[derive(Deserialize)]
#[serde(untagged)]
enum ModeValue {
    Index(u8),
    Name(String),
}

impl TryFrom<ModeValue> for VadMode {
    type Error = Error;

    fn try_from(value: ModeValue) -> Result<Self> {
        match value {
            ModeValue::Index(index) => Self::from_index(index)
                .ok_or_else(|| Error::Config(format!("unknown vad mode index: {index}"))),
            ModeValue::Name(name) => name.parse(),
        }
    }
}

/// Detector tuning
#[derive(Debug, Clone, PartialEq)]
pub struct VadConfig {
    /// Operating mode
    pub mode: VadMode,
    /// Trailing silence tolerated before AUTO mode stops listening
    pub silence_timeout: Duration,
    /// Normalized mean amplitude above which a batch counts as voice
    pub amplitude_threshold: f32,
    /// Frames accumulated per AUTO-mode evaluation
    pub batch_frames: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            mode: VadMode::default(),
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            amplitude_threshold: DEFAULT_AMPLITUDE_THRESHOLD,
            batch_frames: DEFAULT_BATCH_FRAMES,
        }
    }
}

/// What the uplink should do after a frame was processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VadEvent {
    /// Open an uplink session
    StartSession,
    /// Forward PCM s16le bytes to the open session
    Audio(Vec<u8>),
    /// Send the terminal frame and end the session
    StopSession,
}

/// Amplitude-based voice activity detector
#[derive(Debug)]
pub struct VoiceActivityDetector {
    config: VadConfig,
    listening: bool,
    batch: Vec<i16>,
    batched_frames: usize,
    silence_start: Option<Instant>,
}

impl VoiceActivityDetector {
    /// Create a detector; it starts out not listening
    #[must_use]
    pub fn new(config: VadConfig) -> Self {
        tracing::debug!(
            mode = %config.mode,
            threshold = config.amplitude_threshold,
            silence_ms = u64::try_from(config.silence_timeout.as_millis()).unwrap_or(u64::MAX),
            batch_frames = config.batch_frames,
            "voice activity detector initialized"
        );

        Self {
            config,
            listening: false,
            batch: Vec::new(),
            batched_frames: 0,
            silence_start: None,
        }
    }

    /// Feed one captured frame
    ///
    /// Returns the actions the caller must apply in order.
    pub fn process(&mut self, frame: &[i16], now: Instant) -> Vec<VadEvent> {
        match self.config.mode {
            VadMode::Off | VadMode::Manual => {
                if self.listening {
                    vec![VadEvent::Audio(pcm_to_bytes(frame))]
                } else {
                    Vec::new()
                }
            }
            VadMode::Continuous => {
                let mut events = Vec::with_capacity(2);
                if !self.listening {
                    self.listening = true;
                    events.push(VadEvent::StartSession);
                }
                events.push(VadEvent::Audio(pcm_to_bytes(frame)));
                events
            }
            VadMode::Auto => self.process_auto(frame, now),
        }
    }

    fn process_auto(&mut self, frame: &[i16], now: Instant) -> Vec<VadEvent> {
        self.batch.extend_from_slice(frame);
        self.batched_frames += 1;
        if self.batched_frames < self.config.batch_frames.max(1) {
            return Vec::new();
        }

        let batch = std::mem::take(&mut self.batch);
        self.batched_frames = 0;

        let amplitude = mean_amplitude(&batch);
        let mut events = Vec::new();

        if amplitude > self.config.amplitude_threshold {
            if !self.listening {
                tracing::debug!(amplitude, "voice detected");
                self.listening = true;
                events.push(VadEvent::StartSession);
            }
            self.silence_start = None;
            events.push(VadEvent::Audio(pcm_to_bytes(&batch)));
        } else if self.listening {
            let silence_start = *self.silence_start.get_or_insert(now);

            // Trailing silence is still sent so the utterance is not cut short
            events.push(VadEvent::Audio(pcm_to_bytes(&batch)));

            if now.saturating_duration_since(silence_start) > self.config.silence_timeout {
                tracing::debug!(amplitude, "silence timeout");
                self.listening = false;
                self.silence_start = None;
                events.push(VadEvent::StopSession);
            }
        } else {
            tracing::trace!(amplitude, "quiet batch dropped");
        }

        events
    }

    /// Explicit start or stop (hotkey, command, session teardown)
    pub fn set_listening(&mut self, listening: bool) {
        self.listening = listening;
        self.silence_start = None;
        if !listening {
            self.batch.clear();
            self.batched_frames = 0;
        }
    }

    /// Whether audio is currently being forwarded
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// When the current run of silence began, if any
    #[must_use]
    pub const fn silence_start(&self) -> Option<Instant> {
        self.silence_start
    }

    /// Current mode
    #[must_use]
    pub const fn mode(&self) -> VadMode {
        self.config.mode
    }

    /// Detector settings
    #[must_use]
    pub const fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Drop buffered audio and return to not listening
    pub fn reset(&mut self) {
        self.set_listening(false);
    }
}

/// Mean absolute amplitude normalized to `[0, 1]`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_amplitude(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f32 = samples.iter().map(|&s| f32::from(s).abs()).sum();
    (sum / samples.len() as f32 / 32768.0).min(1.0)
}

/// Serialize PCM samples as 16-bit little endian
#[must_use]
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
