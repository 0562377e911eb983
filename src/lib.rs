//! Speechwire - real-time voice streaming for binary-framed ASR/TTS services
//!
//! This library carries microphone audio to a remote speech-recognition
//! service and synthesized speech from a remote text-to-speech service back to
//! the speakers. Both directions share one binary frame format over a
//! persistent websocket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────┐   ┌────────────────┐   ┌───────────────┐
//! │  Microphone  │──▶│   VAD   │──▶│ UplinkSession  │──▶│ AgentRegistry │
//! └──────────────┘   └─────────┘   └───────┬────────┘   └───────────────┘
//!        ▲ start/stop (trigger)            │ frames
//!                                  ┌───────▼────────┐
//!                                  │    protocol    │
//!                                  └───────▲────────┘
//! ┌──────────────┐   ┌─────────────┐   ┌───┴────────────┐
//! │   Speakers   │◀──│ SpeechRouter│◀──│ DownlinkSession│◀── PlaybackQueue
//! └──────────────┘   └─────────────┘   └────────────────┘
//! ```

pub mod asr;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod status;
pub mod transport;
pub mod trigger;
pub mod tts;
pub mod vad;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
