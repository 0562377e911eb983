//! Speech synthesis (downlink)
//!
//! Text goes through [`PlaybackQueue`], which hands one item at a time to a
//! [`SpeechBackend`]. The stock backend, [`SpeechRouter`], synthesizes with
//! [`DownlinkSession`] and plays the assembled MP3, falling back to
//! [`LocalSpeech`] when the remote service is unusable.

mod backend;
mod emotion;
mod queue;
mod request;
mod session;

pub use backend::{LocalSpeech, LogOnlySpeech, SpeechBackend, SpeechRouter, Synthesizer};
pub use emotion::{EmotionMap, ParsedText};
pub use queue::{PlaybackQueue, QueueEntry};
pub use request::{
    AppSection, AudioSection, RequestIdentity, RequestSection, SynthesisConfig, SynthesisRequest,
    UserSection, VoiceSettings,
};
pub use session::{DownlinkSession, SynthesisState};
