//! Audio devices
//!
//! Capture feeds PCM frames into the uplink; playback renders the MP3 the
//! downlink assembles. Both sit behind small traits so the engine runs on
//! hosts without audio hardware.

mod capture;
mod playback;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use capture::{MicrophoneCapture, SAMPLE_RATE, f32_to_pcm};
pub use playback::{AudioPlayback, DiscardSink, tone};

use crate::Result;

/// Source of 16 kHz mono PCM frames
pub trait AudioSource: Send {
    /// Start delivering frames to `frames`; a no-op if already capturing
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the device cannot be opened
    fn start(&mut self, frames: mpsc::Sender<Vec<i16>>) -> Result<()>;

    /// Stop delivering frames
    fn stop(&mut self);

    /// Whether frames are currently being delivered
    fn is_capturing(&self) -> bool;
}

/// Destination for a complete synthesized audio resource
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play the resource; resolves once playback finished
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be decoded or played
    async fn play(&self, audio: Vec<u8>) -> Result<()>;
}
