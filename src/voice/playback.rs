//! Audio playback to speakers

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::AudioSink;
use crate::{Error, Result};

/// Sample rate for playback (the synthesis service emits 24 kHz MP3)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Plays audio to the default output device
#[derive(Debug, Clone)]
pub struct AudioPlayback {
    config: StreamConfig,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, 1))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }

    /// Play f32 samples at the playback rate
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    pub async fn play_samples(&self, samples: Vec<f32>) -> Result<()> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || play_samples_blocking(&config, &samples))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

#[async_trait]
impl AudioSink for AudioPlayback {
    async fn play(&self, audio: Vec<u8>) -> Result<()> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let samples = decode_mp3(&audio)?;
            play_samples_blocking(&config, &samples)
        })
        .await
        .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

/// Sink that drops audio, for hosts without an output device
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

#[async_trait]
impl AudioSink for DiscardSink {
    async fn play(&self, audio: Vec<u8>) -> Result<()> {
        tracing::info!(bytes = audio.len(), "no output device, audio discarded");
        Ok(())
    }
}

/// Play samples in a blocking manner
fn play_samples_blocking(config: &StreamConfig, samples: &[f32]) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let channels = config.channels as usize;
    let samples: Arc<[f32]> = Arc::from(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let finished = Arc::clone(&finished);

        device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(pos).copied().unwrap_or_else(|| {
                            finished.store(true, Ordering::Relaxed);
                            0.0
                        });
                        frame.fill(sample);
                        if pos < samples.len() {
                            pos += 1;
                        }
                    }
                    position.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (samples.len() as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);

    // Poll for completion with timeout
    let start = Instant::now();
    let timeout = Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::Relaxed) {
        if start.elapsed() > timeout {
            tracing::warn!("playback did not report completion");
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    // Small delay to ensure audio finishes
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = samples.len(), "playback complete");

    Ok(())
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() && !mp3_data.is_empty() {
        return Err(Error::Audio("no audio frames in MP3 data".to_string()));
    }

    Ok(samples)
}

/// Generate a sine tone at the playback rate
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn tone(frequency: f32, duration: Duration, volume: f32) -> Vec<f32> {
    let rate = PLAYBACK_SAMPLE_RATE as f32;
    let count = (duration.as_secs_f32() * rate) as usize;
    (0..count)
        .map(|i| (i as f32 * frequency * 2.0 * std::f32::consts::PI / rate).sin() * volume)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty_mp3() {
        assert!(decode_mp3(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_decode_garbage_mp3_fails() {
        assert!(decode_mp3(&[0u8; 64]).is_err());
    }

    #[test]
    fn test_tone_length() {
        let samples = tone(440.0, Duration::from_millis(500), 0.3);
        assert_eq!(samples.len(), 12000);
        assert!(samples.iter().all(|s| s.abs() <= 0.3 + f32::EPSILON));
    }

    #[tokio::test]
    async fn test_discard_sink_accepts_audio() {
        DiscardSink.play(vec![1, 2, 3]).await.unwrap();
    }
}
