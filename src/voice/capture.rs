//! Audio capture from microphone

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;

use super::AudioSource;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Captures audio from the default input device
///
/// The cpal stream is not `Send`, so it lives on its own thread for as long
/// as capture runs.
pub struct MicrophoneCapture {
    config: StreamConfig,
    worker: Option<CaptureWorker>,
}

struct CaptureWorker {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl MicrophoneCapture {
    /// Create a new audio capture instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            worker: None,
        })
    }
}

impl AudioSource for MicrophoneCapture {
    fn start(&mut self, frames: mpsc::Sender<Vec<i16>>) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let config = self.config.clone();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();

        let handle = std::thread::Builder::new()
            .name("speechwire-capture".to_string())
            .spawn(move || run_capture(&config, &frames, &stop_rx, &ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker { stop_tx, handle });
                tracing::debug!("audio capture started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(Error::Audio("capture thread exited early".to_string())),
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                tracing::warn!("audio capture thread panicked");
            }
            tracing::debug!("audio capture stopped");
        }
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the capture thread: own the stream until told to stop
fn run_capture(
    config: &StreamConfig,
    frames: &mpsc::Sender<Vec<i16>>,
    stop_rx: &std_mpsc::Receiver<()>,
    ready_tx: &std_mpsc::Sender<Result<()>>,
) {
    let stream = match open_stream(config, frames.clone()) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let _ = ready_tx.send(Ok(()));

    // Either an explicit stop or the owner going away ends capture
    let _ = stop_rx.recv();
    drop(stream);
}

fn open_stream(config: &StreamConfig, frames: mpsc::Sender<Vec<i16>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device".to_string()))?;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Err(e) = frames.try_send(f32_to_pcm(data)) {
                    tracing::trace!(error = %e, "capture frame dropped");
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(stream)
}

/// Convert f32 samples in `[-1.0, 1.0]` to PCM s16
#[must_use]
pub fn f32_to_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            #[allow(clippy::cast_possible_truncation)]
            let pcm = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            pcm
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_pcm_clamps() {
        assert_eq!(f32_to_pcm(&[0.0, 1.0, -1.0]), vec![0, 32767, -32767]);
        assert_eq!(f32_to_pcm(&[2.0, -2.0]), vec![32767, -32768]);
    }
}
