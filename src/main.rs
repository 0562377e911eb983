use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use speechwire::daemon::speech_queue;
use speechwire::transport::WsConnector;
use speechwire::tts::SynthesisConfig;
use speechwire::vad::{VadMode, mean_amplitude};
use speechwire::voice::{AudioPlayback, AudioSource, MicrophoneCapture, SAMPLE_RATE, tone};
use speechwire::{Config, Daemon};

/// Speechwire - talk to agents through streaming speech recognition and synthesis
#[derive(Parser)]
#[command(name = "speechwire", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "SPEECHWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Listening mode: off, manual, auto, continuous (or 0-3)
    #[arg(short, long)]
    mode: Option<VadMode>,

    /// Speak recognized text back
    #[arg(long)]
    echo: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize and play text
    Say {
        /// Text to speak; may start with an emotion marker like "(happy)"
        text: String,
        /// Voice id override
        #[arg(long)]
        voice: Option<String>,
        /// Default emotion override
        #[arg(long)]
        emotion: Option<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,speechwire=info",
        1 => "info,speechwire=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(mode) = cli.mode {
        config.vad.mode = mode;
    }
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Say {
                text,
                voice,
                emotion,
            } => say(config, text, voice, emotion).await,
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
        };
    }

    tracing::info!(mode = %config.vad.mode, echo = cli.echo, "starting speechwire");
    Daemon::new(config).with_echo(cli.echo).run().await?;
    Ok(())
}

/// Speak one piece of text and wait for it to finish
async fn say(
    config: Config,
    text: String,
    voice: Option<String>,
    emotion: Option<String>,
) -> anyhow::Result<()> {
    let overrides = (voice.is_some() || emotion.is_some()).then(|| SynthesisConfig {
        voice_id: voice,
        emotion,
        ..SynthesisConfig::default()
    });

    let queue = speech_queue(config.tts, Arc::new(WsConnector::default()), None);
    queue.enqueue(text, overrides);
    queue.wait_idle().await;
    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = MicrophoneCapture::new()?;
    let (tx, mut rx) = mpsc::channel(256);
    capture.start(tx)?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let mut samples = Vec::new();
        while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            samples.extend(frame);
        }

        let level = mean_amplitude(&samples);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (level * 500.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] Level: {level:.4} | [{meter}]", i + 1);
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If the level stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;
    playback
        .play_samples(tone(440.0, Duration::from_secs(2), 0.3))
        .await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}
