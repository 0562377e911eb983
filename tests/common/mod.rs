//! Shared test utilities
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use speechwire::protocol::{self, DecodedFrame};
use speechwire::transport::{Connection, Connector, Endpoint, RemotePeer};
use speechwire::voice::AudioSource;
use speechwire::{Error, Result};

/// Upper bound for anything a test awaits
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `future`, failing the test if it takes longer than [`TEST_TIMEOUT`]
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("timed out")
}

/// Connector handing the far end of every connection to the test
pub struct ScriptedConnector {
    peers: mpsc::UnboundedSender<RemotePeer>,
    endpoints: Mutex<Vec<Endpoint>>,
}

impl ScriptedConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RemotePeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                peers,
                endpoints: Mutex::new(Vec::new()),
            }),
            rx,
        )
    }

    /// Endpoints connected to, in order
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection> {
        self.endpoints.lock().unwrap().push(endpoint.clone());
        let (connection, peer) = Connection::in_memory();
        self.peers
            .send(peer)
            .map_err(|_| Error::Connection("test dropped the peer receiver".to_string()))?;
        Ok(connection)
    }
}

/// Connector that never connects
#[derive(Default)]
pub struct FailingConnector {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl Connector for FailingConnector {
    async fn connect(&self, _: &Endpoint) -> Result<Connection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::Connection("connection refused".to_string()))
    }
}

/// Audio source the test drives by hand
#[derive(Clone, Default)]
pub struct ManualSource {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    frames: Option<mpsc::Sender<Vec<i16>>>,
    starts: usize,
    stops: usize,
}

impl ManualSource {
    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    /// Push a frame as if the microphone captured it; `false` when not capturing
    pub fn push(&self, frame: Vec<i16>) -> bool {
        let sender = self.state.lock().unwrap().frames.clone();
        sender.is_some_and(|tx| tx.try_send(frame).is_ok())
    }
}

impl AudioSource for ManualSource {
    fn start(&mut self, frames: mpsc::Sender<Vec<i16>>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.frames.is_none() {
            state.frames = Some(frames);
            state.starts += 1;
        }
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.frames.take().is_some() {
            state.stops += 1;
        }
    }

    fn is_capturing(&self) -> bool {
        self.state.lock().unwrap().frames.is_some()
    }
}

/// Build a server frame by hand the way the remote service lays it out
pub fn server_frame(byte1: u8, byte2: u8, sequence: Option<i32>, body: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x11, byte1, byte2, 0x00];
    if let Some(seq) = sequence {
        frame.extend_from_slice(&seq.to_be_bytes());
    }
    frame.extend_from_slice(&u32::try_from(body.len()).unwrap().to_be_bytes());
    frame.extend_from_slice(body);
    frame
}

/// Gzip-compressed JSON recognition result
pub fn recognition_result(sequence: i32, text: &str) -> Vec<u8> {
    let json = serde_json::json!({"result": {"text": text}}).to_string();
    let body = protocol::gzip(json.as_bytes()).unwrap();
    let byte1 = if sequence < 0 { 0x93 } else { 0x91 };
    server_frame(byte1, 0x11, Some(sequence), &body)
}

/// Downlink audio chunk; a negative sequence marks the last one
pub fn audio_chunk(sequence: i32, audio: &[u8]) -> Vec<u8> {
    let byte1 = if sequence < 0 { 0xB3 } else { 0xB1 };
    server_frame(byte1, 0x00, Some(sequence), audio)
}

/// Server-error frame with an uncompressed message
pub fn server_error(code: u32, message: &str) -> Vec<u8> {
    let mut frame = vec![0x11, 0xF0, 0x10, 0x00];
    frame.extend_from_slice(&code.to_be_bytes());
    frame.extend_from_slice(&u32::try_from(message.len()).unwrap().to_be_bytes());
    frame.extend_from_slice(message.as_bytes());
    frame
}

/// Receive and decode the next client frame
pub async fn next_client_frame(peer: &mut RemotePeer) -> DecodedFrame {
    let bytes = within(peer.recv_frame()).await.expect("connection closed");
    protocol::decode(&bytes).expect("client frame decodes")
}

/// A frame of `len` samples at a constant level
pub fn constant_frame(level: i16, len: usize) -> Vec<i16> {
    vec![level; len]
}

/// Recognition settings with test credentials
pub fn asr_config() -> speechwire::config::AsrConfig {
    speechwire::config::AsrConfig {
        url: "wss://asr.test/ws".to_string(),
        app_key: Some(secrecy::SecretString::from("test-app-key")),
        access_key: Some(secrecy::SecretString::from("test-access-key")),
        ..Default::default()
    }
}

/// Synthesis settings with test credentials
pub fn tts_config() -> speechwire::config::TtsConfig {
    speechwire::config::TtsConfig {
        url: "wss://tts.test/ws".to_string(),
        app_id: Some(secrecy::SecretString::from("test-app")),
        token: Some(secrecy::SecretString::from("test-token")),
        ..Default::default()
    }
}
