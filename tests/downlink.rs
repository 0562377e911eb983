//! Synthesis downlink integration tests
//!
//! The test plays the synthesis service over in-memory connections and checks
//! what the session sends, what it assembles, and that the playback queue
//! keeps moving through failures.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use speechwire::config::TtsEngine;
use speechwire::protocol::{self, FramePayload, MessageType};
use speechwire::transport::RemotePeer;
use speechwire::tts::{
    DownlinkSession, LocalSpeech, PlaybackQueue, SpeechRouter, SynthesisConfig, SynthesisState,
};
use speechwire::voice::AudioSink;
use speechwire::{Error, Result};

mod common;

use common::{ScriptedConnector, audio_chunk, server_error, server_frame, tts_config, within};

#[derive(Default)]
struct Recorder {
    played: Mutex<Vec<Vec<u8>>>,
    spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl AudioSink for Recorder {
    async fn play(&self, audio: Vec<u8>) -> Result<()> {
        self.played.lock().unwrap().push(audio);
        Ok(())
    }
}

#[async_trait]
impl LocalSpeech for Recorder {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Read the synthesis request the session sent and return its JSON
async fn read_request(peer: &mut RemotePeer) -> Value {
    let bytes = within(peer.recv_frame()).await.expect("request sent");
    assert_eq!(&bytes[..4], &[0x11, 0x10, 0x11, 0x00]);

    let frame = protocol::decode(&bytes).unwrap();
    assert_eq!(frame.message_type, Some(MessageType::FullClientRequest));
    assert_eq!(frame.sequence, None);
    match frame.payload {
        FramePayload::ClientRequest(body) => body,
        other => panic!("expected json request, got {other:?}"),
    }
}

#[tokio::test]
async fn test_chunks_assembled_in_arrival_order() {
    let (connector, mut peers) = ScriptedConnector::new();
    let session = DownlinkSession::new(connector.clone(), Arc::new(tts_config()));
    assert_eq!(session.state(), SynthesisState::Idle);

    let service = async {
        let mut peer = peers.recv().await.unwrap();
        let request = read_request(&mut peer).await;

        peer.send(server_frame(0xC0, 0x10, None, br#"{"phonemes":[]}"#)).await.unwrap();
        peer.send(vec![0x11, 0xB0, 0x00, 0x00]).await.unwrap();
        peer.send(audio_chunk(1, b"ID3")).await.unwrap();
        peer.send(vec![0x11, 0xB1]).await.unwrap();
        peer.send(audio_chunk(2, b"\xff\xfb")).await.unwrap();
        peer.send(audio_chunk(-3, b"tail")).await.unwrap();
        (peer, request)
    };

    let (audio, (_peer, request)) = within(async {
        tokio::join!(session.synthesize("你好，世界", None), service)
    })
    .await;

    assert_eq!(audio.unwrap(), b"ID3\xff\xfbtail".to_vec());
    assert_eq!(request["app"]["appid"], "test-app");
    assert_eq!(request["app"]["token"], "test-token");
    assert_eq!(request["app"]["cluster"], "volcano_tts");
    assert_eq!(request["audio"]["encoding"], "mp3");
    assert_eq!(request["request"]["text"], "你好，世界");
    assert_eq!(request["request"]["operation"], "submit");
    assert_eq!(session.state(), SynthesisState::Completed);
    assert_eq!(
        session.request_id().as_deref(),
        request["request"]["reqid"].as_str()
    );

    let endpoint = &connector.endpoints()[0];
    assert_eq!(endpoint.url, "wss://tts.test/ws");
    assert_eq!(endpoint.header_value("Authorization"), Some("Bearer; test-token"));
}

#[test]
fn test_emotion_marker_shapes_request() {
    let (connector, _peers) = ScriptedConnector::new();
    let session = DownlinkSession::new(connector, Arc::new(tts_config()));

    let request = session.build_request("(happy)Hello there", None).unwrap();
    assert_eq!(request.audio.emotion, "happy");
    assert!(request.audio.enable_emotion);
    assert_eq!(request.request.text, "Hello there");

    let request = session.build_request("(???)Hi", None).unwrap();
    assert_eq!(request.audio.emotion, "neutral");
    assert_eq!(request.request.text, "(???)Hi");

    let request = session
        .build_request("(开心)走吧", Some(&SynthesisConfig::voice("zh_female_test")))
        .unwrap();
    assert_eq!(request.audio.emotion, "happy");
    assert_eq!(request.audio.voice_type, "zh_female_test");
    assert_ne!(request.request.reqid, session.build_request("x", None).unwrap().request.reqid);
}

#[tokio::test]
async fn test_server_error_aborts_synthesis() {
    let (connector, mut peers) = ScriptedConnector::new();
    let session = DownlinkSession::new(connector, Arc::new(tts_config()));

    let service = async {
        let mut peer = peers.recv().await.unwrap();
        read_request(&mut peer).await;
        peer.send(audio_chunk(1, b"partial")).await.unwrap();
        peer.send(server_error(3031, "init engine instance failed")).await.unwrap();
        peer
    };

    let (result, _peer) = within(async { tokio::join!(session.synthesize("hi", None), service) }).await;
    match result {
        Err(Error::Server { code, message }) => {
            assert_eq!(code, 3031);
            assert_eq!(message, "init engine instance failed");
        }
        other => panic!("expected server error, got {other:?}"),
    }
    assert_eq!(session.state(), SynthesisState::Failed);
}

#[tokio::test]
async fn test_early_close_is_connection_error() {
    let (connector, mut peers) = ScriptedConnector::new();
    let session = DownlinkSession::new(connector, Arc::new(tts_config()));

    let service = async {
        let mut peer = peers.recv().await.unwrap();
        read_request(&mut peer).await;
        peer.send(audio_chunk(1, b"partial")).await.unwrap();
        peer.close();
        peer
    };

    let (result, _peer) = within(async { tokio::join!(session.synthesize("hi", None), service) }).await;
    assert!(matches!(result, Err(Error::Connection(_))));
}

#[tokio::test(start_paused = true)]
async fn test_silent_service_times_out() {
    let (connector, mut peers) = ScriptedConnector::new();
    let config = speechwire::config::TtsConfig {
        synthesis_timeout: Duration::from_millis(200),
        ..tts_config()
    };
    let session = DownlinkSession::new(connector, Arc::new(config));

    let result = session.synthesize("hi", None).await;
    assert!(matches!(result, Err(Error::Connection(_))));
    // The connection was opened; the service just never answered
    assert!(peers.try_recv().is_ok());
}

#[tokio::test]
async fn test_missing_credentials_use_local_speech() {
    let (connector, _peers) = ScriptedConnector::new();
    let recorder = Arc::new(Recorder::default());
    let router = SpeechRouter::new(
        TtsEngine::Remote,
        Arc::new(DownlinkSession::new(
            connector.clone(),
            Arc::new(speechwire::config::TtsConfig::default()),
        )),
        Arc::clone(&recorder) as Arc<dyn AudioSink>,
        Arc::clone(&recorder) as Arc<dyn LocalSpeech>,
    );
    let queue = PlaybackQueue::new(Arc::new(router));

    queue.enqueue("no keys configured", None);
    within(queue.wait_idle()).await;

    assert!(connector.endpoints().is_empty());
    assert_eq!(*recorder.spoken.lock().unwrap(), vec!["no keys configured"]);
    assert!(recorder.played.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_queue_advances_through_failures_one_at_a_time() {
    let (connector, mut peers) = ScriptedConnector::new();
    let recorder = Arc::new(Recorder::default());
    let router = SpeechRouter::new(
        TtsEngine::Remote,
        Arc::new(DownlinkSession::new(connector.clone(), Arc::new(tts_config()))),
        Arc::clone(&recorder) as Arc<dyn AudioSink>,
        Arc::clone(&recorder) as Arc<dyn LocalSpeech>,
    );
    let queue = PlaybackQueue::new(Arc::new(router));

    queue.enqueue("first", None);
    queue.enqueue("second", None);
    queue.enqueue("third", None);
    assert!(queue.is_speaking());

    let service = async {
        let mut first = peers.recv().await.unwrap();
        assert_eq!(read_request(&mut first).await["request"]["text"], "first");
        // Nothing else connects while an item is in flight
        assert!(peers.try_recv().is_err());
        first.send(server_error(3050, "voice not found")).await.unwrap();

        let mut second = peers.recv().await.unwrap();
        assert_eq!(read_request(&mut second).await["request"]["text"], "second");
        assert!(peers.try_recv().is_err());
        second.send(audio_chunk(1, b"ab")).await.unwrap();
        second.send(audio_chunk(-2, b"cd")).await.unwrap();

        let mut third = peers.recv().await.unwrap();
        assert_eq!(read_request(&mut third).await["request"]["text"], "third");
        third.close();
        (first, second, third)
    };

    let _peers = within(service).await;
    within(queue.wait_idle()).await;

    assert!(!queue.is_speaking());
    assert_eq!(queue.pending_len(), 0);
    assert_eq!(*recorder.played.lock().unwrap(), vec![b"abcd".to_vec()]);
    // Only the dropped connection fell back to local speech
    assert_eq!(*recorder.spoken.lock().unwrap(), vec!["third"]);
    assert_eq!(connector.endpoints().len(), 3);
}
