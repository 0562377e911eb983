//! Frame codec integration tests
//!
//! Exercises the codec against frames laid out byte-for-byte like the remote
//! service's, without any network.

use serde_json::json;
use speechwire::Error;
use speechwire::protocol::{self, FramePayload, MessageType};

mod common;

use common::{audio_chunk, recognition_result, server_error, server_frame};

#[test]
fn test_audio_frames_recover_payload_and_sequence() {
    for (len, sequence) in [(0usize, 1), (1, 2), (3200, 417)] {
        let audio: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let frame = protocol::encode_audio_frame(&audio, sequence, false).unwrap();

        let decoded = protocol::decode(&frame).unwrap();
        assert_eq!(decoded.message_type, Some(MessageType::AudioOnlyRequest));
        assert_eq!(decoded.sequence, Some(sequence));
        assert!(!decoded.is_last_package);
        assert_eq!(decoded.payload, FramePayload::ClientAudio(audio));
    }
}

#[test]
fn test_terminal_frame_negates_sequence() {
    let frame = protocol::encode_audio_frame(&[], 12, true).unwrap();
    let decoded = protocol::decode(&frame).unwrap();

    assert!(decoded.is_last_package);
    assert!(decoded.is_terminal());
    assert_eq!(decoded.sequence, Some(-12));
    assert_eq!(decoded.payload, FramePayload::ClientAudio(Vec::new()));
}

#[test]
fn test_handshake_decodes_as_client_request() {
    let payload = json!({"user": {"uid": "u1"}, "request": {"model_name": "bigmodel"}});
    let frame = protocol::encode_full_request(&payload, Some(1)).unwrap();

    let decoded = protocol::decode(&frame).unwrap();
    assert_eq!(decoded.message_type, Some(MessageType::FullClientRequest));
    assert_eq!(decoded.sequence, Some(1));
    assert_eq!(decoded.payload, FramePayload::ClientRequest(payload));
}

#[test]
fn test_service_frames() {
    let result = protocol::decode(&recognition_result(3, "打开背包")).unwrap();
    assert_eq!(
        result.payload,
        FramePayload::Response(json!({"result": {"text": "打开背包"}}))
    );

    let chunk = protocol::decode(&audio_chunk(-6, b"ID3")).unwrap();
    assert!(chunk.is_terminal());
    assert_eq!(chunk.payload, FramePayload::Audio(b"ID3".to_vec()));

    let err = protocol::decode(&server_error(45_000_151, "audio format invalid")).unwrap_err();
    assert!(err.is_server_error());
    assert!(!err.is_decode_error());
}

#[test]
fn test_short_and_truncated_buffers_are_classified() {
    for buf in [&[][..], &[0x11][..], &[0x11, 0x91, 0x11][..]] {
        let err = protocol::decode(buf).unwrap_err();
        assert!(err.is_decode_error(), "{err:?}");
    }

    let mut truncated = server_frame(0x91, 0x11, Some(2), b"0123456789");
    truncated.truncate(truncated.len() - 4);
    let err = protocol::decode(&truncated).unwrap_err();
    assert!(matches!(err, Error::TruncatedFrame { needed: 10, available: 6 }));
}

#[test]
fn test_corrupt_gzip_is_local_error() {
    let frame = server_frame(0x91, 0x11, Some(2), b"not gzip at all");
    let err = protocol::decode(&frame).unwrap_err();
    assert!(err.is_decode_error(), "{err:?}");
}
