//! Frame encoding and decoding

use serde::Serialize;

use super::gzip::{gunzip, gzip};
use super::{
    Compression, DEFAULT_HEADER_WORDS, HEADER_LEN, MessageType, PROTOCOL_VERSION, Serialization,
    flags,
};
use crate::{Error, Result};

/// Decoded 4-byte frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version (high nibble of byte 0)
    pub version: u8,
    /// Header length in 4-byte words (low nibble of byte 0)
    pub header_words: u8,
    /// Raw message type nibble
    pub message_type: u8,
    /// Message-type-specific flags
    pub flags: u8,
    /// Serialization nibble
    pub serialization: u8,
    /// Compression nibble
    pub compression: u8,
}

impl Header {
    /// Create a header with the default version and size
    #[must_use]
    pub const fn new(
        message_type: MessageType,
        flags: u8,
        serialization: Serialization,
        compression: Compression,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            header_words: DEFAULT_HEADER_WORDS,
            message_type: message_type as u8,
            flags,
            serialization: serialization as u8,
            compression: compression as u8,
        }
    }

    /// Encode to the 4 wire bytes
    #[must_use]
    pub const fn encode(&self) -> [u8; HEADER_LEN] {
        [
            (self.version << 4) | (self.header_words & 0x0F),
            (self.message_type << 4) | (self.flags & 0x0F),
            (self.serialization << 4) | (self.compression & 0x0F),
            0x00,
        ]
    }

    /// Decode the first 4 bytes of a buffer
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` if the buffer is shorter than 4 bytes
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::MalformedFrame(format!(
                "frame too short for header: {} bytes",
                buf.len()
            )));
        }

        Ok(Self {
            version: buf[0] >> 4,
            header_words: buf[0] & 0x0F,
            message_type: buf[1] >> 4,
            flags: buf[1] & 0x0F,
            serialization: buf[2] >> 4,
            compression: buf[2] & 0x0F,
        })
    }

    /// Declared header length in bytes
    #[must_use]
    pub const fn header_len(&self) -> usize {
        self.header_words as usize * 4
    }

    /// Parsed message type, if known
    #[must_use]
    pub const fn kind(&self) -> Option<MessageType> {
        MessageType::from_nibble(self.message_type)
    }

    /// Whether an i32 sequence number follows the header
    #[must_use]
    pub const fn has_sequence(&self) -> bool {
        flags::has_flag(self.flags, flags::HAS_SEQUENCE)
    }

    /// Whether this is the last packet of the stream
    #[must_use]
    pub const fn is_last_packet(&self) -> bool {
        flags::has_flag(self.flags, flags::LAST_PACKET)
    }

    const fn is_gzip(&self) -> bool {
        self.compression == Compression::Gzip as u8
    }

    const fn is_json(&self) -> bool {
        self.serialization == Serialization::Json as u8
    }
}

/// Payload of a decoded frame, classified by message type
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    /// JSON body of a full server response (recognition result or synthesis metadata)
    Response(serde_json::Value),
    /// Non-JSON body of a full server response
    RawResponse(Vec<u8>),
    /// Audio chunk carried by a sequenced server frame
    Audio(Vec<u8>),
    /// Bare sequence acknowledgement
    Ack,
    /// Informational frontend response
    Frontend(Vec<u8>),
    /// Client handshake request
    ClientRequest(serde_json::Value),
    /// Client audio chunk
    ClientAudio(Vec<u8>),
    /// Message outside the framed protocol (raw JSON envelope or unknown type)
    SideChannel(String),
}

/// A frame after header parsing and payload extraction
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Message type, `None` for side-channel messages
    pub message_type: Option<MessageType>,
    /// Sequence number, if the flags declared one
    pub sequence: Option<i32>,
    /// Last-packet flag
    pub is_last_package: bool,
    /// Classified payload
    pub payload: FramePayload,
}

impl DecodedFrame {
    /// Whether this frame terminates its stream (last flag or negative sequence)
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.is_last_package || self.sequence.is_some_and(|s| s < 0)
    }
}

/// Encode a full client request (gzip-compressed JSON)
///
/// The ASR handshake carries the session's current sequence number; the TTS
/// request carries none. The caller advances its sequence counter afterward.
///
/// # Errors
///
/// Returns error if the payload cannot be serialized or compressed
pub fn encode_full_request<T: Serialize + ?Sized>(
    payload: &T,
    sequence: Option<i32>,
) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(payload)?;
    let body = gzip(&json)?;

    let flag_bits = if sequence.is_some() {
        flags::POS_SEQUENCE
    } else {
        flags::NO_SEQUENCE
    };
    let header = Header::new(
        MessageType::FullClientRequest,
        flag_bits,
        Serialization::Json,
        Compression::Gzip,
    );

    assemble(header, sequence, &body)
}

/// Encode an audio-only frame
///
/// The terminal frame (`is_last`) carries the negated sequence number and may
/// have an empty payload.
///
/// # Errors
///
/// Returns error if the audio cannot be compressed
pub fn encode_audio_frame(audio: &[u8], sequence: i32, is_last: bool) -> Result<Vec<u8>> {
    let body = gzip(audio)?;

    let (flag_bits, wire_sequence) = if is_last {
        (flags::NEG_WITH_SEQUENCE, sequence.saturating_neg())
    } else {
        (flags::POS_SEQUENCE, sequence)
    };

    // The service expects the JSON nibble on audio frames too
    let header = Header::new(
        MessageType::AudioOnlyRequest,
        flag_bits,
        Serialization::Json,
        Compression::Gzip,
    );

    assemble(header, Some(wire_sequence), &body)
}

fn assemble(header: Header, sequence: Option<i32>, body: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(body.len())
        .map_err(|_| Error::MalformedFrame(format!("payload too large: {} bytes", body.len())))?;

    let mut frame = Vec::with_capacity(HEADER_LEN + 8 + body.len());
    frame.extend_from_slice(&header.encode());
    if let Some(seq) = sequence {
        frame.extend_from_slice(&seq.to_be_bytes());
    }
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Decode one frame
///
/// Local failures come back as `MalformedFrame` or `TruncatedFrame`; a
/// server-error frame comes back as `Error::Server`. Raw JSON envelopes and
/// unknown message types decode successfully as [`FramePayload::SideChannel`].
///
/// # Errors
///
/// Returns error if the frame is malformed, truncated, or a server error
pub fn decode(buf: &[u8]) -> Result<DecodedFrame> {
    if buf.first() == Some(&b'{') {
        return Ok(side_channel(None, json_envelope_message(buf)));
    }

    let header = Header::decode(buf)?;
    let header_len = header.header_len();
    if header_len < HEADER_LEN {
        return Err(Error::MalformedFrame(format!(
            "declared header size {header_len} below minimum"
        )));
    }
    if header_len > buf.len() {
        return Err(Error::MalformedFrame(format!(
            "declared header size {header_len} exceeds frame length {}",
            buf.len()
        )));
    }

    let mut reader = Reader::new(&buf[header_len..]);

    let sequence = if header.has_sequence() {
        Some(reader.read_i32()?)
    } else {
        None
    };
    let is_last_package = header.is_last_packet();

    let Some(kind) = header.kind() else {
        return Ok(side_channel(
            sequence,
            format!("unknown message type {:#x}", header.message_type),
        ));
    };

    let payload = match kind {
        MessageType::FullServerResponse => {
            let body = sized_body(&mut reader, &header)?;
            if header.is_json() {
                FramePayload::Response(parse_json(&body)?)
            } else {
                FramePayload::RawResponse(body)
            }
        }
        MessageType::ServerAck => {
            if reader.is_empty() {
                FramePayload::Ack
            } else {
                FramePayload::Audio(sized_body(&mut reader, &header)?)
            }
        }
        MessageType::FrontendResponse => FramePayload::Frontend(reader.rest().to_vec()),
        MessageType::ServerError => return Err(server_error(&mut reader, &header)),
        MessageType::FullClientRequest => {
            let body = sized_body(&mut reader, &header)?;
            FramePayload::ClientRequest(parse_json(&body)?)
        }
        MessageType::AudioOnlyRequest => FramePayload::ClientAudio(sized_body(&mut reader, &header)?),
    };

    Ok(DecodedFrame {
        message_type: Some(kind),
        sequence,
        is_last_package,
        payload,
    })
}

fn side_channel(sequence: Option<i32>, message: String) -> DecodedFrame {
    DecodedFrame {
        message_type: None,
        sequence,
        is_last_package: false,
        payload: FramePayload::SideChannel(message),
    }
}

/// Pull the `error` field out of a raw JSON envelope, falling back to the text
fn json_envelope_message(buf: &[u8]) -> String {
    let text = String::from_utf8_lossy(buf).into_owned();
    serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| {
            v.get("error")
                .map(|e| e.as_str().map_or_else(|| e.to_string(), ToString::to_string))
        })
        .unwrap_or(text)
}

fn parse_json(body: &[u8]) -> Result<serde_json::Value> {
    serde_json::from_slice(body).map_err(|e| Error::MalformedFrame(format!("json: {e}")))
}

/// Read a u32 size prefix and exactly that many bytes, decompressing if flagged
fn sized_body(reader: &mut Reader<'_>, header: &Header) -> Result<Vec<u8>> {
    let size = reader.read_u32()? as usize;
    let raw = reader.take(size)?;
    if header.is_gzip() {
        gunzip(raw)
    } else {
        Ok(raw.to_vec())
    }
}

fn server_error(reader: &mut Reader<'_>, header: &Header) -> Error {
    let code = match reader.read_u32() {
        Ok(code) => code,
        Err(e) => return e,
    };

    if reader.is_empty() {
        return Error::Server {
            code,
            message: String::new(),
        };
    }

    let message = match sized_body(reader, header) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => return e,
    };

    Error::Server { code, message }
}

/// Bounds-checked big-endian reader over a frame body
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::TruncatedFrame {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Build a server frame by hand the way the remote service lays it out
    fn server_frame(byte1: u8, byte2: u8, sequence: Option<i32>, body: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x11, byte1, byte2, 0x00];
        if let Some(seq) = sequence {
            frame.extend_from_slice(&seq.to_be_bytes());
        }
        frame.extend_from_slice(&u32::try_from(body.len()).unwrap().to_be_bytes());
        frame.extend_from_slice(body);
        frame
    }

    #[test]
    fn test_full_request_header_bytes() {
        let with_seq = encode_full_request(&json!({"a": 1}), Some(1)).unwrap();
        assert_eq!(&with_seq[..4], &[0x11, 0x11, 0x11, 0x00]);
        assert_eq!(&with_seq[4..8], &1i32.to_be_bytes());

        let without_seq = encode_full_request(&json!({"a": 1}), None).unwrap();
        assert_eq!(&without_seq[..4], &[0x11, 0x10, 0x11, 0x00]);
        let declared = u32::from_be_bytes(without_seq[4..8].try_into().unwrap()) as usize;
        assert_eq!(declared, without_seq.len() - 8);
    }

    #[test]
    fn test_audio_frame_header_bytes() {
        let normal = encode_audio_frame(&[1, 2, 3], 7, false).unwrap();
        assert_eq!(&normal[..4], &[0x11, 0x21, 0x11, 0x00]);
        assert_eq!(&normal[4..8], &7i32.to_be_bytes());

        let last = encode_audio_frame(&[], 7, true).unwrap();
        assert_eq!(&last[..4], &[0x11, 0x23, 0x11, 0x00]);
        assert_eq!(&last[4..8], &(-7i32).to_be_bytes());
    }

    #[test]
    fn test_payload_length_matches_body() {
        let frame = encode_audio_frame(&[0u8; 640], 3, false).unwrap();
        let declared = u32::from_be_bytes(frame[8..12].try_into().unwrap()) as usize;
        assert_eq!(declared, frame.len() - 12);
    }

    #[test]
    fn test_decode_recognition_result() {
        let body = gzip(br#"{"result":{"text":"hello"}}"#).unwrap();
        let frame = server_frame(0x91, 0x11, Some(2), &body);

        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.message_type, Some(MessageType::FullServerResponse));
        assert_eq!(decoded.sequence, Some(2));
        assert!(!decoded.is_last_package);
        assert_eq!(
            decoded.payload,
            FramePayload::Response(json!({"result": {"text": "hello"}}))
        );
    }

    #[test]
    fn test_decode_last_package_flag() {
        let body = br#"{"result":{"text":"done"}}"#;
        let frame = server_frame(0x93, 0x10, Some(-5), body);

        let decoded = decode(&frame).unwrap();
        assert!(decoded.is_last_package);
        assert!(decoded.is_terminal());
        assert_eq!(decoded.sequence, Some(-5));
    }

    #[test]
    fn test_decode_downlink_audio_chunk() {
        let frame = server_frame(0xB1, 0x00, Some(3), b"mp3bytes");
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.payload, FramePayload::Audio(b"mp3bytes".to_vec()));
        assert!(!decoded.is_terminal());

        let last = server_frame(0xB3, 0x00, Some(-4), b"tail");
        let decoded = decode(&last).unwrap();
        assert_eq!(decoded.payload, FramePayload::Audio(b"tail".to_vec()));
        assert!(decoded.is_terminal());
    }

    #[test]
    fn test_decode_bare_ack() {
        let decoded = decode(&[0x11, 0xB0, 0x00, 0x00]).unwrap();
        assert_eq!(decoded.payload, FramePayload::Ack);
        assert_eq!(decoded.sequence, None);
    }

    #[test]
    fn test_decode_server_error_gzip_message() {
        let message = gzip(b"quota exceeded").unwrap();
        let mut frame = vec![0x11, 0xF0, 0x11, 0x00];
        frame.extend_from_slice(&45_000_001u32.to_be_bytes());
        frame.extend_from_slice(&u32::try_from(message.len()).unwrap().to_be_bytes());
        frame.extend_from_slice(&message);

        match decode(&frame) {
            Err(Error::Server { code, message }) => {
                assert_eq!(code, 45_000_001);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_short_buffer() {
        let err = decode(&[0x11, 0x90]).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_header_size_exceeds_buffer() {
        // Header claims 3 words (12 bytes) but only 6 bytes exist
        let err = decode(&[0x13, 0x90, 0x11, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn test_decode_declared_payload_exceeds_buffer() {
        let mut frame = vec![0x11, 0x91, 0x10, 0x00];
        frame.extend_from_slice(&1i32.to_be_bytes());
        frame.extend_from_slice(&100u32.to_be_bytes());
        frame.extend_from_slice(b"short");

        match decode(&frame) {
            Err(Error::TruncatedFrame { needed, available }) => {
                assert_eq!(needed, 100);
                assert_eq!(available, 5);
            }
            other => panic!("expected truncated frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_missing_sequence_bytes() {
        let err = decode(&[0x11, 0x91, 0x10, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, Error::TruncatedFrame { needed: 4, available: 1 }));
    }

    #[test]
    fn test_decode_json_envelope() {
        let decoded = decode(br#"{"error":"invalid access key"}"#).unwrap();
        assert_eq!(decoded.message_type, None);
        assert_eq!(
            decoded.payload,
            FramePayload::SideChannel("invalid access key".to_string())
        );
    }

    #[test]
    fn test_decode_unknown_type_is_side_channel() {
        let decoded = decode(&[0x11, 0x50, 0x00, 0x00, 0xAA]).unwrap();
        assert!(matches!(decoded.payload, FramePayload::SideChannel(_)));
    }

    #[test]
    fn test_decode_extended_header_skips_extension() {
        // Two header words: 4 extension bytes precede the body
        let mut frame = vec![0x12, 0x90, 0x10, 0x00, 0xDE, 0xAD, 0xBE, 0xEF];
        frame.extend_from_slice(&2u32.to_be_bytes());
        frame.extend_from_slice(b"{}");

        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.payload, FramePayload::Response(json!({})));
    }
}
