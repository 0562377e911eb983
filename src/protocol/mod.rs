//! Binary frame protocol shared by the ASR uplink and the TTS downlink
//!
//! Every frame starts with a 4-byte header:
//! ```text
//! ┌──────────────────┬────────────────┬───────────────────────┬──────────┐
//! │ version | hdr sz │ msg type|flags │ serialization|compress│ reserved │
//! │ 4 bits  | 4 bits │ 4 bits | 4 bits│ 4 bits | 4 bits       │ 1 byte   │
//! └──────────────────┴────────────────┴───────────────────────┴──────────┘
//! ```
//! followed by an optional i32 sequence number, a u32 payload length and the
//! payload. All multi-byte integers are big endian.

mod frame;
mod gzip;

pub use frame::{
    DecodedFrame, FramePayload, Header, decode, encode_audio_frame, encode_full_request,
};
pub use gzip::{gunzip, gzip};

/// Protocol version carried in every header
pub const PROTOCOL_VERSION: u8 = 0x1;

/// Header length in 4-byte words for frames we emit
pub const DEFAULT_HEADER_WORDS: u8 = 0x1;

/// Size of the fixed header prefix in bytes
pub const HEADER_LEN: usize = 4;

/// Message type nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// JSON handshake or synthesis request from the client
    FullClientRequest = 0x1,
    /// Compressed audio chunk from the client
    AudioOnlyRequest = 0x2,
    /// JSON result from the server
    FullServerResponse = 0x9,
    /// Sequence acknowledgement, or an audio chunk on the TTS downlink
    ServerAck = 0xB,
    /// Informational frontend response (TTS only)
    FrontendResponse = 0xC,
    /// Error report from the server
    ServerError = 0xF,
}

impl MessageType {
    /// Parse the high nibble of header byte 1
    #[must_use]
    pub const fn from_nibble(value: u8) -> Option<Self> {
        match value {
            0x1 => Some(Self::FullClientRequest),
            0x2 => Some(Self::AudioOnlyRequest),
            0x9 => Some(Self::FullServerResponse),
            0xB => Some(Self::ServerAck),
            0xC => Some(Self::FrontendResponse),
            0xF => Some(Self::ServerError),
            _ => None,
        }
    }
}

/// Message-type-specific flag nibble
pub mod flags {
    /// No sequence number present
    pub const NO_SEQUENCE: u8 = 0b0000;
    /// Positive sequence number present
    pub const POS_SEQUENCE: u8 = 0b0001;
    /// Last packet, no sequence number
    pub const NEG_SEQUENCE: u8 = 0b0010;
    /// Last packet with a (negative) sequence number
    pub const NEG_WITH_SEQUENCE: u8 = 0b0011;

    /// Bit signalling an i32 sequence number follows the header
    pub const HAS_SEQUENCE: u8 = 0b0001;
    /// Bit signalling the last packet of a stream
    pub const LAST_PACKET: u8 = 0b0010;

    /// Check if a specific flag is set
    #[inline]
    #[must_use]
    pub const fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Payload serialization nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Serialization {
    /// Raw bytes
    None = 0x0,
    /// UTF-8 JSON
    Json = 0x1,
}

/// Payload compression nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    /// Uncompressed
    None = 0x0,
    /// Gzip
    Gzip = 0x1,
}
