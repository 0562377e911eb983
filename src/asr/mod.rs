//! Speech recognition (uplink)
//!
//! [`UplinkSession`] speaks the recognition protocol over one connection per
//! conversation. [`Listener`] decides when that conversation runs: it feeds
//! captured frames through voice activity detection and turns hotkey signals
//! into `start`/`stop` calls.
//!
//! Results flow out as [`UplinkMessage`]s tagged with the request id, so an
//! event from a torn-down conversation can be told apart from the current one.

mod listener;
mod request;
mod session;

pub use listener::{FRAME_CHANNEL_CAPACITY, Listener};
pub use request::{AudioFormat, HandshakeRequest, HandshakeUser, RecognitionParams, transcript_of};
pub use session::{SessionState, UplinkEvent, UplinkMessage, UplinkSession};
