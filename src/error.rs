//! Error types for speechwire

use thiserror::Error;

/// Result type alias for speechwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while streaming voice
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Required service credentials are absent
    #[error("credentials missing: {0}")]
    CredentialsMissing(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Frame header or body could not be parsed
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame declares more bytes than the buffer holds
    #[error("truncated frame: needed {needed} bytes, {available} available")]
    TruncatedFrame {
        /// Bytes the frame declared
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// Remote service reported a failure in a server-error frame
    #[error("server error {code}: {message}")]
    Server {
        /// Service error code
        code: u32,
        /// Service error message
        message: String,
    },

    /// Transport-level failure (connect, send, or unexpected close)
    #[error("connection error: {0}")]
    Connection(String),

    /// Audio was sent after the terminal frame of a session
    #[error("session already closed")]
    SessionAlreadyClosed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error is a local decode failure the caller should drop and log
    #[must_use]
    pub const fn is_decode_error(&self) -> bool {
        matches!(self, Self::MalformedFrame(_) | Self::TruncatedFrame { .. })
    }

    /// Whether this error came from the remote service
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connection(e.to_string())
    }
}
