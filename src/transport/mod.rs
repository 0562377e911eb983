//! Duplex connections to the speech services
//!
//! A [`Connector`] opens one [`Connection`] per session. Each connection is a
//! pair of channels: frames written to the [`ConnectionWriter`] go out in
//! order, frames received come back through the [`ConnectionReader`]. The
//! websocket implementation runs one I/O task per connection; the in-memory
//! variant hands the far end to the caller.

mod ws;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use ws::WsConnector;

use crate::{Error, Result};

/// Capacity of the per-connection channels
pub const CHANNEL_CAPACITY: usize = 64;

/// Where and how to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Websocket URL
    pub url: String,
    /// Extra request headers (authentication, request id)
    pub headers: Vec<(String, String)>,
}

impl Endpoint {
    /// Create an endpoint without headers
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a request header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value by name (case-insensitive)
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Outbound instruction for a connection's I/O task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Binary frame to transmit
    Frame(Vec<u8>),
    /// Close the connection gracefully
    Close,
}

/// Opens connections to a speech service
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a fresh connection
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the connection cannot be established
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection>;
}

/// An open duplex connection
pub struct Connection {
    writer: ConnectionWriter,
    reader: ConnectionReader,
}

impl Connection {
    /// Assemble a connection from its channel halves
    ///
    /// Whatever drives the far end should stop once `outbound` yields
    /// `None` or [`Outbound::Close`].
    #[must_use]
    pub const fn from_parts(
        outbound: mpsc::Sender<Outbound>,
        inbound: mpsc::Receiver<Result<Vec<u8>>>,
    ) -> Self {
        Self {
            writer: ConnectionWriter { tx: outbound },
            reader: ConnectionReader { rx: inbound },
        }
    }

    /// Create a connection whose far end is returned to the caller
    ///
    /// Used for loopback wiring and for driving sessions in tests.
    #[must_use]
    pub fn in_memory() -> (Self, RemotePeer) {
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self::from_parts(out_tx, in_rx),
            RemotePeer {
                received: out_rx,
                sender: Some(in_tx),
            },
        )
    }

    /// Split into independently owned halves
    #[must_use]
    pub fn split(self) -> (ConnectionWriter, ConnectionReader) {
        (self.writer, self.reader)
    }
}

/// Sending half of a connection
pub struct ConnectionWriter {
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionWriter {
    /// Queue a frame for transmission
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the connection is closed
    pub async fn send(&self, frame: Vec<u8>) -> Result<()> {
        self.tx
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| Error::Connection("connection closed".to_string()))
    }

    /// Whether the far end is still accepting frames
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Close the connection; the I/O task finishes in the background
    pub async fn close(self) {
        let _ = self.tx.send(Outbound::Close).await;
    }
}

/// Receiving half of a connection
pub struct ConnectionReader {
    rx: mpsc::Receiver<Result<Vec<u8>>>,
}

impl ConnectionReader {
    /// Next received message; `None` once the connection has closed
    pub async fn next(&mut self) -> Option<Result<Vec<u8>>> {
        self.rx.recv().await
    }
}

/// Far end of an in-memory connection
pub struct RemotePeer {
    received: mpsc::Receiver<Outbound>,
    sender: Option<mpsc::Sender<Result<Vec<u8>>>>,
}

impl RemotePeer {
    /// Next frame the local side transmitted; `None` after close or drop
    pub async fn recv_frame(&mut self) -> Option<Vec<u8>> {
        match self.received.recv().await? {
            Outbound::Frame(frame) => Some(frame),
            Outbound::Close => None,
        }
    }

    /// Next raw outbound instruction, including close requests
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.received.recv().await
    }

    /// Deliver a message to the local side
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the local reader is gone or the peer closed
    pub async fn send(&self, message: Vec<u8>) -> Result<()> {
        self.deliver(Ok(message)).await
    }

    /// Deliver a transport error to the local side
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the local reader is gone or the peer closed
    pub async fn fail(&self, reason: &str) -> Result<()> {
        self.deliver(Err(Error::Connection(reason.to_string()))).await
    }

    /// Close the inbound direction; the local reader sees end-of-stream
    pub fn close(&mut self) {
        self.sender = None;
    }

    async fn deliver(&self, message: Result<Vec<u8>>) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::Connection("peer closed".to_string()))?;
        sender
            .send(message)
            .await
            .map_err(|_| Error::Connection("local reader dropped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_headers() {
        let endpoint = Endpoint::new("wss://example.test/ws")
            .header("X-Api-App-Key", "app")
            .header("X-Api-Request-Id", "req-1");

        assert_eq!(endpoint.header_value("x-api-app-key"), Some("app"));
        assert_eq!(endpoint.header_value("X-Api-Request-Id"), Some("req-1"));
        assert_eq!(endpoint.header_value("missing"), None);
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let (connection, mut peer) = Connection::in_memory();
        let (writer, mut reader) = connection.split();

        writer.send(vec![1, 2, 3]).await.unwrap();
        assert_eq!(peer.recv_frame().await, Some(vec![1, 2, 3]));

        peer.send(vec![9]).await.unwrap();
        assert_eq!(reader.next().await.unwrap().unwrap(), vec![9]);

        peer.close();
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_writer_close_reaches_peer() {
        let (connection, mut peer) = Connection::in_memory();
        let (writer, _reader) = connection.split();

        writer.close().await;
        assert_eq!(peer.recv().await, Some(Outbound::Close));
    }

    #[tokio::test]
    async fn test_send_after_peer_drop_fails() {
        let (connection, peer) = Connection::in_memory();
        let (writer, _reader) = connection.split();
        drop(peer);

        assert!(!writer.is_open());
        assert!(matches!(
            writer.send(vec![0]).await,
            Err(Error::Connection(_))
        ));
    }
}
