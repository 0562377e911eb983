//! Websocket connector (tokio-tungstenite)

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;

use super::{CHANNEL_CAPACITY, Connection, Connector, Endpoint, Outbound};
use crate::{Error, Result};

/// Default websocket handshake timeout
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens websocket connections, one I/O task per connection
#[derive(Debug, Clone)]
pub struct WsConnector {
    handshake_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_TIMEOUT)
    }
}

impl WsConnector {
    /// Create a connector with a custom handshake timeout
    #[must_use]
    pub const fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection> {
        let mut request = endpoint
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Connection(format!("invalid websocket request: {e}")))?;

        for (name, value) in &endpoint.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Connection(format!("invalid header name {name}: {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| Error::Connection(format!("invalid header value for {name}: {e}")))?;
            request.headers_mut().insert(header_name, header_value);
        }

        tracing::debug!(url = %endpoint.url, "opening websocket");

        let (stream, response) = tokio::time::timeout(self.handshake_timeout, connect_async(request))
            .await
            .map_err(|_| Error::Connection("websocket handshake timed out".to_string()))?
            .map_err(|e| {
                tracing::error!(url = %endpoint.url, error = %e, "websocket connect failed");
                Error::Connection(e.to_string())
            })?;

        tracing::debug!(status = %response.status(), "websocket connected");

        let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<Result<Vec<u8>>>(CHANNEL_CAPACITY);
        let (mut sink, mut source) = stream.split();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = out_rx.recv() => {
                        match outbound {
                            Some(Outbound::Frame(frame)) => {
                                if let Err(e) = sink.send(Message::Binary(frame.into())).await {
                                    tracing::warn!(error = %e, "websocket send failed");
                                    let _ = in_tx.send(Err(Error::from(e))).await;
                                    break;
                                }
                            }
                            Some(Outbound::Close) | None => {
                                let _ = sink.send(Message::Close(None)).await;
                                break;
                            }
                        }
                    }
                    inbound = source.next() => {
                        match inbound {
                            Some(Ok(Message::Binary(data))) => {
                                if in_tx.send(Ok(data.to_vec())).await.is_err() {
                                    break;
                                }
                            }
                            // Error envelopes sometimes arrive as text frames
                            Some(Ok(Message::Text(text))) => {
                                if in_tx.send(Ok(text.as_str().as_bytes().to_vec())).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                tracing::debug!(?frame, "websocket closed by server");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "websocket receive failed");
                                let _ = in_tx.send(Err(Error::from(e))).await;
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            tracing::debug!("websocket task finished");
        });

        Ok(Connection::from_parts(out_tx, in_rx))
    }
}
