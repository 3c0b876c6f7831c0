use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use url::Url;

use crate::error::{Error, Result};
use crate::types::{InboundEnvelope, OutboundEnvelope};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens live channels.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Open a channel to `url`.
    ///
    /// The returned channel has completed its transport handshake but has
    /// not yet received the backend's welcome.
    async fn connect(&self, url: &Url) -> Result<Box<dyn LiveChannel>>;
}

/// A persistent, bidirectional, message-oriented channel.
#[async_trait]
pub trait LiveChannel: Send {
    /// Send one envelope.
    async fn send(&mut self, envelope: &OutboundEnvelope) -> Result<()>;

    /// Receive the next envelope.
    ///
    /// Returns `None` once the channel is closed.  A frame that cannot be
    /// decoded yields a protocol error; the channel stays usable.
    async fn recv(&mut self) -> Option<Result<InboundEnvelope>>;

    /// Close the channel.  Errors are swallowed.
    async fn close(&mut self);
}

#[cfg(test)]
impl std::fmt::Debug for dyn LiveChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn LiveChannel")
    }
}

//////////////////////////////////////////// WebSocket /////////////////////////////////////////////

/// [`LiveConnector`] over WebSocket.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LiveConnector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn LiveChannel>> {
        let (stream, response) = connect_async(url.as_str()).await.map_err(|err| {
            Error::connect_failure(
                format!("WebSocket connect to {url} failed: {err}"),
                Some(Box::new(err)),
            )
        })?;
        tracing::debug!(%url, status = %response.status(), "websocket opened");
        let (sink, stream) = stream.split();
        Ok(Box::new(WebSocketChannel { sink, stream }))
    }
}

/// A WebSocket carrying JSON envelopes in text frames.
pub struct WebSocketChannel {
    sink: SplitSink<WsStream, tungstenite::Message>,
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl LiveChannel for WebSocketChannel {
    async fn send(&mut self, envelope: &OutboundEnvelope) -> Result<()> {
        let text = serde_json::to_string(envelope)?;
        self.sink
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|err| {
                Error::backend_unreachable(
                    format!("live send failed: {err}"),
                    None,
                    Some(Box::new(err)),
                )
            })
    }

    async fn recv(&mut self) -> Option<Result<InboundEnvelope>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(err) => {
                    return Some(Err(Error::backend_unreachable(
                        format!("live channel failed: {err}"),
                        None,
                        Some(Box::new(err)),
                    )));
                }
            };
            match message {
                tungstenite::Message::Text(text) => {
                    return Some(decode(text.as_str()));
                }
                tungstenite::Message::Close(frame) => {
                    if let Some(frame) = frame {
                        tracing::debug!(code = %frame.code, reason = %frame.reason, "websocket closed");
                    }
                    return None;
                }
                tungstenite::Message::Binary(_) => {
                    return Some(Err(Error::protocol("unexpected binary frame")));
                }
                _ => continue,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.sink.close().await {
            tracing::debug!(error = %err, "websocket close failed");
        }
    }
}

fn decode(text: &str) -> Result<InboundEnvelope> {
    serde_json::from_str(text).map_err(|err| Error::protocol(format!("malformed envelope: {err}")))
}
