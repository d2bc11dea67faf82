//! WebSocket session for the Xeggex streaming API.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::constants::WS_URL;
use crate::errors::{MarketDataError, Result};

/// Process-wide counter for subscription request ids.
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> u64 {
    REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// One WebSocket connection to the exchange.
///
/// Each listener loop owns its own session; sessions are never shared, so
/// one channel's failure cannot stall another.
pub struct WsSession {
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WsSession {
    /// Establish the socket against the default endpoint.
    pub async fn connect() -> Result<Self> {
        Self::connect_to(WS_URL).await
    }

    /// Establish the socket against `url` (tests, alternate gateways).
    pub async fn connect_to(url: &str) -> Result<Self> {
        let url = url::Url::parse(url).map_err(|e| MarketDataError::Connect {
            message: format!("invalid WebSocket URL: {e}"),
        })?;
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| MarketDataError::Connect {
                message: e.to_string(),
            })?;
        Ok(Self {
            stream: Some(stream),
        })
    }

    /// Send a subscription request for one channel/symbol. Server acks, if
    /// any, arrive as ordinary messages on the stream.
    pub async fn subscribe(&mut self, channel: &str, symbol: &str) -> Result<()> {
        let request = subscription_request(channel, symbol, next_request_id());
        self.send(&request).await
    }

    async fn send(&mut self, payload: &Value) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.send(Message::Text(payload.to_string())).await?;
        Ok(())
    }

    /// Next decoded server message. `Ok(None)` means the server closed the
    /// connection; any error means the connection is unusable and the
    /// owning loop should rebuild it from scratch.
    pub async fn next_message(&mut self) -> Result<Option<Value>> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        while let Some(frame) = stream.next().await {
            match frame? {
                Message::Text(text) => {
                    let message: Value = serde_json::from_str(&text)?;
                    return Ok(Some(message));
                }
                Message::Ping(data) => stream.send(Message::Pong(data)).await?,
                Message::Close(frame) => {
                    debug!(?frame, "server closed WebSocket");
                    return Ok(None);
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Close and drop the connection. Safe to call on an already
    /// disconnected session.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}

fn not_connected() -> MarketDataError {
    MarketDataError::Connect {
        message: "not connected".to_string(),
    }
}

/// JSON-RPC subscription request for `subscribe{channel}`.
fn subscription_request(channel: &str, symbol: &str, id: u64) -> Value {
    json!({
        "method": format!("subscribe{channel}"),
        "params": { "symbol": symbol },
        "id": id,
    })
}
