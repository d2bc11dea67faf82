//! Error taxonomy for the market data subsystem.

use serde_json::Value;
use thiserror::Error;

use crate::types::TradingPair;

pub type Result<T> = std::result::Result<T, MarketDataError>;

#[derive(Debug, Error)]
pub enum MarketDataError {
    /// WebSocket handshake or connection establishment failed.
    #[error("connection failed: {message}")]
    Connect { message: String },

    /// The transport dropped mid-conversation (socket error, timeout).
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// A payload could not be decoded or had an unexpected shape.
    #[error("protocol failure: {message}")]
    Protocol { message: String },

    /// The exchange answered the HTTP call but reported an application-level
    /// error inside the body.
    #[error("exchange error: {payload}")]
    Exchange { payload: Value },

    /// A REST call failed after exhausting all retries. Carries the last
    /// observed HTTP status and body for diagnostics.
    #[error("API call failed (status {status:?}): {payload}")]
    Api { status: Option<u16>, payload: Value },

    /// No exchange symbol is registered for this trading pair. Indicates a
    /// caller referencing an unlisted pair, not a transient condition.
    #[error("no symbol mapping for trading pair {0}")]
    UnknownPair(TradingPair),

    /// No trading pair is registered for this exchange symbol.
    #[error("no trading pair mapping for exchange symbol {0}")]
    UnknownSymbol(String),

    /// The instrument listing could not be fetched.
    #[error("symbol registry unavailable: {0}")]
    RegistryUnavailable(String),
}

impl MarketDataError {
    /// Whether a listener loop may recover by tearing the connection down
    /// and rebuilding it. [`MarketDataError::UnknownPair`] is excluded: it
    /// is a configuration bug and retrying cannot fix it.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::UnknownPair(_))
    }
}

impl From<reqwest::Error> for MarketDataError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for MarketDataError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol {
            message: err.to_string(),
        }
    }
}
