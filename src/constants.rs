//! Xeggex API constants.

use std::time::Duration;

pub const EXCHANGE_NAME: &str = "xeggex";

/// REST API v2 base URL.
pub const REST_URL: &str = "https://api.xeggex.com/api/v2";

/// WebSocket endpoint.
pub const WS_URL: &str = "wss://ws.xeggex.com";

/// Per-request timeout applied to every REST call.
pub const API_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Retries after the initial attempt before a REST call gives up.
pub const API_MAX_RETRIES: u32 = 4;

/// Depth requested for REST order book snapshots.
pub const SNAPSHOT_DEPTH: u32 = 150;

/// REST endpoint paths, relative to [`REST_URL`].
pub mod endpoint {
    /// Full instrument listing (bulk symbol metadata).
    pub const SYMBOL: &str = "market/getlist";
    /// Bulk ticker covering every market.
    pub const TICKER: &str = "tickers";
    /// Single-market ticker; append the exchange symbol with `/` replaced by `_`.
    pub const TICKER_SINGLE: &str = "ticker";
    /// Order book snapshot; takes `depth` and `ticker_id` parameters.
    pub const ORDER_BOOK: &str = "orderbook";
}

/// WebSocket channel names; the outgoing method is `subscribe{channel}`.
pub mod ws_channel {
    pub const TRADES: &str = "Trades";
    pub const ORDERS: &str = "Orderbook";
}

/// Method tags on inbound WebSocket notifications.
pub mod ws_method {
    pub const TRADES_UPDATE: &str = "updateTrades";
    pub const ORDERS_SNAPSHOT: &str = "snapshotOrderbook";
    pub const ORDERS_UPDATE: &str = "updateOrderbook";
}
