//! Live order book and trade stream synchronization for the Xeggex
//! exchange.
//!
//! Keeps a downstream trading engine supplied with normalized snapshot,
//! diff and trade updates from two independently failing transports: a
//! push WebSocket stream and a polled REST fallback. Exchange-native
//! symbols are resolved against canonical `BASE-QUOTE` pairs through a
//! process-wide registry initialized once from the instrument listing.

pub mod constants;
pub mod errors;
pub mod normalize;
pub mod pipeline;
pub mod registry;
pub mod rest;
pub mod types;
pub mod websocket;

pub use errors::{MarketDataError, Result};
pub use pipeline::BookDataSource;
pub use registry::SymbolRegistry;
pub use rest::RestClient;
pub use types::{OrderBookRow, OrderBookSink, OrderBookUpdate, TradingPair, UpdateKind};
pub use websocket::WsSession;
