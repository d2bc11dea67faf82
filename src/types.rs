//! Canonical data types shared across the crate.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Engine-facing trading pair identifier, `BASE-QUOTE` with uppercase
/// tickers. Stable for the process lifetime once registered.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair(String);

impl TradingPair {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(base, quote)` tickers; `None` when the identifier is
    /// not in `BASE-QUOTE` form.
    pub fn split(&self) -> Option<(&str, &str)> {
        self.0.split_once('-')
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an [`OrderBookUpdate`] carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateKind {
    Snapshot,
    Diff,
    Trade,
}

/// Normalized update record handed to the downstream book structure.
/// Immutable once constructed.
#[derive(Clone, Debug)]
pub struct OrderBookUpdate {
    pub kind: UpdateKind,
    pub trading_pair: TradingPair,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    /// Raw exchange payload with normalization metadata merged in.
    pub payload: Value,
}

/// One price level used for snapshot bootstrap. Rows derived from the same
/// snapshot share one `update_id`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrderBookRow {
    pub price: f64,
    pub quantity: f64,
    pub update_id: u64,
}

/// Consumer contract for the external order book structure: a snapshot is
/// applied as one full replacement.
pub trait OrderBookSink {
    fn apply_snapshot(&mut self, bids: Vec<OrderBookRow>, asks: Vec<OrderBookRow>, update_id: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trading_pair_is_uppercased() {
        let pair = TradingPair::new("btc-usdt");
        assert_eq!(pair.as_str(), "BTC-USDT");
    }

    #[test]
    fn trading_pair_splits_into_tickers() {
        let pair = TradingPair::new("ETH-BTC");
        assert_eq!(pair.split(), Some(("ETH", "BTC")));
        assert_eq!(TradingPair::new("BROKEN").split(), None);
    }
}
