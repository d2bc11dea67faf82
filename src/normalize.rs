//! Pure conversions from raw exchange payloads to canonical updates.
//!
//! No I/O, no retries: every function here takes an already-decoded JSON
//! payload and tags it for the downstream book structure.

use chrono::DateTime;
use serde_json::{json, Value};

use crate::errors::{MarketDataError, Result};
use crate::types::{OrderBookUpdate, TradingPair, UpdateKind};

/// Wrap `raw` as a full order book snapshot for `pair`.
pub fn snapshot_from(raw: Value, timestamp: i64, pair: &TradingPair) -> OrderBookUpdate {
    tagged(UpdateKind::Snapshot, raw, timestamp, pair)
}

/// Wrap `raw` as an incremental order book diff for `pair`.
pub fn diff_from(raw: Value, timestamp: i64, pair: &TradingPair) -> OrderBookUpdate {
    tagged(UpdateKind::Diff, raw, timestamp, pair)
}

/// Remap exchange trade fields into the canonical trade shape and wrap it:
/// `id` becomes `exchange_order_id`, `side` becomes `trade_type`,
/// `quantity` becomes `amount`; `price` passes through.
pub fn trade_from(raw: Value, timestamp: i64, pair: &TradingPair) -> OrderBookUpdate {
    let mut payload = raw;
    if let Some(map) = payload.as_object_mut() {
        let remapped = [
            ("exchange_order_id", map.get("id").cloned()),
            ("trade_type", map.get("side").cloned()),
            ("amount", map.get("quantity").cloned()),
        ];
        for (key, value) in remapped {
            map.insert(key.to_string(), value.unwrap_or(Value::Null));
        }
    }
    tagged(UpdateKind::Trade, payload, timestamp, pair)
}

/// Parse an ISO-8601 exchange timestamp into unix seconds.
pub fn timestamp_from_str(date: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(date)
        .map(|dt| dt.timestamp())
        .map_err(|e| MarketDataError::Protocol {
            message: format!("bad timestamp {date:?}: {e}"),
        })
}

/// Merge normalization metadata into the payload before tagging it.
/// Metadata wins on key collision.
fn tagged(kind: UpdateKind, mut payload: Value, timestamp: i64, pair: &TradingPair) -> OrderBookUpdate {
    if let Some(map) = payload.as_object_mut() {
        map.insert("trading_pair".to_string(), json!(pair.as_str()));
    }
    OrderBookUpdate {
        kind,
        trading_pair: pair.clone(),
        timestamp,
        payload,
    }
}
