//! Synchronization pipeline: three supervised listener loops feeding one
//! output channel, plus one-shot snapshot bootstrap helpers.
//!
//! Each loop runs as its own tokio task, reconnects from scratch on any
//! recoverable error, and honors cancellation at every suspension point.
//! The hourly REST poller exists because the push channel alone is not
//! trusted to be gap-free: missed-diff drift self-heals within one hour.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::constants::{endpoint, ws_channel, ws_method, SNAPSHOT_DEPTH};
use crate::errors::{MarketDataError, Result};
use crate::normalize::{diff_from, snapshot_from, timestamp_from_str, trade_from};
use crate::registry::SymbolRegistry;
use crate::rest::RestClient;
use crate::types::{OrderBookRow, OrderBookSink, OrderBookUpdate, TradingPair};
use crate::websocket::WsSession;

/// Backoff after a trade stream failure.
const TRADE_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Backoff after a diff stream failure. Book desync is more costly than a
/// missed trade, so this path reconnects more conservatively.
const DIFF_RETRY_DELAY: Duration = Duration::from_secs(30);
/// Pause between per-pair snapshot fetches to respect REST rate limits.
const SNAPSHOT_PAIR_DELAY: Duration = Duration::from_secs(5);

/// Order book and trade stream synchronizer for a fixed set of pairs.
///
/// Pairs are supplied once at construction; there is no runtime add or
/// remove. Producers never block on the unbounded output channel, and
/// ordering within one listener's stream is preserved.
pub struct BookDataSource {
    trading_pairs: Vec<TradingPair>,
    registry: Arc<SymbolRegistry>,
    rest: RestClient,
    output: UnboundedSender<OrderBookUpdate>,
    cancel: CancellationToken,
}

impl BookDataSource {
    pub fn new(
        trading_pairs: Vec<TradingPair>,
        registry: Arc<SymbolRegistry>,
        rest: RestClient,
        output: UnboundedSender<OrderBookUpdate>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            trading_pairs,
            registry,
            rest,
            output,
            cancel,
        }
    }

    /// REST order book snapshot for `pair`. An exchange-reported error in
    /// the body surfaces as [`MarketDataError::Exchange`].
    pub async fn order_book_snapshot(&self, pair: &TradingPair) -> Result<Value> {
        let symbol = self.registry.symbol_for(pair).await?;
        let params = [
            ("depth", SNAPSHOT_DEPTH.to_string()),
            ("ticker_id", symbol),
        ];
        let snapshot = self
            .rest
            .call(Method::GET, endpoint::ORDER_BOOK, Some(&params))
            .await?;
        if snapshot.get("error").is_some() {
            return Err(MarketDataError::Exchange { payload: snapshot });
        }
        Ok(snapshot)
    }

    /// Fetch a fresh snapshot and apply it to `sink` as one full
    /// replacement. All rows share the snapshot update id; the returned
    /// record is stamped with capture time, unlike the fallback poller
    /// which keeps the exchange-provided timestamp.
    pub async fn bootstrap(
        &self,
        pair: &TradingPair,
        sink: &mut dyn OrderBookSink,
    ) -> Result<OrderBookUpdate> {
        let snapshot = self.order_book_snapshot(pair).await?;
        let timestamp = Utc::now().timestamp();
        let update_id = snapshot
            .get("sequence")
            .and_then(Value::as_u64)
            .unwrap_or(timestamp as u64);
        let bids = levels(&snapshot, "bids", update_id)?;
        let asks = levels(&snapshot, "asks", update_id)?;
        sink.apply_snapshot(bids, asks, update_id);
        Ok(snapshot_from(snapshot, timestamp, pair))
    }

    /// Last traded price per pair: one bulk ticker call when more than one
    /// pair is requested, the single-market endpoint otherwise.
    pub async fn last_traded_prices(
        &self,
        pairs: &[TradingPair],
    ) -> Result<HashMap<TradingPair, f64>> {
        let bulk = if pairs.len() > 1 {
            Some(self.rest.call(Method::GET, endpoint::TICKER, None).await?)
        } else {
            None
        };

        let mut prices = HashMap::new();
        for pair in pairs {
            let symbol = self.registry.symbol_for(pair).await?;
            let ticker = match &bulk {
                Some(tickers) => tickers
                    .as_array()
                    .and_then(|list| {
                        list.iter().find(|t| {
                            t.get("symbol").and_then(Value::as_str) == Some(symbol.as_str())
                        })
                    })
                    .cloned()
                    .ok_or_else(|| MarketDataError::Protocol {
                        message: format!("no ticker entry for {symbol}"),
                    })?,
                None => {
                    let path = format!("{}/{}", endpoint::TICKER_SINGLE, symbol.replace('/', "_"));
                    self.rest.call(Method::GET, &path, None).await?
                }
            };
            let price = decimal_field(&ticker, "last_price")?;
            prices.insert(pair.clone(), price);
        }
        Ok(prices)
    }

    /// Stream trades over WebSocket, reconnecting on any recoverable error.
    /// Returns `Ok(())` on cancellation, `Err` only for non-recoverable
    /// errors such as an unlisted trading pair.
    pub async fn listen_for_trades(&self) -> Result<()> {
        loop {
            let mut session = None;
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => None,
                result = self.run_trade_session(&mut session) => Some(result),
            };
            disconnect(&mut session).await;
            let Some(result) = outcome else {
                return Ok(());
            };
            match result {
                Ok(()) => debug!("trade stream closed by server, reconnecting"),
                Err(e) if e.is_recoverable() => {
                    error!(
                        error = %e,
                        "trade stream failed, reconnecting in {}s",
                        TRADE_RETRY_DELAY.as_secs()
                    );
                }
                Err(e) => return Err(e),
            }
            if self.pause(TRADE_RETRY_DELAY).await.is_none() {
                return Ok(());
            }
        }
    }

    /// Stream order book snapshots and diffs over WebSocket. Failures here
    /// are logged as network-health warnings and retried on a longer delay
    /// than the trade path.
    pub async fn listen_for_book_diffs(&self) -> Result<()> {
        loop {
            let mut session = None;
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => None,
                result = self.run_diff_session(&mut session) => Some(result),
            };
            disconnect(&mut session).await;
            let Some(result) = outcome else {
                return Ok(());
            };
            match result {
                Ok(()) => debug!("order book stream closed by server, reconnecting"),
                Err(e) if e.is_recoverable() => {
                    warn!(
                        error = %e,
                        "order book stream failed, reconnecting in {}s; check network connection",
                        DIFF_RETRY_DELAY.as_secs()
                    );
                }
                Err(e) => return Err(e),
            }
            if self.pause(DIFF_RETRY_DELAY).await.is_none() {
                return Ok(());
            }
        }
    }

    /// Hourly REST fallback: re-snapshot every configured pair, then sleep
    /// until the top of the next clock hour. Resynchronization here is
    /// independent of diff-stream correctness.
    pub async fn listen_for_snapshots(&self) -> Result<()> {
        loop {
            self.poll_snapshots_once().await?;
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            if self.pause(until_next_hour()).await.is_none() {
                return Ok(());
            }
        }
    }

    /// One polling cycle over every configured pair. A failed fetch for one
    /// pair is logged and does not abort the rest of the cycle. Cancellation
    /// interrupts an in-flight fetch, including its retry backoff sleeps.
    pub async fn poll_snapshots_once(&self) -> Result<()> {
        for pair in &self.trading_pairs {
            let fetched = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                result = self.poll_snapshot(pair) => result,
            };
            match fetched {
                Ok(update) => {
                    debug!(pair = %pair, "saved order book snapshot");
                    self.push(update);
                }
                Err(e) if e.is_recoverable() => {
                    warn!(
                        pair = %pair,
                        error = %e,
                        "snapshot fetch failed, continuing with next pair in {}s",
                        SNAPSHOT_PAIR_DELAY.as_secs()
                    );
                }
                Err(e) => return Err(e),
            }
            if self.pause(SNAPSHOT_PAIR_DELAY).await.is_none() {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn run_trade_session(&self, slot: &mut Option<WsSession>) -> Result<()> {
        let session = slot.insert(WsSession::connect().await?);
        for pair in &self.trading_pairs {
            let symbol = self.registry.symbol_for(pair).await?;
            session.subscribe(ws_channel::TRADES, &symbol).await?;
        }
        while let Some(message) = session.next_message().await? {
            for update in self.trade_updates(&message)? {
                self.push(update);
            }
        }
        Ok(())
    }

    async fn run_diff_session(&self, slot: &mut Option<WsSession>) -> Result<()> {
        let session = slot.insert(WsSession::connect().await?);
        for pair in &self.trading_pairs {
            let symbol = self.registry.symbol_for(pair).await?;
            session.subscribe(ws_channel::ORDERS, &symbol).await?;
        }
        while let Some(message) = session.next_message().await? {
            if let Some(update) = self.book_update(&message)? {
                self.push(update);
            }
        }
        Ok(())
    }

    /// Normalized trade updates carried by one server message; empty for
    /// anything that is not a trade notification (acks, other methods).
    fn trade_updates(&self, message: &Value) -> Result<Vec<OrderBookUpdate>> {
        let method = message.get("method").and_then(Value::as_str);
        let params = message.get("params");
        let (Some(method), Some(params)) = (method, params) else {
            return Ok(Vec::new());
        };
        if method != ws_method::TRADES_UPDATE {
            return Ok(Vec::new());
        }

        let symbol = params
            .get("symbol")
            .and_then(Value::as_str)
            .ok_or_else(|| protocol("trade update without symbol"))?;
        let pair = self.registry.pair_for(symbol)?;
        let trades = params
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| protocol("trade update without data"))?;

        let mut updates = Vec::with_capacity(trades.len());
        for trade in trades {
            let date = trade
                .get("timestamp")
                .and_then(Value::as_str)
                .ok_or_else(|| protocol("trade without timestamp"))?;
            let timestamp = timestamp_from_str(date)?;
            updates.push(trade_from(trade.clone(), timestamp, &pair));
        }
        Ok(updates)
    }

    /// Normalized book update for one server message, when it is a snapshot
    /// or diff notification.
    fn book_update(&self, message: &Value) -> Result<Option<OrderBookUpdate>> {
        let method = message.get("method").and_then(Value::as_str);
        let params = message.get("params");
        let (Some(method), Some(params)) = (method, params) else {
            return Ok(None);
        };
        let build: fn(Value, i64, &TradingPair) -> OrderBookUpdate = match method {
            m if m == ws_method::ORDERS_SNAPSHOT => snapshot_from,
            m if m == ws_method::ORDERS_UPDATE => diff_from,
            _ => return Ok(None),
        };

        let symbol = params
            .get("symbol")
            .and_then(Value::as_str)
            .ok_or_else(|| protocol("book update without symbol"))?;
        let pair = self.registry.pair_for(symbol)?;
        let date = params
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| protocol("book update without timestamp"))?;
        let timestamp = timestamp_from_str(date)?;
        Ok(Some(build(params.clone(), timestamp, &pair)))
    }

    async fn poll_snapshot(&self, pair: &TradingPair) -> Result<OrderBookUpdate> {
        let snapshot = self.order_book_snapshot(pair).await?;
        // The fallback path keeps the exchange-provided timestamp; only the
        // one-shot bootstrap stamps capture time.
        let timestamp = snapshot
            .get("timestamp")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| Utc::now().timestamp());
        Ok(snapshot_from(snapshot, timestamp, pair))
    }

    fn push(&self, update: OrderBookUpdate) {
        // A dropped receiver means shutdown is already in progress.
        let _ = self.output.send(update);
    }

    /// Sleep for `delay`, or return `None` immediately on cancellation.
    async fn pause(&self, delay: Duration) -> Option<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            _ = tokio::time::sleep(delay) => Some(()),
        }
    }
}

async fn disconnect(slot: &mut Option<WsSession>) {
    if let Some(mut session) = slot.take() {
        session.disconnect().await;
    }
}

fn protocol(message: &str) -> MarketDataError {
    MarketDataError::Protocol {
        message: message.to_string(),
    }
}

/// Price levels of one snapshot side as bootstrap rows.
fn levels(snapshot: &Value, side: &str, update_id: u64) -> Result<Vec<OrderBookRow>> {
    let rows = snapshot
        .get(side)
        .and_then(Value::as_array)
        .ok_or_else(|| protocol(&format!("snapshot missing {side}")))?;
    rows.iter()
        .map(|row| {
            Ok(OrderBookRow {
                price: level_field(row, 0)?,
                quantity: level_field(row, 1)?,
                update_id,
            })
        })
        .collect()
}

fn level_field(row: &Value, index: usize) -> Result<f64> {
    let field = row
        .get(index)
        .ok_or_else(|| protocol("level row too short"))?;
    match field {
        Value::String(text) => text
            .parse()
            .map_err(|_| protocol(&format!("bad level value {text:?}"))),
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| protocol("bad numeric level value")),
        _ => Err(protocol("level value is neither string nor number")),
    }
}

fn decimal_field(payload: &Value, key: &str) -> Result<f64> {
    match payload.get(key) {
        Some(Value::String(text)) => text
            .parse()
            .map_err(|_| protocol(&format!("bad {key} value {text:?}"))),
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| protocol(&format!("bad numeric {key} value"))),
        _ => Err(protocol(&format!("missing {key}"))),
    }
}

/// Duration until the top of the next clock hour.
fn until_next_hour() -> Duration {
    let now = Utc::now();
    let this_hour = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let next_hour = this_hour + chrono::Duration::hours(1);
    (next_hour - now).to_std().unwrap_or(Duration::ZERO)
}
