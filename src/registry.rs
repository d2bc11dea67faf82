//! Bidirectional symbol registry, lazily initialized once per process.

use std::collections::HashMap;

use reqwest::Method;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::info;

use crate::constants::endpoint;
use crate::errors::{MarketDataError, Result};
use crate::rest::RestClient;
use crate::types::TradingPair;

/// Forward and inverse maps, built together so lookups in either direction
/// stay O(1) as the instrument count grows.
#[derive(Debug, Default)]
struct SymbolMap {
    by_symbol: HashMap<String, TradingPair>,
    by_pair: HashMap<TradingPair, String>,
}

/// One instrument entry from the exchange listing.
#[derive(Debug, Deserialize)]
struct MarketEntry {
    symbol: String,
    #[serde(rename = "primaryAsset")]
    primary_asset: AssetEntry,
    #[serde(rename = "secondaryAsset")]
    secondary_asset: AssetEntry,
}

#[derive(Debug, Deserialize)]
struct AssetEntry {
    ticker: String,
}

/// Mapping between exchange-native symbols and canonical trading pairs.
///
/// The instrument listing is fetched at most once per process lifetime;
/// concurrent first users share a single in-flight fetch and all observe
/// the same fully-populated map.
pub struct SymbolRegistry {
    rest: RestClient,
    map: OnceCell<SymbolMap>,
}

impl SymbolRegistry {
    pub fn new(rest: RestClient) -> Self {
        Self {
            rest,
            map: OnceCell::new(),
        }
    }

    /// Registry over a prebuilt symbol map, skipping the exchange fetch.
    pub fn with_map(entries: impl IntoIterator<Item = (String, TradingPair)>) -> Self {
        let mut map = SymbolMap::default();
        for (symbol, pair) in entries {
            map.by_pair.insert(pair.clone(), symbol.clone());
            map.by_symbol.insert(symbol, pair);
        }
        Self {
            rest: RestClient::new(),
            map: OnceCell::new_with(Some(map)),
        }
    }

    /// Fetch the instrument listing and build both maps atomically.
    /// Idempotent under concurrent first use.
    pub async fn initialize(&self) -> Result<()> {
        self.map().await.map(|_| ())
    }

    async fn map(&self) -> Result<&SymbolMap> {
        self.map
            .get_or_try_init(|| async {
                let listing = self
                    .rest
                    .call(Method::GET, endpoint::SYMBOL, None)
                    .await
                    .map_err(|e| MarketDataError::RegistryUnavailable(e.to_string()))?;
                let entries: Vec<MarketEntry> = serde_json::from_value(listing)?;
                let mut map = SymbolMap::default();
                for entry in entries {
                    let pair = TradingPair::new(format!(
                        "{}-{}",
                        entry.primary_asset.ticker, entry.secondary_asset.ticker
                    ));
                    map.by_pair.insert(pair.clone(), entry.symbol.clone());
                    map.by_symbol.insert(entry.symbol, pair);
                }
                info!(markets = map.by_symbol.len(), "symbol registry initialized");
                Ok(map)
            })
            .await
    }

    /// Exchange symbol for `pair`, lazily initializing the map on first use.
    pub async fn symbol_for(&self, pair: &TradingPair) -> Result<String> {
        self.map()
            .await?
            .by_pair
            .get(pair)
            .cloned()
            .ok_or_else(|| MarketDataError::UnknownPair(pair.clone()))
    }

    /// Trading pair for `symbol`. Never triggers initialization: symbols
    /// are discovered server-side, not guessed.
    pub fn pair_for(&self, symbol: &str) -> Result<TradingPair> {
        self.map
            .get()
            .and_then(|map| map.by_symbol.get(symbol))
            .cloned()
            .ok_or_else(|| MarketDataError::UnknownSymbol(symbol.to_string()))
    }

    /// Every trading pair known to the exchange.
    pub async fn trading_pairs(&self) -> Result<Vec<TradingPair>> {
        Ok(self.map().await?.by_pair.keys().cloned().collect())
    }
}
