//! DefiLlama coin prices, keyed by CoinGecko id
//!
//! Only USD quotes are available.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::entry::{FetchFailure, FetchItem};
use crate::error::FetchError;
use crate::http::{self, HttpRequest, HttpTransport};
use crate::sources::{build_entry, decimal_field, decode_json, not_found, u64_field, SourceFetcher};
use crate::types::{Asset, InstrumentKind};

const DEFILLAMA_PRICES_URL: &str = "https://coins.llama.fi/prices/current";
const SOURCE: &str = "DEFILLAMA";

/// Base symbol to CoinGecko id
const COINGECKO_IDS: &[(&str, &str)] = &[
    ("ETH", "ethereum"),
    ("BTC", "bitcoin"),
    ("WBTC", "wrapped-bitcoin"),
    ("SOL", "solana"),
    ("AVAX", "avalanche-2"),
    ("DOGE", "dogecoin"),
    ("SHIB", "shiba-inu"),
    ("TEMP", "tempus"),
    ("DAI", "dai"),
    ("USDT", "tether"),
    ("USDC", "usd-coin"),
    ("TUSD", "true-usd"),
    ("BUSD", "binance-usd"),
    ("BNB", "binancecoin"),
    ("ADA", "cardano"),
    ("XRP", "ripple"),
    ("MATIC", "matic-network"),
    ("AAVE", "aave"),
    ("R", "r"),
    ("LORDS", "lords"),
    ("WSTETH", "wrapped-steth"),
];

#[derive(Debug, Clone)]
pub struct DefillamaFetcher {
    base_url: String,
    publisher: String,
    ids: HashMap<String, String>,
}

impl DefillamaFetcher {
    pub fn new(publisher: &str) -> Self {
        Self {
            base_url: DEFILLAMA_PRICES_URL.to_string(),
            publisher: publisher.to_string(),
            ids: COINGECKO_IDS
                .iter()
                .map(|(symbol, id)| (symbol.to_string(), id.to_string()))
                .collect(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Add or replace the CoinGecko id used for `symbol`.
    pub fn with_coingecko_id(mut self, symbol: &str, id: &str) -> Self {
        self.ids.insert(symbol.to_uppercase(), id.to_string());
        self
    }

    pub fn coingecko_id(&self, symbol: &str) -> Option<&str> {
        self.ids.get(&symbol.to_uppercase()).map(String::as_str)
    }
}

#[async_trait]
impl SourceFetcher for DefillamaFetcher {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Spot
    }

    /// Unmapped symbols fall back to their lower-case name.
    fn format_url(&self, base: &str, _quote: &str) -> String {
        let id = self
            .coingecko_id(base)
            .map(str::to_string)
            .unwrap_or_else(|| base.to_lowercase());
        format!("{}/coingecko:{}?searchWidth=5m", self.base_url, id)
    }

    async fn fetch_pair(
        &self,
        asset: &Asset,
        http: &dyn HttpTransport,
    ) -> Result<Vec<FetchItem>, FetchError> {
        let Some(id) = self.coingecko_id(&asset.pair.base) else {
            return Ok(vec![FetchItem::NotFound(FetchFailure::new(format!(
                "Unknown price pair, do not know how to query {} for {}",
                SOURCE, asset.pair.base
            )))]);
        };
        if asset.pair.quote != "USD" {
            return Ok(vec![FetchItem::NotFound(FetchFailure::new(format!(
                "{} only supports USD quotes, cannot price {}",
                SOURCE, asset.pair
            )))]);
        }

        let url = self.format_url(&asset.pair.base, &asset.pair.quote);
        let request = HttpRequest::get(url).with_header("Accepts", "application/json");
        let response = http::fetch(http, SOURCE, request).await?;
        if response.is_not_found() {
            return Ok(vec![not_found(asset, SOURCE)]);
        }

        let body = decode_json(&response, SOURCE)?;
        let coins = body
            .get("coins")
            .and_then(|c| c.as_object())
            .ok_or_else(|| FetchError::unexpected_protocol(SOURCE, "missing 'coins' object"))?;
        if coins.is_empty() {
            return Ok(vec![not_found(asset, SOURCE)]);
        }

        let key = format!("coingecko:{}", id);
        let coin = coins.get(&key).ok_or_else(|| {
            FetchError::unexpected_protocol(SOURCE, format!("response lacks '{}'", key))
        })?;
        let price = decimal_field(coin, "price", SOURCE)?;
        let timestamp = u64_field(coin, "timestamp", SOURCE)?;

        let entry = build_entry(asset, price, timestamp, SOURCE, &self.publisher)?;
        Ok(vec![FetchItem::Entry(entry)])
    }
}
