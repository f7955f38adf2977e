//! Binance USD-M futures: mark prices for the perpetual and every dated
//! contract of a pair, joined with 24h volume

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use std::collections::HashMap;

use crate::entry::FetchItem;
use crate::error::FetchError;
use crate::http::{self, HttpRequest, HttpTransport};
use crate::sources::{
    build_entry, decimal_field, decode_json, millis_to_secs, not_found, parse_volume, u64_field,
    SourceFetcher,
};
use crate::types::{Asset, InstrumentKind};

const BINANCE_FAPI_URL: &str = "https://fapi.binance.com/fapi/v1";
const SOURCE: &str = "BINANCE";

/// Hour (UTC) at which Binance quarterly contracts settle
const SETTLEMENT_HOUR: u32 = 8;

/// Expiry in seconds encoded in a futures symbol.
///
/// `BTCUSDT` (the perpetual) yields 0; `BTCUSDT_231229` yields
/// 2023-12-29T08:00:00Z. Returns `None` for suffixes that are not `YYMMDD`.
pub fn parse_expiry_suffix(symbol: &str, selection: &str) -> Option<u64> {
    if symbol == selection {
        return Some(0);
    }
    let suffix = symbol.strip_prefix(selection)?.strip_prefix('_')?;
    let date = NaiveDate::parse_from_str(suffix, "%y%m%d").ok()?;
    let settlement = date.and_time(NaiveTime::from_hms_opt(SETTLEMENT_HOUR, 0, 0)?);
    u64::try_from(settlement.and_utc().timestamp()).ok()
}

fn matches_selection(symbol: &str, selection: &str) -> bool {
    symbol == selection
        || symbol
            .strip_prefix(selection)
            .map(|rest| rest.starts_with('_'))
            .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct BinanceFutureFetcher {
    base_url: String,
    publisher: String,
}

impl BinanceFutureFetcher {
    pub fn new(publisher: &str) -> Self {
        Self {
            base_url: BINANCE_FAPI_URL.to_string(),
            publisher: publisher.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn format_volume_url(&self) -> String {
        format!("{}/ticker/24hr", self.base_url)
    }

    /// 24h volume per symbol; empty when the endpoint is not found.
    async fn fetch_volumes(
        &self,
        http: &dyn HttpTransport,
    ) -> Result<HashMap<String, f64>, FetchError> {
        let response = http::fetch(http, SOURCE, HttpRequest::get(self.format_volume_url())).await?;
        if response.is_not_found() {
            tracing::warn!(source = SOURCE, "Volume endpoint not found, using zero volume");
            return Ok(HashMap::new());
        }
        let body = decode_json(&response, SOURCE)?;
        let tickers = body
            .as_array()
            .ok_or_else(|| FetchError::unexpected_protocol(SOURCE, "24hr ticker is not a list"))?;

        Ok(tickers
            .iter()
            .filter_map(|t| {
                let symbol = t.get("symbol")?.as_str()?;
                Some((symbol.to_string(), parse_volume(t.get("volume"))))
            })
            .collect())
    }
}

#[async_trait]
impl SourceFetcher for BinanceFutureFetcher {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Future
    }

    /// Mark prices of every contract; the pair is selected client-side.
    fn format_url(&self, _base: &str, _quote: &str) -> String {
        format!("{}/premiumIndex", self.base_url)
    }

    async fn fetch_pair(
        &self,
        asset: &Asset,
        http: &dyn HttpTransport,
    ) -> Result<Vec<FetchItem>, FetchError> {
        let url = self.format_url(&asset.pair.base, &asset.pair.quote);
        let response = http::fetch(http, SOURCE, HttpRequest::get(url)).await?;
        if response.is_not_found() {
            return Ok(vec![not_found(asset, SOURCE)]);
        }
        let body = decode_json(&response, SOURCE)?;
        let contracts = body
            .as_array()
            .ok_or_else(|| FetchError::unexpected_protocol(SOURCE, "premium index is not a list"))?;

        let selection = format!("{}{}", asset.pair.base, asset.pair.quote);
        let matching: Vec<(&str, &Value)> = contracts
            .iter()
            .filter_map(|c| Some((c.get("symbol")?.as_str()?, c)))
            .filter(|(symbol, _)| matches_selection(symbol, &selection))
            .collect();
        if matching.is_empty() {
            return Ok(vec![not_found(asset, SOURCE)]);
        }

        let volumes = self.fetch_volumes(http).await?;

        let mut items = Vec::with_capacity(matching.len());
        for (symbol, contract) in matching {
            let expiry = parse_expiry_suffix(symbol, &selection).ok_or_else(|| {
                FetchError::normalization(
                    SOURCE,
                    &asset.pair.symbol(),
                    format!("cannot parse expiry of {}", symbol),
                )
            })?;
            let price = decimal_field(contract, "markPrice", SOURCE)?;
            let timestamp = millis_to_secs(u64_field(contract, "time", SOURCE)?);
            let volume = volumes.get(symbol).copied().unwrap_or(0.0);

            let entry = build_entry(asset, price, timestamp, SOURCE, &self.publisher)?
                .with_volume(volume)
                .with_expiry(expiry);
            items.push(FetchItem::Entry(entry));
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StaticTransport;
    use crate::sources::test_support::entries;
    use serde_json::json;

    fn premium_index() -> Value {
        json!([
            { "symbol": "BTCUSDT", "markPrice": "42000.12", "time": 1_701_432_000_500u64 },
            { "symbol": "BTCUSDT_231229", "markPrice": "42500.00", "time": 1_701_432_000_500u64 },
            { "symbol": "ETHUSDT", "markPrice": "2250.00", "time": 1_701_432_000_500u64 },
            { "symbol": "BTCUSD", "markPrice": "1.0", "time": 1_701_432_000_500u64 }
        ])
    }

    #[test]
    fn test_parse_expiry_suffix() {
        assert_eq!(parse_expiry_suffix("BTCUSD", "BTCUSD"), Some(0));
        assert_eq!(parse_expiry_suffix("BTCUSD_231229", "BTCUSD"), Some(1_703_836_800));
        assert_eq!(parse_expiry_suffix("BTCUSD_PERP", "BTCUSD"), None);
    }

    #[test]
    fn test_selection_does_not_match_longer_quote() {
        assert!(matches_selection("BTCUSD_231229", "BTCUSD"));
        assert!(!matches_selection("BTCUSDT", "BTCUSD"));
    }

    #[tokio::test]
    async fn test_binance_returns_every_contract_with_volume() {
        let f = BinanceFutureFetcher::new("PRAGMA");
        let http = StaticTransport::new()
            .with_json(f.format_url("BTC", "USDT"), &premium_index())
            .with_json(
                f.format_volume_url(),
                &json!([
                    { "symbol": "BTCUSDT", "volume": "1200.5" },
                    { "symbol": "ETHUSDT", "volume": "9000" }
                ]),
            );

        let items = f.fetch_pair(&Asset::future("BTC", "USDT", 6), &http).await.unwrap();
        let entries = entries(&items);
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].expiry_timestamp(), 0);
        assert_eq!(entries[0].price, 42_000_120_000);
        assert_eq!(entries[0].volume, 1200.5);
        assert_eq!(entries[0].timestamp, 1_701_432_000);

        assert_eq!(entries[1].expiry_timestamp(), 1_703_836_800);
        assert_eq!(entries[1].volume, 0.0);
    }

    #[tokio::test]
    async fn test_binance_volume_not_found_degrades_to_zero() {
        let f = BinanceFutureFetcher::new("PRAGMA");
        let http = StaticTransport::new()
            .with_json(f.format_url("ETH", "USDT"), &premium_index())
            .with_status(f.format_volume_url(), 404);

        let items = f.fetch_pair(&Asset::future("ETH", "USDT", 6), &http).await.unwrap();
        let entries = entries(&items);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].volume, 0.0);
    }

    #[tokio::test]
    async fn test_binance_unlisted_pair_is_single_not_found() {
        let f = BinanceFutureFetcher::new("PRAGMA");
        let http = StaticTransport::new().with_json(f.format_url("SOL", "USDT"), &premium_index());

        let items = f.fetch_pair(&Asset::future("SOL", "USDT", 6), &http).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_not_found());
    }
}
