//! Coinbase exchange rates
//!
//! Coinbase quotes how much of every currency one unit of the quote buys, so
//! the price of `base` is the inverse of its rate.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

use crate::entry::FetchItem;
use crate::error::FetchError;
use crate::http::{self, HttpRequest, HttpTransport};
use crate::sources::{build_entry, decode_json, not_found, now_secs, SourceFetcher};
use crate::types::{Asset, InstrumentKind};

const COINBASE_RATES_URL: &str = "https://api.coinbase.com/v2/exchange-rates?currency=";
const SOURCE: &str = "COINBASE";

#[derive(Debug, Clone, Deserialize)]
struct RatesResponse {
    data: RatesData,
}

#[derive(Debug, Clone, Deserialize)]
struct RatesData {
    #[allow(dead_code)]
    currency: Option<String>,
    rates: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CoinbaseFetcher {
    base_url: String,
    publisher: String,
}

impl CoinbaseFetcher {
    pub fn new(publisher: &str) -> Self {
        Self {
            base_url: COINBASE_RATES_URL.to_string(),
            publisher: publisher.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SourceFetcher for CoinbaseFetcher {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Spot
    }

    fn format_url(&self, _base: &str, quote: &str) -> String {
        format!("{}{}", self.base_url, quote)
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
        let body: RatesResponse = serde_json::from_value(decode_json(&response, SOURCE)?)
            .map_err(|e| FetchError::unexpected_protocol(SOURCE, format!("invalid response body: {}", e)))?;

        let Some(rate) = body.data.rates.get(&asset.pair.base) else {
            return Ok(vec![not_found(asset, SOURCE)]);
        };
        let rate = Decimal::from_str(rate)
            .or_else(|_| Decimal::from_scientific(rate))
            .map_err(|e| {
                FetchError::unexpected_protocol(SOURCE, format!("invalid rate '{}': {}", rate, e))
            })?;
        let price = Decimal::ONE.checked_div(rate).ok_or_else(|| {
            FetchError::normalization(SOURCE, &asset.pair.symbol(), format!("cannot invert rate {}", rate))
        })?;

        let entry = build_entry(asset, price, now_secs(), SOURCE, &self.publisher)?;
        Ok(vec![FetchItem::Entry(entry)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, StaticTransport};
    use crate::sources::test_support::only_entry;
    use serde_json::json;

    #[tokio::test]
    async fn test_coinbase_inverts_rate() {
        let f = CoinbaseFetcher::new("PRAGMA");
        let http = StaticTransport::new().with_json(
            f.format_url("ETH", "USD"),
            &json!({ "data": { "currency": "USD", "rates": { "ETH": "0.0005", "BTC": "0.000025" } } }),
        );

        let items = f.fetch_pair(&Asset::spot("ETH", "USD", 8), &http).await.unwrap();
        let entry = only_entry(&items);
        assert_eq!(entry.price, 200_000_000_000);
        assert_eq!(entry.volume, 0.0);
    }

    #[tokio::test]
    async fn test_coinbase_missing_symbol_is_not_found() {
        let f = CoinbaseFetcher::new("PRAGMA");
        let http = StaticTransport::new().with_json(
            f.format_url("FOO", "USD"),
            &json!({ "data": { "currency": "USD", "rates": { "ETH": "0.0005" } } }),
        );

        let items = f.fetch_pair(&Asset::spot("FOO", "USD", 8), &http).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_not_found());
    }

    #[tokio::test]
    async fn test_coinbase_server_error_is_unexpected_status() {
        let f = CoinbaseFetcher::new("PRAGMA");
        let http = StaticTransport::new().with_response(
            f.format_url("ETH", "USD"),
            HttpResponse {
                status: 503,
                content_type: Some(String::from("application/json")),
                body: json!({ "errors": [{ "id": "service_unavailable" }] }).to_string(),
            },
        );

        let result = f.fetch_pair(&Asset::spot("ETH", "USD", 8), &http).await;
        assert!(matches!(
            result,
            Err(FetchError::UnexpectedProtocol { message, .. }) if message == "unexpected status 503"
        ));
    }

    #[tokio::test]
    async fn test_coinbase_zero_rate_fails_normalization() {
        let f = CoinbaseFetcher::new("PRAGMA");
        let http = StaticTransport::new().with_json(
            f.format_url("ETH", "USD"),
            &json!({ "data": { "currency": "USD", "rates": { "ETH": "0" } } }),
        );

        let result = f.fetch_pair(&Asset::spot("ETH", "USD", 8), &http).await;
        assert!(matches!(result, Err(FetchError::Normalization { .. })));
    }
}
