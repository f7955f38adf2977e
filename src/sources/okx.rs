//! OKX perpetual swap ticker, published as spot

use async_trait::async_trait;
use serde_json::Value;

use crate::entry::FetchItem;
use crate::error::FetchError;
use crate::http::{self, HttpRequest, HttpTransport};
use crate::sources::{
    build_entry, decimal_field, decode_json, millis_to_secs, not_found, parse_volume, u64_field,
    SourceFetcher,
};
use crate::types::{Asset, InstrumentKind};

const OKX_TICKER_URL: &str = "https://okx.com/api/v5/market/ticker";
const SOURCE: &str = "OKX";

/// Whether an OKX envelope reports an unknown instrument.
pub(crate) fn is_unknown_instrument(body: &Value) -> bool {
    body.get("code").and_then(|c| c.as_str()) == Some("51001")
        || body.get("msg").and_then(|m| m.as_str()) == Some("Instrument ID does not exist")
}

#[derive(Debug, Clone)]
pub struct OkxFetcher {
    base_url: String,
    publisher: String,
}

impl OkxFetcher {
    pub fn new(publisher: &str) -> Self {
        Self {
            base_url: OKX_TICKER_URL.to_string(),
            publisher: publisher.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SourceFetcher for OkxFetcher {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Spot
    }

    fn format_url(&self, base: &str, quote: &str) -> String {
        format!("{}?instId={}-{}-SWAP", self.base_url, base, quote)
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
        if is_unknown_instrument(&body) {
            return Ok(vec![not_found(asset, SOURCE)]);
        }

        let Some(ticker) = body.get("data").and_then(|d| d.get(0)) else {
            return Ok(vec![not_found(asset, SOURCE)]);
        };
        let price = decimal_field(ticker, "last", SOURCE)?;
        let timestamp = millis_to_secs(u64_field(ticker, "ts", SOURCE)?);
        let volume = parse_volume(ticker.get("volCcy24h"));

        let entry = build_entry(asset, price, timestamp, SOURCE, &self.publisher)?.with_volume(volume);
        Ok(vec![FetchItem::Entry(entry)])
    }
}
