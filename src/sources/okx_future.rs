//! OKX dated futures: one entry per listed contract of the underlying

use async_trait::async_trait;
use serde_json::Value;

use crate::entry::FetchItem;
use crate::error::FetchError;
use crate::http::{self, HttpRequest, HttpTransport};
use crate::sources::okx::is_unknown_instrument;
use crate::sources::{
    build_entry, decimal_field, decode_json, millis_to_secs, not_found, parse_u64, parse_volume,
    u64_field, SourceFetcher,
};
use crate::types::{Asset, InstrumentKind};

const OKX_TICKERS_URL: &str = "https://okx.com/api/v5/market/tickers";
const OKX_INSTRUMENTS_URL: &str = "https://www.okx.com/api/v5/public/instruments";
const SOURCE: &str = "OKX";

#[derive(Debug, Clone)]
pub struct OkxFutureFetcher {
    base_url: String,
    instruments_url: String,
    publisher: String,
}

impl OkxFutureFetcher {
    pub fn new(publisher: &str) -> Self {
        Self {
            base_url: OKX_TICKERS_URL.to_string(),
            instruments_url: OKX_INSTRUMENTS_URL.to_string(),
            publisher: publisher.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_instruments_url(mut self, instruments_url: impl Into<String>) -> Self {
        self.instruments_url = instruments_url.into();
        self
    }

    pub fn format_expiry_url(&self, inst_id: &str) -> String {
        format!("{}?instType=FUTURES&instId={}", self.instruments_url, inst_id)
    }

    /// Contract expiry in seconds, 0 when the instrument is unknown.
    async fn fetch_expiry(&self, inst_id: &str, http: &dyn HttpTransport) -> Result<u64, FetchError> {
        let request = HttpRequest::get(self.format_expiry_url(inst_id));
        let response = http::fetch(http, SOURCE, request).await?;
        if response.is_not_found() {
            tracing::warn!(source = SOURCE, inst_id = %inst_id, "Instrument not found, expiry set to 0");
            return Ok(0);
        }
        let body = decode_json(&response, SOURCE)?;
        if is_unknown_instrument(&body) {
            tracing::warn!(source = SOURCE, inst_id = %inst_id, "Instrument not found, expiry set to 0");
            return Ok(0);
        }

        let expiry_ms = body
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|i| i.get("expTime"))
            .and_then(parse_u64)
            .ok_or_else(|| {
                FetchError::unexpected_protocol(SOURCE, format!("no expTime for {}", inst_id))
            })?;
        Ok(millis_to_secs(expiry_ms))
    }

    async fn build_item(
        &self,
        asset: &Asset,
        ticker: &Value,
        http: &dyn HttpTransport,
    ) -> Result<FetchItem, FetchError> {
        let inst_id = ticker
            .get("instId")
            .and_then(|i| i.as_str())
            .ok_or_else(|| FetchError::unexpected_protocol(SOURCE, "ticker without instId"))?;
        let price = decimal_field(ticker, "last", SOURCE)?;
        let timestamp = millis_to_secs(u64_field(ticker, "ts", SOURCE)?);
        let volume = parse_volume(ticker.get("volCcy24h"));
        let expiry = self.fetch_expiry(inst_id, http).await?;

        let entry = build_entry(asset, price, timestamp, SOURCE, &self.publisher)?
            .with_volume(volume)
            .with_expiry(expiry);
        Ok(FetchItem::Entry(entry))
    }
}

#[async_trait]
impl SourceFetcher for OkxFutureFetcher {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Future
    }

    fn format_url(&self, base: &str, quote: &str) -> String {
        format!("{}?instType=FUTURES&uly={}-{}", self.base_url, base, quote)
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

        let tickers = match body.get("data").and_then(|d| d.as_array()) {
            Some(tickers) if !tickers.is_empty() => tickers,
            _ => return Ok(vec![not_found(asset, SOURCE)]),
        };

        let mut items = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            items.push(self.build_item(asset, ticker, http).await?);
        }
        Ok(items)
    }
}
