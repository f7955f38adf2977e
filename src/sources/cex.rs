//! CEX.IO spot ticker

use async_trait::async_trait;

use crate::entry::FetchItem;
use crate::error::FetchError;
use crate::http::{self, HttpRequest, HttpTransport};
use crate::sources::{
    build_entry, decimal_field, decode_json, not_found, parse_volume, u64_field, SourceFetcher,
};
use crate::types::{Asset, InstrumentKind};

const CEX_TICKER_URL: &str = "https://cex.io/api/ticker";
const SOURCE: &str = "CEX";
const UNKNOWN_PAIR: &str = "Invalid Symbols Pair";

#[derive(Debug, Clone)]
pub struct CexFetcher {
    base_url: String,
    publisher: String,
}

impl CexFetcher {
    pub fn new(publisher: &str) -> Self {
        Self {
            base_url: CEX_TICKER_URL.to_string(),
            publisher: publisher.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SourceFetcher for CexFetcher {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Spot
    }

    fn format_url(&self, base: &str, quote: &str) -> String {
        format!("{}/{}/{}", self.base_url, base, quote)
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
        if body.get("error").and_then(|e| e.as_str()) == Some(UNKNOWN_PAIR) {
            return Ok(vec![not_found(asset, SOURCE)]);
        }

        let price = decimal_field(&body, "last", SOURCE)?;
        let timestamp = u64_field(&body, "timestamp", SOURCE)?;
        let volume = parse_volume(body.get("volume"));

        let entry = build_entry(asset, price, timestamp, SOURCE, &self.publisher)?.with_volume(volume);
        Ok(vec![FetchItem::Entry(entry)])
    }
}
