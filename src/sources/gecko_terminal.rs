//! GeckoTerminal token prices, keyed by (network, token address)

use async_trait::async_trait;
use std::collections::HashMap;

use crate::entry::{FetchFailure, FetchItem};
use crate::error::FetchError;
use crate::http::{self, HttpRequest, HttpTransport};
use crate::sources::{
    build_entry, decimal_field, decode_json, not_found, now_secs, parse_volume, SourceFetcher,
};
use crate::types::{Asset, InstrumentKind};

const GECKO_TERMINAL_URL: &str = "https://api.geckoterminal.com/api/v2/networks";
const SOURCE: &str = "GECKOTERMINAL";

const TOKEN_ADDRESSES: &[(&str, &str, &str)] = &[
    (
        "LORDS",
        "starknet-alpha",
        "0x124aeb495b947201f5fac96fd1138e326ad86195b98df6dec9009158a533b49",
    ),
    ("R", "eth", "0x183015a9ba6ff60230fdeadc3f43b3d788b13e21"),
    ("WBTC", "eth", "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599"),
    ("BTC", "eth", "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599"),
    ("WSTETH", "eth", "0x7f39c581f595b53c5cb19bd0b3f8da6c935e2ca0"),
    ("ETH", "eth", "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
];

/// Network and contract address of a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLocation {
    pub network: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct GeckoTerminalFetcher {
    base_url: String,
    publisher: String,
    tokens: HashMap<String, TokenLocation>,
}

impl GeckoTerminalFetcher {
    pub fn new(publisher: &str) -> Self {
        Self {
            base_url: GECKO_TERMINAL_URL.to_string(),
            publisher: publisher.to_string(),
            tokens: TOKEN_ADDRESSES
                .iter()
                .map(|(symbol, network, address)| {
                    (
                        symbol.to_string(),
                        TokenLocation {
                            network: network.to_string(),
                            address: address.to_string(),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token(mut self, symbol: &str, network: &str, address: &str) -> Self {
        self.tokens.insert(
            symbol.to_uppercase(),
            TokenLocation {
                network: network.to_string(),
                address: address.to_string(),
            },
        );
        self
    }

    pub fn token(&self, symbol: &str) -> Option<&TokenLocation> {
        self.tokens.get(&symbol.to_uppercase())
    }
}

#[async_trait]
impl SourceFetcher for GeckoTerminalFetcher {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Spot
    }

    /// Unmapped symbols produce a URL without a token address.
    fn format_url(&self, base: &str, _quote: &str) -> String {
        match self.token(base) {
            Some(token) => format!(
                "{}/{}/tokens/{}",
                self.base_url, token.network, token.address
            ),
            None => format!("{}/eth/tokens/{}", self.base_url, base.to_lowercase()),
        }
    }

    async fn fetch_pair(
        &self,
        asset: &Asset,
        http: &dyn HttpTransport,
    ) -> Result<Vec<FetchItem>, FetchError> {
        if self.token(&asset.pair.base).is_none() {
            return Ok(vec![FetchItem::NotFound(FetchFailure::new(format!(
                "Unknown price pair, do not know how to query {} for {}",
                SOURCE, asset.pair.base
            )))]);
        }
        if asset.pair.quote != "USD" {
            return Ok(vec![FetchItem::NotFound(FetchFailure::new(format!(
                "{} only supports USD quotes, cannot price {}",
                SOURCE, asset.pair
            )))]);
        }

        let url = self.format_url(&asset.pair.base, &asset.pair.quote);
        let response = http::fetch(http, SOURCE, HttpRequest::get(url)).await?;
        if response.is_not_found() {
            return Ok(vec![not_found(asset, SOURCE)]);
        }

        let body = decode_json(&response, SOURCE)?;
        let error_title = body
            .get("errors")
            .and_then(|e| e.get(0))
            .and_then(|e| e.get("title"))
            .and_then(|t| t.as_str());
        if error_title == Some("Not Found") {
            return Ok(vec![not_found(asset, SOURCE)]);
        }

        let attributes = body
            .get("data")
            .and_then(|d| d.get("attributes"))
            .ok_or_else(|| FetchError::unexpected_protocol(SOURCE, "missing 'data.attributes'"))?;
        let price = decimal_field(attributes, "price_usd", SOURCE)?;
        let volume = parse_volume(attributes.get("volume_usd").and_then(|v| v.get("h24")));

        let entry = build_entry(asset, price, now_secs(), SOURCE, &self.publisher)?.with_volume(volume);
        Ok(vec![FetchItem::Entry(entry)])
    }
}
