//! Exchange price fetchers
//!
//! Each exchange implements [`SourceFetcher`]. A fetcher answers one asset
//! with [`FetchItem`]s: an entry, or a not-found value when the exchange does
//! not list the pair. Protocol violations and transport failures are errors
//! of that asset only; batch fetches report them as fatal outcomes in place.

use async_trait::async_trait;
use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::entry::{scale_price, Entry, FetchFailure, FetchItem, FetchOutcome};
use crate::error::FetchError;
use crate::http::{HttpResponse, HttpTransport};
use crate::types::{Asset, InstrumentKind};

pub mod binance_future;
pub mod cex;
pub mod coinbase;
pub mod defillama;
pub mod gecko_terminal;
pub mod okx;
pub mod okx_future;

pub use binance_future::BinanceFutureFetcher;
pub use cex::CexFetcher;
pub use coinbase::CoinbaseFetcher;
pub use defillama::DefillamaFetcher;
pub use gecko_terminal::GeckoTerminalFetcher;
pub use okx::OkxFetcher;
pub use okx_future::OkxFutureFetcher;

/// Trait for exchange price fetchers
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Upper-case exchange tag stamped on every entry
    fn source(&self) -> &'static str;

    fn kind(&self) -> InstrumentKind;

    /// Request URL for the pair `base/quote`.
    fn format_url(&self, base: &str, quote: &str) -> String;

    /// Fetch one asset.
    ///
    /// Returns a single item, except for sources that enumerate several
    /// instruments per asset, which return one entry per instrument.
    async fn fetch_pair(
        &self,
        asset: &Asset,
        http: &dyn HttpTransport,
    ) -> Result<Vec<FetchItem>, FetchError>;

    /// Whether `asset` is handled by this fetcher.
    fn accepts(&self, asset: &Asset) -> bool {
        if asset.kind == self.kind() {
            true
        } else {
            tracing::debug!(
                source = self.source(),
                pair = %asset.pair,
                "Skipping {} asset for {} fetcher",
                asset.kind,
                self.kind()
            );
            false
        }
    }

    /// Fetch all matching assets concurrently, outcomes in input order.
    ///
    /// A fatal failure for one asset is reported in that asset's position and
    /// does not discard the others.
    async fn fetch(&self, assets: &[Asset], http: &dyn HttpTransport) -> Vec<FetchOutcome> {
        let accepted: Vec<&Asset> = assets.iter().filter(|asset| self.accepts(asset)).collect();
        let pending: Vec<_> = accepted
            .iter()
            .map(|asset| self.fetch_pair(*asset, http))
            .collect();

        accepted
            .iter()
            .zip(join_all(pending).await)
            .flat_map(|(asset, result)| FetchOutcome::from_result(self.source(), &asset.pair, result))
            .collect()
    }

    /// Fetch all matching assets one request at a time.
    async fn fetch_sync(&self, assets: &[Asset], http: &dyn HttpTransport) -> Vec<FetchOutcome> {
        let mut outcomes = Vec::new();
        for asset in assets.iter().filter(|asset| self.accepts(asset)) {
            let result = self.fetch_pair(asset, http).await;
            outcomes.extend(FetchOutcome::from_result(self.source(), &asset.pair, result));
        }
        outcomes
    }
}

/// Run [`SourceFetcher::fetch_sync`] from synchronous code.
///
/// Spins up a current-thread runtime; must not be called from within an
/// async context. Fails only when the runtime cannot be started.
pub fn fetch_blocking(
    fetcher: &dyn SourceFetcher,
    assets: &[Asset],
    http: &dyn HttpTransport,
) -> Result<Vec<FetchOutcome>, FetchError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            FetchError::transport(fetcher.source(), format!("failed to start runtime: {}", e))
        })?;
    Ok(runtime.block_on(fetcher.fetch_sync(assets, http)))
}

/// Standard not-found item for `asset`.
pub(crate) fn not_found(asset: &Asset, source: &str) -> FetchItem {
    let failure = FetchFailure::not_found(&asset.pair, source);
    tracing::debug!(source = %source, pair = %asset.pair, "{}", failure);
    FetchItem::NotFound(failure)
}

/// Decode a 200 response, rejecting other statuses as protocol errors.
///
/// Callers check for 404 first.
pub(crate) fn decode_json(response: &HttpResponse, source: &str) -> Result<Value, FetchError> {
    if !(200..300).contains(&response.status) {
        return Err(FetchError::unexpected_protocol(
            source,
            format!("unexpected status {}", response.status),
        ));
    }
    response.decode(source)
}

/// Decimal from a JSON string or number.
pub(crate) fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .ok(),
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        _ => None,
    }
}

/// Unsigned integer from a JSON string or number.
pub(crate) fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Volume from a JSON string or number, 0 when absent or malformed.
pub(crate) fn parse_volume(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Required decimal field of a response object.
pub(crate) fn decimal_field(value: &Value, key: &str, source: &str) -> Result<Decimal, FetchError> {
    value.get(key).and_then(parse_decimal).ok_or_else(|| {
        FetchError::unexpected_protocol(source, format!("missing or invalid field '{}'", key))
    })
}

/// Required integer field of a response object.
pub(crate) fn u64_field(value: &Value, key: &str, source: &str) -> Result<u64, FetchError> {
    value.get(key).and_then(parse_u64).ok_or_else(|| {
        FetchError::unexpected_protocol(source, format!("missing or invalid field '{}'", key))
    })
}

pub(crate) fn millis_to_secs(millis: u64) -> u64 {
    millis / 1000
}

pub(crate) fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Build an entry from an observed price, scaling it to the asset's decimals.
pub(crate) fn build_entry(
    asset: &Asset,
    price: Decimal,
    timestamp: u64,
    source: &str,
    publisher: &str,
) -> Result<Entry, FetchError> {
    let pair = asset.pair.symbol();
    let scaled = scale_price(price, asset.decimals).ok_or_else(|| {
        FetchError::normalization(
            source,
            &pair,
            format!("price {} cannot be scaled to {} decimals", price, asset.decimals),
        )
    })?;
    let entry = Entry::new(asset, scaled, timestamp, source, publisher)
        .map_err(|e| FetchError::normalization(source, &pair, e.to_string()))?;
    tracing::info!(source = %source, pair = %pair, price = %price, "Fetched price");
    Ok(entry)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StaticTransport;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use serde_json::json;

    #[test]
    fn test_parse_decimal_accepts_strings_and_numbers() {
        assert_eq!(parse_decimal(&json!("42000.12")), Some(dec!(42000.12)));
        assert_eq!(parse_decimal(&json!(42000.12)), Some(dec!(42000.12)));
        assert_eq!(parse_decimal(&json!("1e-5")), Some(dec!(0.00001)));
        assert_eq!(parse_decimal(&json!(null)), None);
    }

    #[test]
    fn test_parse_u64_accepts_strings_and_numbers() {
        assert_eq!(parse_u64(&json!("1701432000")), Some(1_701_432_000));
        assert_eq!(parse_u64(&json!(1_701_432_000u64)), Some(1_701_432_000));
        assert_eq!(parse_u64(&json!(-1)), None);
    }

    #[test]
    fn test_build_entry_scales_exactly() {
        let asset = Asset::spot("BTC", "USD", 8);
        let entry = build_entry(&asset, dec!(42000.12), 1, "CEX", "PUB").unwrap();
        assert_eq!(entry.price, 4_200_012_000_000);
    }

    fn cex_ticker(last: &str) -> serde_json::Value {
        json!({ "timestamp": "1701432000", "last": last, "volume": "1" })
    }

    fn spot_assets() -> Vec<Asset> {
        vec![
            Asset::spot("BTC", "USD", 8),
            Asset::spot("ETH", "USD", 8),
            Asset::spot("SOL", "USD", 8),
        ]
    }

    /// BTC and SOL answer normally, ETH answers with an HTML page.
    fn mixed_transport(fetcher: &CexFetcher) -> StaticTransport {
        StaticTransport::new()
            .with_json(fetcher.format_url("BTC", "USD"), &cex_ticker("42000"))
            .with_response(
                fetcher.format_url("ETH", "USD"),
                HttpResponse {
                    status: 200,
                    content_type: Some(String::from("text/html")),
                    body: String::from("<html>maintenance</html>"),
                },
            )
            .with_json(fetcher.format_url("SOL", "USD"), &cex_ticker("60"))
    }

    fn assert_fatal_in_place(outcomes: &[FetchOutcome]) {
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].entry().map(|e| e.pair.base.as_str()), Some("BTC"));
        assert!(matches!(
            &outcomes[1],
            FetchOutcome::Fatal { source, pair, error: FetchError::UnexpectedProtocol { .. } }
                if source == "CEX" && pair.base == "ETH"
        ));
        assert_eq!(outcomes[2].entry().map(|e| e.pair.base.as_str()), Some("SOL"));
    }

    #[tokio::test]
    async fn test_fetch_keeps_siblings_of_a_fatal_asset() {
        let fetcher = CexFetcher::new("PUB");
        let http = mixed_transport(&fetcher);
        assert_fatal_in_place(&fetcher.fetch(&spot_assets(), &http).await);
    }

    #[tokio::test]
    async fn test_fetch_sync_keeps_siblings_of_a_fatal_asset() {
        let fetcher = CexFetcher::new("PUB");
        let http = mixed_transport(&fetcher);
        assert_fatal_in_place(&fetcher.fetch_sync(&spot_assets(), &http).await);
    }

    #[test]
    fn test_fetch_blocking_keeps_siblings_of_a_fatal_asset() {
        let fetcher = CexFetcher::new("PUB");
        let http = mixed_transport(&fetcher);
        assert_fatal_in_place(&fetch_blocking(&fetcher, &spot_assets(), &http).unwrap());
    }

    #[tokio::test]
    async fn test_fetch_returns_input_order_not_completion_order() {
        let fetcher = CexFetcher::new("PUB");
        let http = StaticTransport::new()
            .with_json(fetcher.format_url("BTC", "USD"), &cex_ticker("42000"))
            .with_delay(fetcher.format_url("BTC", "USD"), Duration::from_millis(80))
            .with_json(fetcher.format_url("ETH", "USD"), &cex_ticker("2250"))
            .with_delay(fetcher.format_url("ETH", "USD"), Duration::from_millis(40))
            .with_json(fetcher.format_url("SOL", "USD"), &cex_ticker("60"));

        let outcomes = fetcher.fetch(&spot_assets(), &http).await;

        // every request is issued before the slow BTC one completes
        assert_eq!(
            http.requests(),
            vec![
                fetcher.format_url("BTC", "USD"),
                fetcher.format_url("ETH", "USD"),
                fetcher.format_url("SOL", "USD"),
            ]
        );
        let bases: Vec<_> = outcomes
            .iter()
            .filter_map(FetchOutcome::entry)
            .map(|e| e.pair.base.as_str())
            .collect();
        assert_eq!(bases, vec!["BTC", "ETH", "SOL"]);
    }

    #[test]
    fn test_fetch_blocking_skips_other_kinds() {
        let fetcher = CexFetcher::new("PUB");
        let assets = vec![Asset::future("BTC", "USD", 8)];
        let items = fetch_blocking(&fetcher, &assets, &StaticTransport::new()).unwrap();
        assert!(items.is_empty());
    }
}
