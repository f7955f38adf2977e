//! Fetch and publish pipeline tests

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use oracle_feeder::entry::{FetchFailure, FetchOutcome};
    use oracle_feeder::http::StaticTransport;
    use oracle_feeder::oracle::{
        CheckpointPublisher, DryRunOracle, EntryPublisher, OracleQueryClient, RecordedCall,
    };
    use oracle_feeder::orchestrator::{FetchMode, FetchOrchestrator};
    use oracle_feeder::sources::{
        fetch_blocking, BinanceFutureFetcher, CexFetcher, CoinbaseFetcher, DefillamaFetcher,
        GeckoTerminalFetcher, OkxFetcher, OkxFutureFetcher, SourceFetcher,
    };
    use oracle_feeder::types::{AggregationMode, Asset, InstrumentKind};
    use serde_json::json;

    fn all_fetchers() -> Vec<Box<dyn SourceFetcher>> {
        vec![
            Box::new(CexFetcher::new("PRAGMA")),
            Box::new(CoinbaseFetcher::new("PRAGMA")),
            Box::new(DefillamaFetcher::new("PRAGMA")),
            Box::new(GeckoTerminalFetcher::new("PRAGMA")),
            Box::new(OkxFetcher::new("PRAGMA")),
            Box::new(BinanceFutureFetcher::new("PRAGMA")),
            Box::new(OkxFutureFetcher::new("PRAGMA")),
        ]
    }

    // ============================================================================
    // Fetchers
    // ============================================================================

    #[tokio::test]
    async fn test_not_found_for_every_source() {
        for fetcher in all_fetchers() {
            let asset = match fetcher.kind() {
                InstrumentKind::Spot => Asset::spot("BTC", "USD", 8),
                InstrumentKind::Future => Asset::future("BTC", "USD", 8),
            };
            let http = StaticTransport::new().with_status(fetcher.format_url("BTC", "USD"), 404);

            let outcomes = fetcher.fetch(&[asset.clone()], &http).await;

            let expected = FetchOutcome::NotFound {
                source: fetcher.source().to_string(),
                pair: asset.pair,
                failure: FetchFailure::new(format!(
                    "No data found for BTC/USD from {}",
                    fetcher.source()
                )),
            };
            assert_eq!(outcomes, vec![expected], "{}", fetcher.source());
        }
    }

    #[tokio::test]
    async fn test_spot_fetcher_ignores_future_assets() {
        let fetcher = CexFetcher::new("PRAGMA");
        let assets = vec![
            Asset::spot("BTC", "USD", 8),
            Asset::future("BTC", "USD", 8),
            Asset::spot("ETH", "USD", 8),
            Asset::future("ETH", "USD", 8),
        ];
        let http = StaticTransport::new()
            .with_json(
                fetcher.format_url("BTC", "USD"),
                &json!({ "timestamp": "1701432000", "last": "42000.12" }),
            )
            .with_json(
                fetcher.format_url("ETH", "USD"),
                &json!({ "timestamp": "1701432000", "last": "2250" }),
            );

        let outcomes = fetcher.fetch(&assets, &http).await;
        let pairs: Vec<_> = outcomes
            .iter()
            .filter_map(FetchOutcome::entry)
            .map(|e| e.pair.symbol())
            .collect();
        assert_eq!(pairs, vec!["BTC/USD", "ETH/USD"]);
        assert_eq!(http.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_sync_issues_requests_in_order() {
        let fetcher = OkxFetcher::new("PRAGMA");
        let assets = vec![Asset::spot("ETH", "USD", 8), Asset::spot("BTC", "USD", 8)];
        let http = StaticTransport::new()
            .with_status(fetcher.format_url("ETH", "USD"), 404)
            .with_status(fetcher.format_url("BTC", "USD"), 404);

        let outcomes = fetcher.fetch_sync(&assets, &http).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(FetchOutcome::is_not_found));
        assert_eq!(
            http.requests(),
            vec![
                fetcher.format_url("ETH", "USD"),
                fetcher.format_url("BTC", "USD")
            ]
        );
    }

    #[test]
    fn test_fetch_blocking_from_sync_code() {
        let fetcher = OkxFetcher::new("PRAGMA");
        let http = StaticTransport::new().with_json(
            fetcher.format_url("BTC", "USD"),
            &json!({ "code": "0", "msg": "", "data": [{ "last": "42000.12", "ts": "1701432000000" }] }),
        );

        let outcomes = fetch_blocking(&fetcher, &[Asset::spot("BTC", "USD", 8)], &http).unwrap();
        assert_eq!(outcomes[0].entry().map(|e| e.price), Some(4_200_012_000_000));
    }

    // ============================================================================
    // End to end with the dry-run oracle
    // ============================================================================

    #[tokio::test]
    async fn test_round_publishes_spot_then_future_pages() {
        let okx = OkxFetcher::new("PRAGMA");
        let binance = BinanceFutureFetcher::new("PRAGMA");
        let http = StaticTransport::new()
            .with_json(
                okx.format_url("BTC", "USD"),
                &json!({ "code": "0", "msg": "", "data": [{ "last": "42000.12", "ts": "1701432000000" }] }),
            )
            .with_status(okx.format_url("ETH", "USD"), 404)
            .with_json(
                binance.format_url("BTC", "USDT"),
                &json!([
                    { "symbol": "BTCUSDT", "markPrice": "42010.5", "time": 1_701_432_000_000u64 },
                    { "symbol": "BTCUSDT_231229", "markPrice": "42500", "time": 1_701_432_000_000u64 }
                ]),
            )
            .with_json(binance.format_volume_url(), &json!([]));

        let assets = vec![
            Asset::spot("BTC", "USD", 8),
            Asset::spot("ETH", "USD", 8),
            Asset::future("BTC", "USDT", 6),
        ];
        let orchestrator = FetchOrchestrator::new(vec![Box::new(okx), Box::new(binance)])
            .with_mode(FetchMode::Sequential);
        let report = orchestrator.run(&assets, &http).await.unwrap();
        assert_eq!(report.entry_count(), 3);
        assert_eq!(report.not_found_count(), 1);

        let oracle = Arc::new(DryRunOracle::new());
        let publisher = EntryPublisher::new(oracle.clone()).with_page_size(Some(1)).unwrap();
        let receipts = publisher.publish_many(&report.into_entries()).await.unwrap();

        let kinds: Vec<_> = receipts.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![InstrumentKind::Spot, InstrumentKind::Future, InstrumentKind::Future]
        );
        let hashes: Vec<_> = oracle
            .calls()
            .iter()
            .map(|c| match c {
                RecordedCall::PublishEntries { transaction_hash, .. } => *transaction_hash,
                RecordedCall::SetCheckpoints { transaction_hash, .. } => *transaction_hash,
            })
            .collect();
        let receipt_hashes: Vec<_> = receipts.iter().map(|r| r.transaction_hash).collect();
        assert_eq!(hashes, receipt_hashes);

        let query = OracleQueryClient::new(oracle.clone());
        let published = query.get_spot_entries("BTC/USD", &["OKX"]).await.unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].price, 4_200_012_000_000);
    }

    #[tokio::test]
    async fn test_unauthorized_round_publishes_nothing() {
        let oracle = Arc::new(DryRunOracle::unauthorized());
        let asset = Asset::spot("BTC", "USD", 8);
        let entry = oracle_feeder::entry::Entry::new(&asset, 1, 1, "OKX", "PRAGMA").unwrap();

        let result = EntryPublisher::new(oracle.clone()).publish_entry(&entry).await;
        assert!(result.is_err());
        assert!(oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn test_checkpoints_cover_every_pair_once() {
        let oracle = Arc::new(DryRunOracle::new());
        let ids: Vec<u128> = (1..=32).collect();

        let receipts = CheckpointPublisher::new(oracle.clone())
            .set_checkpoints(ids, AggregationMode::Median)
            .await
            .unwrap();

        let counts: Vec<_> = oracle.calls().iter().map(RecordedCall::item_count).collect();
        assert_eq!(counts, vec![15, 15, 2]);
        assert_eq!(receipts.len(), 3);
    }
}
