//! oracle-feeder: one fetch-and-publish round

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use oracle_feeder::config::AppConfig;
use oracle_feeder::entry::Entry;
use oracle_feeder::http::ReqwestTransport;
use oracle_feeder::oracle::{CheckpointPublisher, DryRunOracle, EntryPublisher, OracleContract};
use oracle_feeder::orchestrator::FetchOrchestrator;
use oracle_feeder::types::{DataType, PairId};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

/// Distinct checkpoint keys of the published entries, in first-seen order.
fn checkpoint_keys(entries: &[Entry]) -> (Vec<PairId>, Vec<(PairId, u64)>) {
    let mut seen = HashSet::new();
    let mut spot = Vec::new();
    let mut future = Vec::new();
    for entry in entries {
        if !seen.insert(entry.data_type) {
            continue;
        }
        match entry.data_type {
            DataType::Spot(id) => spot.push(id),
            DataType::Future(id, expiry) => future.push((id, expiry)),
        }
    }
    (spot, future)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing();
    info!(config = %config, "Starting oracle feeder");

    if !config.feeder.dry_run {
        bail!("No signing backend is configured; run with ORACLE_FEEDER__FEEDER__DRY_RUN=true");
    }
    let contract: Arc<dyn OracleContract> = Arc::new(DryRunOracle::new());

    let http = ReqwestTransport::new(config.http_timeout()).context("Failed to create HTTP transport")?;
    let mut orchestrator = FetchOrchestrator::new(config.fetchers())
        .with_mode(config.fetch.mode)
        .with_fail_fast(config.fetch.fail_fast);
    if let Some(timeout) = config.request_timeout() {
        orchestrator = orchestrator.with_timeout(timeout);
    }
    info!(sources = ?orchestrator.sources(), assets = config.assets.len(), "Fetching prices");

    let report = orchestrator
        .run(&config.assets, &http)
        .await
        .context("Fetch round aborted")?;
    if report.fatal_count() > 0 {
        warn!(fatal = report.fatal_count(), "Some sources failed this round");
    }
    let entries = report.into_entries();

    let publisher = EntryPublisher::new(contract.clone()).with_page_size(config.oracle.entry_pages())?;
    let receipts = publisher
        .publish_many(&entries)
        .await
        .context("Failed to publish entries")?;
    info!(pages = receipts.len(), entries = entries.len(), "Published entries");

    if config.feeder.set_checkpoints {
        let checkpoints =
            CheckpointPublisher::new(contract.clone()).with_page_size(config.oracle.checkpoint_pages())?;
        let mode = config.oracle.aggregation_mode;
        let (spot, future) = checkpoint_keys(&entries);

        let mut pages = checkpoints
            .set_checkpoints(spot, mode)
            .await
            .context("Failed to set spot checkpoints")?;
        pages.extend(
            checkpoints
                .set_future_checkpoints(future, mode)
                .await
                .context("Failed to set future checkpoints")?,
        );
        info!(pages = pages.len(), mode = %mode, "Set checkpoints");
    }

    Ok(())
}
