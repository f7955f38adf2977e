//! Fetch orchestrator
//!
//! Fans requests out over every (fetcher, asset) pair and collects one
//! outcome per slot without letting a failing source drop its siblings.

use futures_util::future::join_all;
use std::time::Duration;

pub use crate::entry::FetchOutcome;

use crate::entry::{Entry, FetchItem};
use crate::error::FetchError;
use crate::http::HttpTransport;
use crate::sources::SourceFetcher;
use crate::types::Asset;

/// How requests of a round are issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Every request is started before any is awaited.
    #[default]
    Concurrent,
    /// Each request is awaited before the next is issued.
    Sequential,
}

/// Outcomes of a fetch round, in issue order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    pub outcomes: Vec<FetchOutcome>,
}

impl FetchReport {
    pub fn entries(&self) -> Vec<&Entry> {
        self.outcomes
            .iter()
            .filter_map(FetchOutcome::entry)
            .collect()
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.outcomes
            .into_iter()
            .filter_map(FetchOutcome::into_entry)
            .collect()
    }

    pub fn not_found(&self) -> Vec<&FetchOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.is_not_found())
            .collect()
    }

    pub fn fatal(&self) -> Vec<&FetchOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.is_fatal())
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.entries().len()
    }

    pub fn not_found_count(&self) -> usize {
        self.not_found().len()
    }

    pub fn fatal_count(&self) -> usize {
        self.fatal().len()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

pub struct FetchOrchestrator {
    fetchers: Vec<Box<dyn SourceFetcher>>,
    mode: FetchMode,
    timeout: Option<Duration>,
    fail_fast: bool,
}

impl FetchOrchestrator {
    pub fn new(fetchers: Vec<Box<dyn SourceFetcher>>) -> Self {
        Self {
            fetchers,
            mode: FetchMode::default(),
            timeout: None,
            fail_fast: false,
        }
    }

    pub fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Upper bound on each individual request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fail the whole round on the first fatal slot.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn sources(&self) -> Vec<&'static str> {
        self.fetchers.iter().map(|f| f.source()).collect()
    }

    /// Run one round over `assets`.
    pub async fn run(
        &self,
        assets: &[Asset],
        http: &dyn HttpTransport,
    ) -> Result<FetchReport, FetchError> {
        let slots: Vec<(&dyn SourceFetcher, &Asset)> = self
            .fetchers
            .iter()
            .flat_map(|fetcher| {
                assets
                    .iter()
                    .filter(move |asset| fetcher.accepts(asset))
                    .map(move |asset| (&**fetcher, asset))
            })
            .collect();

        let results = match self.mode {
            FetchMode::Concurrent => {
                let pending: Vec<_> = slots
                    .iter()
                    .map(|(fetcher, asset)| self.run_slot(*fetcher, asset, http))
                    .collect();
                join_all(pending).await
            }
            FetchMode::Sequential => {
                let mut results = Vec::with_capacity(slots.len());
                for (fetcher, asset) in &slots {
                    results.push(self.run_slot(*fetcher, asset, http).await);
                }
                results
            }
        };

        let mut report = FetchReport::default();
        for ((fetcher, asset), result) in slots.iter().zip(results) {
            let result = match result {
                Err(error) if self.fail_fast => return Err(error),
                other => other,
            };
            report
                .outcomes
                .extend(FetchOutcome::from_result(fetcher.source(), &asset.pair, result));
        }

        tracing::info!(
            entries = report.entry_count(),
            not_found = report.not_found_count(),
            fatal = report.fatal_count(),
            mode = ?self.mode,
            "Fetch round complete"
        );
        Ok(report)
    }

    async fn run_slot(
        &self,
        fetcher: &dyn SourceFetcher,
        asset: &Asset,
        http: &dyn HttpTransport,
    ) -> Result<Vec<FetchItem>, FetchError> {
        let Some(limit) = self.timeout else {
            return fetcher.fetch_pair(asset, http).await;
        };
        match tokio::time::timeout(limit, fetcher.fetch_pair(asset, http)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                source_name: fetcher.source().to_string(),
                pair: asset.pair.symbol(),
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}
