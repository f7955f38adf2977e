//! Configuration sections

use serde::Deserialize;

use crate::orchestrator::FetchMode;
use crate::types::AggregationMode;

#[derive(Debug, Clone, Deserialize)]
pub struct FeederConfig {
    /// Publisher name stamped on every entry (short string, at most 31 bytes)
    pub publisher: String,
    /// Record oracle writes instead of submitting them
    pub dry_run: bool,
    /// Set checkpoints for published pairs after each round
    pub set_checkpoints: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    pub mode: FetchMode,
    /// Upper bound on each source request in milliseconds, 0 to disable
    pub request_timeout_ms: u64,
    /// HTTP client timeout in milliseconds
    pub http_timeout_ms: u64,
    /// Abort the round on the first fatal source error
    pub fail_fast: bool,
}

/// Per-source switch and endpoint override
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Instrument lookup endpoint, read by the OKX futures source only
    #[serde(default)]
    pub instruments_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub cex: SourceConfig,
    pub coinbase: SourceConfig,
    pub defillama: SourceConfig,
    pub gecko_terminal: SourceConfig,
    pub okx: SourceConfig,
    pub binance_future: SourceConfig,
    pub okx_future: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Entries per publish call, 0 for a single call per kind
    pub entry_page_size: usize,
    /// Checkpoints per call, 0 for a single call
    pub checkpoint_page_size: usize,
    pub aggregation_mode: AggregationMode,
}

impl OracleConfig {
    pub fn entry_pages(&self) -> Option<usize> {
        (self.entry_page_size > 0).then_some(self.entry_page_size)
    }

    pub fn checkpoint_pages(&self) -> Option<usize> {
        (self.checkpoint_page_size > 0).then_some(self.checkpoint_page_size)
    }
}
