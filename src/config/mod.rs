//! Configuration management for the feeder
//!
//! Loads defaults, optional YAML files and environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::sources::{
    BinanceFutureFetcher, CexFetcher, CoinbaseFetcher, DefillamaFetcher, GeckoTerminalFetcher,
    OkxFetcher, OkxFutureFetcher, SourceFetcher,
};
use crate::types::{short_string_to_felt, Asset};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub feeder: FeederConfig,
    pub fetch: FetchConfig,
    pub sources: SourcesConfig,
    pub oracle: OracleConfig,
    /// Assets to fetch; the built-in catalog when not configured
    #[serde(default = "Asset::default_catalog")]
    pub assets: Vec<Asset>,
}

impl AppConfig {
    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            .set_default("feeder.publisher", "PRAGMA")?
            .set_default("feeder.dry_run", true)?
            .set_default("feeder.set_checkpoints", false)?
            // Fetch defaults
            .set_default("fetch.mode", "concurrent")?
            .set_default("fetch.request_timeout_ms", 10_000)?
            .set_default("fetch.http_timeout_ms", 30_000)?
            .set_default("fetch.fail_fast", false)?
            // Source defaults
            .set_default("sources.cex.enabled", true)?
            .set_default("sources.coinbase.enabled", true)?
            .set_default("sources.defillama.enabled", true)?
            .set_default("sources.gecko_terminal.enabled", true)?
            .set_default("sources.okx.enabled", true)?
            .set_default("sources.binance_future.enabled", true)?
            .set_default("sources.okx_future.enabled", true)?
            // Oracle defaults
            .set_default("oracle.entry_page_size", 40)?
            .set_default("oracle.checkpoint_page_size", 15)?
            .set_default("oracle.aggregation_mode", "median")?;
        Ok(builder)
    }

    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (ORACLE_FEEDER__*)
            .add_source(
                Environment::with_prefix("ORACLE_FEEDER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Configuration from built-in defaults only
    pub fn from_defaults() -> Result<Self> {
        Self::defaults()?
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        short_string_to_felt(&self.feeder.publisher)
            .with_context(|| format!("Invalid publisher name '{}'", self.feeder.publisher))?;
        if self.assets.is_empty() {
            bail!("No assets configured");
        }
        for asset in &self.assets {
            asset
                .pair
                .pair_id()
                .with_context(|| format!("Invalid asset pair {}", asset.pair))?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.fetch.request_timeout_ms > 0).then(|| Duration::from_millis(self.fetch.request_timeout_ms))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch.http_timeout_ms)
    }

    /// Fetchers for every enabled source
    pub fn fetchers(&self) -> Vec<Box<dyn SourceFetcher>> {
        let publisher = self.feeder.publisher.as_str();
        let s = &self.sources;
        let mut fetchers: Vec<Box<dyn SourceFetcher>> = Vec::new();

        if s.cex.enabled {
            let mut f = CexFetcher::new(publisher);
            if let Some(url) = &s.cex.base_url {
                f = f.with_base_url(url.as_str());
            }
            fetchers.push(Box::new(f));
        }
        if s.coinbase.enabled {
            let mut f = CoinbaseFetcher::new(publisher);
            if let Some(url) = &s.coinbase.base_url {
                f = f.with_base_url(url.as_str());
            }
            fetchers.push(Box::new(f));
        }
        if s.defillama.enabled {
            let mut f = DefillamaFetcher::new(publisher);
            if let Some(url) = &s.defillama.base_url {
                f = f.with_base_url(url.as_str());
            }
            fetchers.push(Box::new(f));
        }
        if s.gecko_terminal.enabled {
            let mut f = GeckoTerminalFetcher::new(publisher);
            if let Some(url) = &s.gecko_terminal.base_url {
                f = f.with_base_url(url.as_str());
            }
            fetchers.push(Box::new(f));
        }
        if s.okx.enabled {
            let mut f = OkxFetcher::new(publisher);
            if let Some(url) = &s.okx.base_url {
                f = f.with_base_url(url.as_str());
            }
            fetchers.push(Box::new(f));
        }
        if s.binance_future.enabled {
            let mut f = BinanceFutureFetcher::new(publisher);
            if let Some(url) = &s.binance_future.base_url {
                f = f.with_base_url(url.as_str());
            }
            fetchers.push(Box::new(f));
        }
        if s.okx_future.enabled {
            fetchers.push(Box::new(self.okx_future_fetcher()));
        }

        fetchers
    }

    fn okx_future_fetcher(&self) -> OkxFutureFetcher {
        let source = &self.sources.okx_future;
        let mut f = OkxFutureFetcher::new(&self.feeder.publisher);
        if let Some(url) = &source.base_url {
            f = f.with_base_url(url.as_str());
        }
        if let Some(url) = &source.instruments_url {
            f = f.with_instruments_url(url.as_str());
        }
        f
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "publisher={} dry_run={} mode={:?} assets={} entry_page={} checkpoint_page={} aggregation={}",
            self.feeder.publisher,
            self.feeder.dry_run,
            self.fetch.mode,
            self.assets.len(),
            self.oracle.entry_page_size,
            self.oracle.checkpoint_page_size,
            self.oracle.aggregation_mode
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::FetchMode;
    use crate::types::AggregationMode;

    #[test]
    fn test_defaults_load() {
        let config = AppConfig::from_defaults().unwrap();
        assert_eq!(config.oracle.entry_pages(), Some(40));
        assert_eq!(config.oracle.checkpoint_pages(), Some(15));
        assert_eq!(config.oracle.aggregation_mode, AggregationMode::Median);
        assert_eq!(config.fetch.mode, FetchMode::Concurrent);
        assert_eq!(config.assets, Asset::default_catalog());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_all_sources_enabled_by_default() {
        let config = AppConfig::from_defaults().unwrap();
        let sources: Vec<_> = config.fetchers().iter().map(|f| f.source()).collect();
        assert_eq!(
            sources,
            vec!["CEX", "COINBASE", "DEFILLAMA", "GECKOTERMINAL", "OKX", "BINANCE", "OKX"]
        );
    }

    #[test]
    fn test_okx_future_endpoints_from_config() {
        let mut config = AppConfig::from_defaults().unwrap();
        config.sources.okx_future.base_url = Some(String::from("http://okx.test/tickers"));
        config.sources.okx_future.instruments_url = Some(String::from("http://okx.test/instruments"));

        let fetcher = config.okx_future_fetcher();
        assert_eq!(
            fetcher.format_url("BTC", "USD"),
            "http://okx.test/tickers?instType=FUTURES&uly=BTC-USD"
        );
        assert_eq!(
            fetcher.format_expiry_url("BTC-USD-240329"),
            "http://okx.test/instruments?instType=FUTURES&instId=BTC-USD-240329"
        );
    }

    #[test]
    fn test_long_publisher_is_rejected() {
        let mut config = AppConfig::from_defaults().unwrap();
        config.feeder.publisher = "P".repeat(40);
        assert!(config.validate().is_err());
    }
}
