//! Read side of the oracle

use ethers::types::U256;
use std::sync::Arc;

use crate::error::QueryError;
use crate::oracle::{EntryPayload, OracleContract};
use crate::types::{short_string_to_felt, AggregationMode, DataType, IntoPairId, OracleResponse};

/// Reads aggregated prices and raw entries back from the oracle.
pub struct OracleQueryClient {
    contract: Arc<dyn OracleContract>,
}

impl OracleQueryClient {
    pub fn new(contract: Arc<dyn OracleContract>) -> Self {
        Self { contract }
    }

    /// Aggregated spot price, restricted to `sources` when given.
    ///
    /// `mode` falls back to [`AggregationMode::Median`].
    pub async fn get_spot<P: IntoPairId>(
        &self,
        pair: P,
        mode: Option<AggregationMode>,
        sources: Option<&[&str]>,
    ) -> Result<OracleResponse, QueryError> {
        let data_type = DataType::Spot(pair.into_pair_id()?);
        self.get_aggregate(data_type, mode.unwrap_or_default(), sources)
            .await
    }

    /// Aggregated price of the future expiring at `expiry_timestamp` (0 for
    /// the perpetual).
    pub async fn get_future<P: IntoPairId>(
        &self,
        pair: P,
        expiry_timestamp: u64,
        mode: Option<AggregationMode>,
        sources: Option<&[&str]>,
    ) -> Result<OracleResponse, QueryError> {
        let data_type = DataType::Future(pair.into_pair_id()?, expiry_timestamp);
        self.get_aggregate(data_type, mode.unwrap_or_default(), sources)
            .await
    }

    pub async fn get_spot_entries<P: IntoPairId>(
        &self,
        pair: P,
        sources: &[&str],
    ) -> Result<Vec<EntryPayload>, QueryError> {
        let data_type = DataType::Spot(pair.into_pair_id()?);
        let sources = source_felts(sources)?;
        Ok(self
            .contract
            .get_data_entries_for_sources(data_type, sources)
            .await?)
    }

    pub async fn get_future_entries<P: IntoPairId>(
        &self,
        pair: P,
        expiry_timestamp: u64,
        sources: &[&str],
    ) -> Result<Vec<EntryPayload>, QueryError> {
        let data_type = DataType::Future(pair.into_pair_id()?, expiry_timestamp);
        let sources = source_felts(sources)?;
        Ok(self
            .contract
            .get_data_entries_for_sources(data_type, sources)
            .await?)
    }

    pub async fn get_decimals(&self, data_type: DataType) -> Result<u32, QueryError> {
        Ok(self.contract.get_decimals(data_type).await?)
    }

    async fn get_aggregate(
        &self,
        data_type: DataType,
        mode: AggregationMode,
        sources: Option<&[&str]>,
    ) -> Result<OracleResponse, QueryError> {
        let response = match sources {
            Some(sources) if !sources.is_empty() => {
                let felts = source_felts(sources)?;
                self.contract
                    .get_data_for_sources(data_type, mode, felts)
                    .await?
            }
            _ => self.contract.get_data(data_type, mode).await?,
        };
        tracing::debug!(
            pair = %data_type.pair_id(),
            price = response.price,
            sources = response.num_sources_aggregated,
            "Read aggregate"
        );
        Ok(response)
    }
}

fn source_felts(sources: &[&str]) -> Result<Vec<U256>, QueryError> {
    Ok(sources
        .iter()
        .map(|s| short_string_to_felt(s))
        .collect::<Result<Vec<_>, _>>()?)
}
