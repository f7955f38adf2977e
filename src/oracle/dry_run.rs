//! Oracle backend that records write calls instead of sending them
//!
//! Transaction hashes are the keccak of the call payload and a sequence
//! number, so repeated runs produce the same hashes. Published entries are
//! kept in memory and served back by the raw-entry read.

use async_trait::async_trait;
use ethers::types::{H256, U256};
use ethers::utils::keccak256;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ContractError;
use crate::oracle::{EntryEnvelope, EntryPayload, OracleContract};
use crate::types::{AggregationMode, DataType, OracleResponse};

/// Write call captured by [`DryRunOracle`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RecordedCall {
    PublishEntries {
        entries: Vec<EntryEnvelope>,
        transaction_hash: H256,
    },
    SetCheckpoints {
        data_types: Vec<DataType>,
        mode: AggregationMode,
        transaction_hash: H256,
    },
}

impl RecordedCall {
    pub fn item_count(&self) -> usize {
        match self {
            RecordedCall::PublishEntries { entries, .. } => entries.len(),
            RecordedCall::SetCheckpoints { data_types, .. } => data_types.len(),
        }
    }
}

#[derive(Debug, Default)]
struct DryRunState {
    calls: Vec<RecordedCall>,
    entries: Vec<EntryEnvelope>,
}

#[derive(Debug)]
pub struct DryRunOracle {
    authorized: bool,
    decimals: HashMap<DataType, u32>,
    default_decimals: u32,
    state: Mutex<DryRunState>,
}

impl DryRunOracle {
    pub fn new() -> Self {
        Self {
            authorized: true,
            decimals: HashMap::new(),
            default_decimals: 8,
            state: Mutex::new(DryRunState::default()),
        }
    }

    /// Dry run that behaves as if no signing account were configured.
    pub fn unauthorized() -> Self {
        Self {
            authorized: false,
            ..Self::new()
        }
    }

    pub fn with_decimals(mut self, data_type: DataType, decimals: u32) -> Self {
        self.decimals.insert(data_type, decimals);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    fn record<T: Serialize>(
        &self,
        operation: &str,
        payload: &T,
        call: impl FnOnce(H256) -> RecordedCall,
    ) -> Result<H256, ContractError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ContractError::new(operation, "dry-run state poisoned"))?;
        let mut bytes = serde_json::to_vec(payload)
            .map_err(|e| ContractError::new(operation, format!("cannot encode call: {}", e)))?;
        bytes.extend_from_slice(&(state.calls.len() as u64).to_be_bytes());
        let transaction_hash = H256::from(keccak256(&bytes));
        state.calls.push(call(transaction_hash));
        Ok(transaction_hash)
    }
}

impl Default for DryRunOracle {
    fn default() -> Self {
        Self::new()
    }
}

fn not_available(operation: &str) -> ContractError {
    ContractError::new(operation, "on-chain aggregation is not available in dry-run mode")
}

#[async_trait]
impl OracleContract for DryRunOracle {
    fn is_write_authorized(&self) -> bool {
        self.authorized
    }

    async fn publish_data_entries(&self, entries: Vec<EntryEnvelope>) -> Result<H256, ContractError> {
        tracing::info!(entries = entries.len(), "[dry-run] publish_data_entries");
        let hash = self.record("publish_data_entries", &entries, |transaction_hash| {
            RecordedCall::PublishEntries {
                entries: entries.clone(),
                transaction_hash,
            }
        })?;
        if let Ok(mut state) = self.state.lock() {
            state.entries.extend(entries);
        }
        Ok(hash)
    }

    async fn set_checkpoints(
        &self,
        data_types: Vec<DataType>,
        mode: AggregationMode,
    ) -> Result<H256, ContractError> {
        tracing::info!(checkpoints = data_types.len(), mode = %mode, "[dry-run] set_checkpoints");
        self.record("set_checkpoints", &(&data_types, mode), |transaction_hash| {
            RecordedCall::SetCheckpoints {
                data_types: data_types.clone(),
                mode,
                transaction_hash,
            }
        })
    }

    async fn get_data(
        &self,
        _data_type: DataType,
        _mode: AggregationMode,
    ) -> Result<OracleResponse, ContractError> {
        Err(not_available("get_data"))
    }

    async fn get_data_for_sources(
        &self,
        _data_type: DataType,
        _mode: AggregationMode,
        _sources: Vec<U256>,
    ) -> Result<OracleResponse, ContractError> {
        Err(not_available("get_data_for_sources"))
    }

    async fn get_data_entries_for_sources(
        &self,
        data_type: DataType,
        sources: Vec<U256>,
    ) -> Result<Vec<EntryPayload>, ContractError> {
        let state = self
            .state
            .lock()
            .map_err(|_| ContractError::new("get_data_entries_for_sources", "dry-run state poisoned"))?;
        Ok(state
            .entries
            .iter()
            .filter(|envelope| envelope.kind() == data_type.kind())
            .map(EntryEnvelope::payload)
            .filter(|payload| payload.pair_id == data_type.pair_id())
            .filter(|payload| payload.expiration_timestamp == data_type.expiration())
            .filter(|payload| sources.is_empty() || sources.contains(&payload.base.source))
            .cloned()
            .collect())
    }

    async fn get_decimals(&self, data_type: DataType) -> Result<u32, ContractError> {
        Ok(self
            .decimals
            .get(&data_type)
            .copied()
            .unwrap_or(self.default_decimals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::types::{short_string_to_felt, Asset, PairId};

    fn envelope(source: &str) -> EntryEnvelope {
        let entry = Entry::new(&Asset::spot("ETH", "USD", 8), 1, 2, source, "PRAGMA").unwrap();
        EntryEnvelope::from_entry(&entry).unwrap()
    }

    #[tokio::test]
    async fn test_hashes_are_deterministic_and_distinct() {
        let a = DryRunOracle::new();
        let b = DryRunOracle::new();

        let first = a.publish_data_entries(vec![envelope("OKX")]).await.unwrap();
        let again = b.publish_data_entries(vec![envelope("OKX")]).await.unwrap();
        let second = a.publish_data_entries(vec![envelope("OKX")]).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first, second);
        assert_eq!(a.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_published_entries_are_readable_by_source() {
        let oracle = DryRunOracle::new();
        oracle
            .publish_data_entries(vec![envelope("OKX"), envelope("CEX")])
            .await
            .unwrap();

        let key = DataType::Spot(PairId::from_symbol("ETH/USD").unwrap());
        let okx = short_string_to_felt("OKX").unwrap();
        let entries = oracle
            .get_data_entries_for_sources(key, vec![okx])
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].base.source, okx);

        assert!(oracle.get_data(key, AggregationMode::Median).await.is_err());
    }

    #[test]
    fn test_decimals_override() {
        let btc = DataType::Spot(PairId::from_symbol("BTC/USD").unwrap());
        let usdc = DataType::Spot(PairId::from_symbol("USDC/USD").unwrap());
        let oracle = DryRunOracle::new().with_decimals(usdc, 6);

        assert_eq!(tokio_test::block_on(oracle.get_decimals(usdc)).unwrap(), 6);
        assert_eq!(tokio_test::block_on(oracle.get_decimals(btc)).unwrap(), 8);
    }
}
