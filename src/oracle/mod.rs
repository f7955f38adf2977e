//! On-chain oracle access
//!
//! The oracle contract is reached through [`OracleContract`]; signing and RPC
//! live behind it. Write paths page their input and submit one call per page.

mod checkpoint;
mod dry_run;
mod publisher;
mod query;

pub use checkpoint::{CheckpointPublisher, DEFAULT_CHECKPOINT_PAGE_SIZE};
pub use dry_run::{DryRunOracle, RecordedCall};
pub use publisher::{EntryPublisher, DEFAULT_ENTRY_PAGE_SIZE};
pub use query::OracleQueryClient;

use async_trait::async_trait;
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::{ContractError, InvalidArgument};
use crate::types::{short_string_to_felt, AggregationMode, DataType, InstrumentKind, OracleResponse, PairId};

/// Fields shared by every stored entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseEntry {
    pub timestamp: u64,
    /// Exchange tag as a short-string felt
    pub source: U256,
    /// Publisher name as a short-string felt
    pub publisher: U256,
}

/// Entry in the shape the oracle stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPayload {
    pub base: BaseEntry,
    pub price: u128,
    pub pair_id: PairId,
    pub volume: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_timestamp: Option<u64>,
}

/// One element of a publish call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryEnvelope {
    Spot(EntryPayload),
    Future(EntryPayload),
}

impl EntryEnvelope {
    pub fn from_entry(entry: &Entry) -> Result<Self, InvalidArgument> {
        let payload = EntryPayload {
            base: BaseEntry {
                timestamp: entry.timestamp,
                source: short_string_to_felt(&entry.source)?,
                publisher: short_string_to_felt(&entry.publisher)?,
            },
            price: entry.price,
            pair_id: entry.data_type.pair_id(),
            volume: entry.volume.round() as u128,
            expiration_timestamp: entry.data_type.expiration(),
        };
        Ok(match entry.kind() {
            InstrumentKind::Spot => EntryEnvelope::Spot(payload),
            InstrumentKind::Future => EntryEnvelope::Future(payload),
        })
    }

    pub fn kind(&self) -> InstrumentKind {
        match self {
            EntryEnvelope::Spot(_) => InstrumentKind::Spot,
            EntryEnvelope::Future(_) => InstrumentKind::Future,
        }
    }

    pub fn payload(&self) -> &EntryPayload {
        match self {
            EntryEnvelope::Spot(payload) | EntryEnvelope::Future(payload) => payload,
        }
    }
}

/// Handle for one submitted page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvokeReceipt {
    pub transaction_hash: H256,
    /// Number of entries or checkpoints in the page
    pub item_count: usize,
    pub kind: InstrumentKind,
}

impl InvokeReceipt {
    /// Transaction hash as 0x-prefixed hex
    pub fn transaction_hex(&self) -> String {
        format!("0x{}", hex::encode(self.transaction_hash.as_bytes()))
    }
}

/// Oracle contract operations used by the feeder
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OracleContract: Send + Sync {
    /// Whether a signing account is configured for writes.
    fn is_write_authorized(&self) -> bool;

    async fn publish_data_entries(&self, entries: Vec<EntryEnvelope>) -> Result<H256, ContractError>;

    async fn set_checkpoints(
        &self,
        data_types: Vec<DataType>,
        mode: AggregationMode,
    ) -> Result<H256, ContractError>;

    async fn get_data(
        &self,
        data_type: DataType,
        mode: AggregationMode,
    ) -> Result<OracleResponse, ContractError>;

    async fn get_data_for_sources(
        &self,
        data_type: DataType,
        mode: AggregationMode,
        sources: Vec<U256>,
    ) -> Result<OracleResponse, ContractError>;

    async fn get_data_entries_for_sources(
        &self,
        data_type: DataType,
        sources: Vec<U256>,
    ) -> Result<Vec<EntryPayload>, ContractError>;

    async fn get_decimals(&self, data_type: DataType) -> Result<u32, ContractError>;
}

/// Split `items` into pages of at most `page_size`; `None` keeps one page.
pub(crate) fn paginate<T: Clone>(items: Vec<T>, page_size: Option<usize>) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    match page_size {
        Some(size) if size > 0 => items.chunks(size).map(<[T]>::to_vec).collect(),
        _ => vec![items],
    }
}

/// Reject an explicit zero page size.
pub(crate) fn check_page_size(page_size: Option<usize>) -> Result<Option<usize>, InvalidArgument> {
    match page_size {
        Some(0) => Err(InvalidArgument::ZeroPageSize),
        other => Ok(other),
    }
}
