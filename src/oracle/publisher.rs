//! Entry batch publisher

use std::sync::Arc;

use crate::entry::Entry;
use crate::error::{ContractError, InvalidArgument, PublishError};
use crate::oracle::{check_page_size, paginate, EntryEnvelope, InvokeReceipt, OracleContract};
use crate::types::InstrumentKind;

/// Entries per publish call unless configured otherwise
pub const DEFAULT_ENTRY_PAGE_SIZE: usize = 40;

/// Submits entries in pages, spot entries first, then futures.
pub struct EntryPublisher {
    contract: Arc<dyn OracleContract>,
    page_size: Option<usize>,
}

impl EntryPublisher {
    pub fn new(contract: Arc<dyn OracleContract>) -> Self {
        Self {
            contract,
            page_size: Some(DEFAULT_ENTRY_PAGE_SIZE),
        }
    }

    /// `None` submits each kind in a single call.
    pub fn with_page_size(mut self, page_size: Option<usize>) -> Result<Self, InvalidArgument> {
        self.page_size = check_page_size(page_size)?;
        Ok(self)
    }

    pub fn page_size(&self) -> Option<usize> {
        self.page_size
    }

    /// Publish `entries`, returning one receipt per submitted page.
    ///
    /// Pages are submitted one after another; a failing page stops the
    /// remaining ones.
    pub async fn publish_many(&self, entries: &[Entry]) -> Result<Vec<InvokeReceipt>, PublishError> {
        if !self.contract.is_write_authorized() {
            return Err(PublishError::Unauthorized);
        }
        if entries.is_empty() {
            tracing::warn!("Skipping publishing as entries array is empty");
            return Ok(Vec::new());
        }

        let mut spot = Vec::new();
        let mut future = Vec::new();
        for entry in entries {
            let envelope = EntryEnvelope::from_entry(entry)?;
            match envelope.kind() {
                InstrumentKind::Spot => spot.push(envelope),
                InstrumentKind::Future => future.push(envelope),
            }
        }

        let mut receipts = Vec::new();
        for (kind, group) in [(InstrumentKind::Spot, spot), (InstrumentKind::Future, future)] {
            for page in paginate(group, self.page_size) {
                let item_count = page.len();
                let transaction_hash = self.contract.publish_data_entries(page).await?;
                let receipt = InvokeReceipt {
                    transaction_hash,
                    item_count,
                    kind,
                };
                tracing::info!(
                    kind = %kind,
                    entries = item_count,
                    tx_hash = %receipt.transaction_hex(),
                    "Published entries page"
                );
                receipts.push(receipt);
            }
        }
        Ok(receipts)
    }

    /// Publish a single entry.
    pub async fn publish_entry(&self, entry: &Entry) -> Result<InvokeReceipt, PublishError> {
        self.publish_many(std::slice::from_ref(entry))
            .await?
            .pop()
            .ok_or_else(|| {
                ContractError::new("publish_data_entries", "no receipt for submitted entry").into()
            })
    }
}
