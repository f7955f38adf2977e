//! Checkpoint publisher

use std::sync::Arc;

use crate::error::{ContractError, InvalidArgument, PublishError};
use crate::oracle::{check_page_size, paginate, InvokeReceipt, OracleContract};
use crate::types::{AggregationMode, DataType, InstrumentKind, IntoPairId};

/// Checkpoints per call unless configured otherwise
pub const DEFAULT_CHECKPOINT_PAGE_SIZE: usize = 15;

/// Snapshots the oracle's current aggregate for a list of pairs.
pub struct CheckpointPublisher {
    contract: Arc<dyn OracleContract>,
    page_size: Option<usize>,
}

impl CheckpointPublisher {
    pub fn new(contract: Arc<dyn OracleContract>) -> Self {
        Self {
            contract,
            page_size: Some(DEFAULT_CHECKPOINT_PAGE_SIZE),
        }
    }

    pub fn with_page_size(mut self, page_size: Option<usize>) -> Result<Self, InvalidArgument> {
        self.page_size = check_page_size(page_size)?;
        Ok(self)
    }

    /// Checkpoint spot pairs.
    pub async fn set_checkpoints<P: IntoPairId>(
        &self,
        pair_ids: Vec<P>,
        mode: AggregationMode,
    ) -> Result<Vec<InvokeReceipt>, PublishError> {
        self.ensure_authorized()?;
        let data_types = pair_ids
            .into_iter()
            .map(|p| p.into_pair_id().map(DataType::Spot))
            .collect::<Result<Vec<_>, _>>()?;
        self.submit(data_types, mode, InstrumentKind::Spot).await
    }

    /// Checkpoint future pairs, each with its expiry in seconds.
    pub async fn set_future_checkpoints<P: IntoPairId>(
        &self,
        pairs: Vec<(P, u64)>,
        mode: AggregationMode,
    ) -> Result<Vec<InvokeReceipt>, PublishError> {
        self.ensure_authorized()?;
        let data_types = pairs
            .into_iter()
            .map(|(p, expiry)| p.into_pair_id().map(|id| DataType::Future(id, expiry)))
            .collect::<Result<Vec<_>, _>>()?;
        self.submit(data_types, mode, InstrumentKind::Future).await
    }

    pub async fn set_checkpoint<P: IntoPairId>(
        &self,
        pair_id: P,
        mode: AggregationMode,
    ) -> Result<InvokeReceipt, PublishError> {
        single(self.set_checkpoints(vec![pair_id], mode).await?)
    }

    pub async fn set_future_checkpoint<P: IntoPairId>(
        &self,
        pair_id: P,
        expiry_timestamp: u64,
        mode: AggregationMode,
    ) -> Result<InvokeReceipt, PublishError> {
        single(
            self.set_future_checkpoints(vec![(pair_id, expiry_timestamp)], mode)
                .await?,
        )
    }

    fn ensure_authorized(&self) -> Result<(), PublishError> {
        if self.contract.is_write_authorized() {
            Ok(())
        } else {
            Err(PublishError::Unauthorized)
        }
    }

    async fn submit(
        &self,
        data_types: Vec<DataType>,
        mode: AggregationMode,
        kind: InstrumentKind,
    ) -> Result<Vec<InvokeReceipt>, PublishError> {
        if data_types.is_empty() {
            tracing::warn!("Skipping checkpoints as pair id list is empty");
            return Ok(Vec::new());
        }

        let mut receipts = Vec::new();
        for page in paginate(data_types, self.page_size) {
            let item_count = page.len();
            let transaction_hash = self.contract.set_checkpoints(page, mode).await?;
            let receipt = InvokeReceipt {
                transaction_hash,
                item_count,
                kind,
            };
            tracing::info!(
                kind = %kind,
                mode = %mode,
                checkpoints = item_count,
                tx_hash = %receipt.transaction_hex(),
                "Set checkpoints page"
            );
            receipts.push(receipt);
        }
        Ok(receipts)
    }
}

fn single(mut receipts: Vec<InvokeReceipt>) -> Result<InvokeReceipt, PublishError> {
    receipts
        .pop()
        .ok_or_else(|| ContractError::new("set_checkpoints", "no receipt for checkpoint").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracleContract;
    use crate::types::PairId;
    use ethers::types::H256;
    use std::sync::Mutex;

    fn recording_mock(calls: Arc<Mutex<Vec<(Vec<DataType>, AggregationMode)>>>) -> MockOracleContract {
        let mut mock = MockOracleContract::new();
        mock.expect_is_write_authorized().return_const(true);
        mock.expect_set_checkpoints().returning(move |page, mode| {
            calls.lock().unwrap().push((page, mode));
            Ok(H256::zero())
        });
        mock
    }

    #[tokio::test]
    async fn test_checkpoints_page_at_fifteen() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let publisher = CheckpointPublisher::new(Arc::new(recording_mock(calls.clone())));
        let ids: Vec<u128> = (1..=32).collect();

        let receipts = publisher
            .set_checkpoints(ids, AggregationMode::Median)
            .await
            .unwrap();

        let counts: Vec<_> = receipts.iter().map(|r| r.item_count).collect();
        assert_eq!(counts, vec![15, 15, 2]);
        let calls = calls.lock().unwrap();
        let covered: Vec<_> = calls.iter().flat_map(|(page, _)| page.clone()).collect();
        let expected: Vec<_> = (1..=32u128).map(|i| DataType::Spot(PairId::from(i))).collect();
        assert_eq!(covered, expected);
        assert!(calls.iter().all(|(_, mode)| *mode == AggregationMode::Median));
    }

    #[tokio::test]
    async fn test_future_checkpoint_carries_expiry() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let publisher = CheckpointPublisher::new(Arc::new(recording_mock(calls.clone())));

        let receipt = publisher
            .set_future_checkpoint("BTC/USD", 1_703_836_800, AggregationMode::Mean)
            .await
            .unwrap();

        assert_eq!(receipt.kind, InstrumentKind::Future);
        let calls = calls.lock().unwrap();
        let id = PairId::from_symbol("BTC/USD").unwrap();
        assert_eq!(calls[0].0, vec![DataType::Future(id, 1_703_836_800)]);
    }

    #[tokio::test]
    async fn test_empty_checkpoints_make_no_calls() {
        let mut mock = MockOracleContract::new();
        mock.expect_is_write_authorized().return_const(true);
        mock.expect_set_checkpoints().never();

        let receipts = CheckpointPublisher::new(Arc::new(mock))
            .set_checkpoints(Vec::<u128>::new(), AggregationMode::Median)
            .await
            .unwrap();
        assert!(receipts.is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_checkpoint() {
        let mut mock = MockOracleContract::new();
        mock.expect_is_write_authorized().return_const(false);
        mock.expect_set_checkpoints().never();

        let result = CheckpointPublisher::new(Arc::new(mock))
            .set_checkpoint("ETH/USD", AggregationMode::Median)
            .await;
        assert!(matches!(result, Err(PublishError::Unauthorized)));
    }
}
