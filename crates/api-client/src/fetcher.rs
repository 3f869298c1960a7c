//! Snapshot fetcher - on-demand pulls of full-replacement state
//!
//! Fetches never touch shared state and never retry; the caller decides
//! what to do with the result.

use crate::client::ApiClient;
use crate::error::ApiError;
use async_trait::async_trait;
use pbft_trade_types::{
    BalanceResponse, BlockWire, ConsensusResultWire, ConsensusSnapshot, HistoryResponse, Snapshot,
    SnapshotKind, TradeRecord,
};

/// Source of REST snapshots
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch_balance(&self) -> Result<f64, ApiError>;

    async fn fetch_history(&self) -> Result<Vec<TradeRecord>, ApiError>;

    /// Latest consensus result together with the latest block
    async fn fetch_consensus(&self) -> Result<ConsensusSnapshot, ApiError>;

    async fn fetch(&self, kind: SnapshotKind) -> Result<Snapshot, ApiError> {
        match kind {
            SnapshotKind::Balance => self.fetch_balance().await.map(Snapshot::Balance),
            SnapshotKind::History => self.fetch_history().await.map(Snapshot::History),
            SnapshotKind::Consensus => self.fetch_consensus().await.map(Snapshot::Consensus),
        }
    }
}

#[async_trait]
impl SnapshotFetcher for ApiClient {
    async fn fetch_balance(&self) -> Result<f64, ApiError> {
        let response: BalanceResponse = self.get_json("account/balance", &[]).await?;
        Ok(response.balance)
    }

    async fn fetch_history(&self) -> Result<Vec<TradeRecord>, ApiError> {
        let response: HistoryResponse = self.get_json("trade/history", &[]).await?;
        Ok(response.into_records())
    }

    async fn fetch_consensus(&self) -> Result<ConsensusSnapshot, ApiError> {
        let (result, block) = tokio::try_join!(
            self.get_json::<ConsensusResultWire>("pbft/result", &[]),
            self.get_json::<BlockWire>("pbft/block", &[]),
        )?;

        Ok(ConsensusSnapshot {
            results: result.into_result().into_iter().collect(),
            block: block.into_block(),
        })
    }
}
