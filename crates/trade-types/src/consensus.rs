//! Consensus results, validator votes and confirmed blocks

use crate::timefmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A validator's vote on a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    #[serde(alias = "Commit", alias = "COMMIT")]
    Commit,
    #[serde(alias = "Precommit", alias = "PRECOMMIT", alias = "pre-commit")]
    Precommit,
    #[serde(alias = "Reject", alias = "REJECT")]
    Reject,
}

/// Outcome label of a consensus round
///
/// The server reports localized labels for the terminal states; they decode
/// to the same variants as the English ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusStatus {
    #[serde(alias = "Pending", alias = "", alias = "共识中")]
    Pending,
    #[serde(alias = "Committed", alias = "confirmed", alias = "已确认")]
    Committed,
    #[serde(alias = "Rejected", alias = "failed", alias = "失败")]
    Rejected,
}

impl ConsensusStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConsensusStatus::Pending)
    }
}

/// Vote counts per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub commit: usize,
    pub precommit: usize,
    pub reject: usize,
}

/// The client's view of one transaction's consensus round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResult {
    pub tx_id: String,
    pub status: ConsensusStatus,
    pub validator_votes: BTreeMap<String, Vote>,
    /// Ordering marker across the push and pull channels
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
}

impl ConsensusResult {
    /// Placeholder for a transaction first seen through a push event
    pub fn pending(tx_id: impl Into<String>, sequence: u64) -> Self {
        Self {
            tx_id: tx_id.into(),
            status: ConsensusStatus::Pending,
            validator_votes: BTreeMap::new(),
            sequence,
            failed_reason: None,
        }
    }

    pub fn tally(&self) -> VoteTally {
        let mut tally = VoteTally::default();
        for vote in self.validator_votes.values() {
            match vote {
                Vote::Commit => tally.commit += 1,
                Vote::Precommit => tally.precommit += 1,
                Vote::Reject => tally.reject += 1,
            }
        }
        tally
    }
}

/// Validator entry as returned by `/pbft/result`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorVote {
    pub id: String,
    pub vote: Vote,
}

/// Raw `/pbft/result` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResultWire {
    #[serde(default)]
    pub tx_id: String,
    #[serde(default)]
    pub status: Option<ConsensusStatus>,
    #[serde(default)]
    pub validators: Option<Vec<ValidatorVote>>,
    #[serde(default)]
    pub sequence: Option<u64>,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default, deserialize_with = "timefmt::deserialize_option")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_reason: Option<String>,
}

impl ConsensusResultWire {
    /// Ordering marker for this payload.
    ///
    /// Falls back to the result timestamp, then the block height, when the
    /// server does not send an explicit sequence.
    pub fn effective_sequence(&self) -> u64 {
        if let Some(sequence) = self.sequence {
            return sequence;
        }
        if let Some(ts) = self.timestamp {
            let ms = ts.timestamp_millis();
            if ms > 0 {
                return ms as u64;
            }
        }
        self.block_height.unwrap_or(0)
    }

    /// Convert into the model; a zero-valued payload (empty tx id) means no result yet
    pub fn into_result(self) -> Option<ConsensusResult> {
        if self.tx_id.is_empty() {
            return None;
        }
        let sequence = self.effective_sequence();
        let validator_votes = self
            .validators
            .unwrap_or_default()
            .into_iter()
            .map(|v| (v.id, v.vote))
            .collect();

        Some(ConsensusResult {
            tx_id: self.tx_id,
            status: self.status.unwrap_or(ConsensusStatus::Pending),
            validator_votes,
            sequence,
            failed_reason: self.failed_reason.filter(|r| !r.is_empty()),
        })
    }
}

/// Confirmed transactions on a block: either the ids or only their count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfirmedTxs {
    Ids(Vec<String>),
    Count(u64),
}

impl ConfirmedTxs {
    /// Split into (id set, confirmed count)
    pub fn into_parts(self) -> (BTreeSet<String>, u64) {
        match self {
            ConfirmedTxs::Ids(ids) => {
                let ids: BTreeSet<String> = ids.into_iter().collect();
                let count = ids.len() as u64;
                (ids, count)
            }
            ConfirmedTxs::Count(count) => (BTreeSet::new(), count),
        }
    }
}

/// A confirmed block; only the highest one is ever displayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub height: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub confirmed_tx_ids: BTreeSet<String>,
    /// Number of confirmed transactions; equals the id count when ids are known
    pub confirmed_count: u64,
}

/// Raw `/pbft/block` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockWire {
    #[serde(default)]
    pub height: u64,
    #[serde(default, deserialize_with = "timefmt::deserialize_option")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "confirmedTxIds")]
    pub confirmed_txs: Option<ConfirmedTxs>,
}

impl BlockWire {
    /// Convert into the model; height 0 is the server's "no block yet"
    pub fn into_block(self) -> Option<Block> {
        if self.height == 0 {
            return None;
        }
        let (confirmed_tx_ids, confirmed_count) = self
            .confirmed_txs
            .map(ConfirmedTxs::into_parts)
            .unwrap_or_default();
        Some(Block {
            height: self.height,
            timestamp: self.timestamp,
            confirmed_tx_ids,
            confirmed_count,
        })
    }
}
