//! Shared types for the PBFT trade client
//!
//! This crate holds the data model observed by the client:
//! - Consensus results, validator votes and confirmed blocks
//! - Trade history records and balance snapshots
//! - Push-channel events, decoded once at the channel boundary

pub mod consensus;
pub mod error;
pub mod event;
pub mod snapshot;
pub mod timefmt;
pub mod trade;

pub use consensus::{
    Block, BlockWire, ConfirmedTxs, ConsensusResult, ConsensusResultWire, ConsensusStatus,
    ValidatorVote, Vote, VoteTally,
};
pub use error::DecodeError;
pub use event::{BlockEvent, CommitEvent, ConsensusEvent, VoteEvent};
pub use snapshot::{ConsensusSnapshot, Snapshot, SnapshotKind};
pub use trade::{BalanceResponse, HistoryResponse, TradeRecord, TradeStatus, TradeType};

/// Opaque session identity attached to every authenticated request
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Identity {
    /// Opaque bearer token, never inspected by the client
    pub token: String,
    /// Username the token was issued for
    pub username: String,
}

impl Identity {
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            username: username.into(),
        }
    }
}

// Keep tokens out of logs.
impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}
