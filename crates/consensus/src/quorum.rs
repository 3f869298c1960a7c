//! Quorum policy - maps a vote set to a consensus status
//!
//! The client observes consensus; it does not run it. Which vote sets count
//! as an outcome is a deployment decision, so it is injected here.

use pbft_trade_types::{ConsensusStatus, Vote};
use std::collections::BTreeMap;

/// Status derivation from the full vote set of one transaction
pub trait QuorumRule: Send + Sync {
    fn evaluate(&self, votes: &BTreeMap<String, Vote>) -> ConsensusStatus;
}

/// Leave outcomes to the server: votes alone never produce a terminal status
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerAsserted;

impl QuorumRule for ServerAsserted {
    fn evaluate(&self, _votes: &BTreeMap<String, Vote>) -> ConsensusStatus {
        ConsensusStatus::Pending
    }
}

/// Fixed vote-count thresholds supplied by the deployment
#[derive(Debug, Clone, Copy)]
pub struct ThresholdQuorum {
    /// Commit votes needed to report `Committed`
    pub commit: usize,
    /// Reject votes needed to report `Rejected`
    pub reject: usize,
}

impl ThresholdQuorum {
    /// Classic PBFT sizing for `n = 3f + 1` validators: `2f + 1` commits
    /// commit, `f + 1` rejects make commit impossible
    pub fn for_faults(f: usize) -> Self {
        Self {
            commit: 2 * f + 1,
            reject: f + 1,
        }
    }
}

impl QuorumRule for ThresholdQuorum {
    fn evaluate(&self, votes: &BTreeMap<String, Vote>) -> ConsensusStatus {
        let commits = votes.values().filter(|v| **v == Vote::Commit).count();
        let rejects = votes.values().filter(|v| **v == Vote::Reject).count();

        if self.commit > 0 && commits >= self.commit {
            ConsensusStatus::Committed
        } else if self.reject > 0 && rejects >= self.reject {
            ConsensusStatus::Rejected
        } else {
            ConsensusStatus::Pending
        }
    }
}
