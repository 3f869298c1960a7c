//! Full-replacement payloads fetched over REST

use crate::consensus::{Block, ConsensusResult};
use crate::trade::TradeRecord;
use serde::Serialize;

/// The independently refreshed slices of client state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Balance,
    History,
    Consensus,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 3] = [
        SnapshotKind::Balance,
        SnapshotKind::History,
        SnapshotKind::Consensus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Balance => "balance",
            SnapshotKind::History => "history",
            SnapshotKind::Consensus => "consensus",
        }
    }
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consensus pull: the results the server reported plus its latest block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsensusSnapshot {
    pub results: Vec<ConsensusResult>,
    pub block: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Balance(f64),
    History(Vec<TradeRecord>),
    Consensus(ConsensusSnapshot),
}

impl Snapshot {
    pub fn kind(&self) -> SnapshotKind {
        match self {
            Snapshot::Balance(_) => SnapshotKind::Balance,
            Snapshot::History(_) => SnapshotKind::History,
            Snapshot::Consensus(_) => SnapshotKind::Consensus,
        }
    }
}
