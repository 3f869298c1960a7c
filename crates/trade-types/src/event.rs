//! Push-channel events
//!
//! Frames on the consensus socket are JSON objects whose kind is implied by
//! the fields present. They are classified exactly once, here, into a tagged
//! [`ConsensusEvent`]. An explicit `kind` (or `type`) field, when sent, pins
//! the classification.

use crate::consensus::{Block, ConfirmedTxs, ConsensusStatus, Vote};
use crate::error::DecodeError;
use crate::timefmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One validator's vote on a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteEvent {
    pub tx_id: String,
    pub validator_id: String,
    pub vote: Vote,
    pub sequence: u64,
    /// Status label the server asserts alongside the vote, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConsensusStatus>,
}

/// The server declared a transaction committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitEvent {
    pub tx_id: String,
    pub sequence: u64,
}

/// A newly confirmed block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEvent {
    pub height: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub confirmed_tx_ids: BTreeSet<String>,
    pub confirmed_count: u64,
}

impl From<BlockEvent> for Block {
    fn from(event: BlockEvent) -> Self {
        Block {
            height: event.height,
            timestamp: event.timestamp,
            confirmed_tx_ids: event.confirmed_tx_ids,
            confirmed_count: event.confirmed_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConsensusEvent {
    Vote(VoteEvent),
    Commit(CommitEvent),
    Block(BlockEvent),
}

/// Every field any frame kind may carry
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(default, alias = "type")]
    kind: Option<String>,
    tx_id: Option<String>,
    #[serde(alias = "nodeId", alias = "validator")]
    validator_id: Option<String>,
    vote: Option<Vote>,
    sequence: Option<u64>,
    status: Option<ConsensusStatus>,
    height: Option<u64>,
    #[serde(default, deserialize_with = "timefmt::deserialize_option")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(alias = "confirmedTxs")]
    confirmed_tx_ids: Option<ConfirmedTxs>,
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, DecodeError> {
    value.ok_or(DecodeError::MissingField(field))
}

fn required_id(value: Option<String>, field: &'static str) -> Result<String, DecodeError> {
    match value {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(DecodeError::MissingField(field)),
    }
}

impl RawFrame {
    fn into_vote(self) -> Result<ConsensusEvent, DecodeError> {
        Ok(ConsensusEvent::Vote(VoteEvent {
            tx_id: required_id(self.tx_id, "txId")?,
            validator_id: required_id(self.validator_id, "validatorId")?,
            vote: required(self.vote, "vote")?,
            sequence: required(self.sequence, "sequence")?,
            status: self.status,
        }))
    }

    fn into_commit(self) -> Result<ConsensusEvent, DecodeError> {
        Ok(ConsensusEvent::Commit(CommitEvent {
            tx_id: required_id(self.tx_id, "txId")?,
            sequence: required(self.sequence, "sequence")?,
        }))
    }

    fn into_block(self) -> Result<ConsensusEvent, DecodeError> {
        let (confirmed_tx_ids, confirmed_count) = self
            .confirmed_tx_ids
            .map(ConfirmedTxs::into_parts)
            .unwrap_or_default();
        Ok(ConsensusEvent::Block(BlockEvent {
            height: required(self.height, "height")?,
            timestamp: self.timestamp,
            confirmed_tx_ids,
            confirmed_count,
        }))
    }

    fn classify(self) -> Result<ConsensusEvent, DecodeError> {
        match self.kind.as_deref() {
            Some("vote") => self.into_vote(),
            Some("commit") => self.into_commit(),
            Some("block") => self.into_block(),
            Some(other) => Err(DecodeError::UnknownKind(other.to_string())),
            None if self.height.is_some() => self.into_block(),
            None if self.vote.is_some() || self.validator_id.is_some() => self.into_vote(),
            None if self.tx_id.is_some() => self.into_commit(),
            None => Err(DecodeError::Unclassified),
        }
    }
}

impl ConsensusEvent {
    /// Decode a text frame
    pub fn decode(frame: &str) -> Result<Self, DecodeError> {
        let raw: RawFrame = serde_json::from_str(frame)?;
        raw.classify()
    }

    /// Decode a binary frame carrying UTF-8 JSON
    pub fn decode_bytes(frame: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(frame).map_err(|_| DecodeError::Utf8)?;
        Self::decode(text)
    }

    /// Transaction this event refers to; blocks refer to none
    pub fn tx_id(&self) -> Option<&str> {
        match self {
            ConsensusEvent::Vote(e) => Some(&e.tx_id),
            ConsensusEvent::Commit(e) => Some(&e.tx_id),
            ConsensusEvent::Block(_) => None,
        }
    }
}
