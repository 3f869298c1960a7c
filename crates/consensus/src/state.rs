//! Reconciled state and the merge rules for pulls and pushes
//!
//! Everything here is synchronous and owned by the reconciler's apply loop.
//! The visible state depends only on which snapshots and events were applied
//! and their sequence/height, never on which source delivered first.

use crate::quorum::QuorumRule;
use crate::types::ReconcilerStats;
use pbft_trade_types::{
    Block, CommitEvent, ConsensusEvent, ConsensusResult, ConsensusStatus, Snapshot, SnapshotKind,
    TradeRecord, VoteEvent,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// What applying one input did to the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Visible state changed
    Changed,
    /// Accepted, but the visible state was already equal
    Unchanged,
    /// A newer sequence or height was already held; the input was dropped
    StaleWriteDiscarded,
    /// Response to a fetch that is no longer the latest for its kind
    Superseded,
}

impl ApplyOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, ApplyOutcome::Changed)
    }

    // Changed wins over a discard, a discard over a plain no-op
    fn merge(self, other: ApplyOutcome) -> ApplyOutcome {
        use ApplyOutcome::*;
        match (self, other) {
            (Changed, _) | (_, Changed) => Changed,
            (StaleWriteDiscarded, _) | (_, StaleWriteDiscarded) => StaleWriteDiscarded,
            (Superseded, _) | (_, Superseded) => Superseded,
            _ => Unchanged,
        }
    }
}

/// Per-slice flag set when fetching kept failing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StaleFlags {
    pub balance: bool,
    pub history: bool,
    pub consensus: bool,
}

impl StaleFlags {
    pub fn get(&self, kind: SnapshotKind) -> bool {
        match kind {
            SnapshotKind::Balance => self.balance,
            SnapshotKind::History => self.history,
            SnapshotKind::Consensus => self.consensus,
        }
    }

    fn set(&mut self, kind: SnapshotKind, stale: bool) -> bool {
        let flag = match kind {
            SnapshotKind::Balance => &mut self.balance,
            SnapshotKind::History => &mut self.history,
            SnapshotKind::Consensus => &mut self.consensus,
        };
        let changed = *flag != stale;
        *flag = stale;
        changed
    }

    pub fn any(&self) -> bool {
        self.balance || self.history || self.consensus
    }
}

/// Read-only copy of the reconciled view
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciledState {
    /// Result with the highest sequence across all tracked transactions
    pub result: Option<ConsensusResult>,
    /// Every tracked result by tx id
    pub results: BTreeMap<String, ConsensusResult>,
    /// Highest block seen
    pub block: Option<Block>,
    pub history: Vec<TradeRecord>,
    pub balance: Option<f64>,
    pub stale: StaleFlags,
    /// The server rejected the identity; a fresh login is needed
    pub auth_required: bool,
}

#[derive(Debug, Clone)]
struct TrackedResult {
    result: ConsensusResult,
    /// Last terminal status the server asserted
    asserted: Option<ConsensusStatus>,
    /// Sequence of the last wholesale snapshot; older votes are dropped
    snapshot_floor: u64,
    /// Sequence of each validator's recorded vote
    vote_sequences: BTreeMap<String, u64>,
}

impl TrackedResult {
    fn placeholder(tx_id: &str) -> Self {
        Self {
            result: ConsensusResult::pending(tx_id, 0),
            asserted: None,
            snapshot_floor: 0,
            vote_sequences: BTreeMap::new(),
        }
    }

    fn from_snapshot(result: ConsensusResult) -> Self {
        let asserted = Some(result.status).filter(ConsensusStatus::is_terminal);
        let vote_sequences = result
            .validator_votes
            .keys()
            .map(|id| (id.clone(), result.sequence))
            .collect();
        Self {
            snapshot_floor: result.sequence,
            asserted,
            vote_sequences,
            result,
        }
    }
}

/// Mutable state behind the reconciler's single apply path
pub struct ReconcilerState {
    results: BTreeMap<String, TrackedResult>,
    block: Option<Block>,
    history: Vec<TradeRecord>,
    balance: Option<f64>,
    /// Latest request id issued per snapshot kind
    latest_request: BTreeMap<SnapshotKind, u64>,
    next_request_id: u64,
    stale: StaleFlags,
    auth_required: bool,
    max_tracked_results: usize,
    stats: ReconcilerStats,
}

impl ReconcilerState {
    pub fn new(max_tracked_results: usize) -> Self {
        Self {
            results: BTreeMap::new(),
            block: None,
            history: Vec::new(),
            balance: None,
            latest_request: BTreeMap::new(),
            next_request_id: 0,
            stale: StaleFlags::default(),
            auth_required: false,
            max_tracked_results: max_tracked_results.max(1),
            stats: ReconcilerStats::default(),
        }
    }

    /// Issue a request id for a new fetch of `kind`, superseding any
    /// outstanding one
    pub fn begin_fetch(&mut self, kind: SnapshotKind) -> u64 {
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        self.latest_request.insert(kind, request_id);
        self.stats.fetches_issued += 1;
        request_id
    }

    pub fn is_latest(&self, kind: SnapshotKind, request_id: u64) -> bool {
        self.latest_request.get(&kind) == Some(&request_id)
    }

    /// Apply a fetched snapshot tagged with the request id it answers
    pub fn apply_snapshot(&mut self, request_id: u64, snapshot: Snapshot) -> ApplyOutcome {
        let kind = snapshot.kind();
        if !self.is_latest(kind, request_id) {
            self.stats.superseded_responses += 1;
            tracing::debug!("Dropping superseded {} response (request {})", kind, request_id);
            return ApplyOutcome::Superseded;
        }

        self.stats.snapshots_applied += 1;
        let cleared = self.clear_failure_flags(kind);

        let applied = match snapshot {
            Snapshot::Balance(balance) => {
                if self.balance == Some(balance) {
                    ApplyOutcome::Unchanged
                } else {
                    self.balance = Some(balance);
                    ApplyOutcome::Changed
                }
            }
            Snapshot::History(records) => {
                if self.history == records {
                    ApplyOutcome::Unchanged
                } else {
                    self.history = records;
                    ApplyOutcome::Changed
                }
            }
            Snapshot::Consensus(consensus) => {
                let mut merged = ApplyOutcome::Unchanged;
                for result in consensus.results {
                    merged = merged.merge(self.merge_result_snapshot(result));
                }
                if let Some(block) = consensus.block {
                    merged = merged.merge(self.apply_block(block));
                }
                self.evict();
                merged
            }
        };

        cleared.merge(applied)
    }

    /// Apply one push event
    pub fn apply_event(&mut self, event: &ConsensusEvent, rule: &dyn QuorumRule) -> ApplyOutcome {
        let outcome = match event {
            ConsensusEvent::Vote(vote) => self.apply_vote(vote, rule),
            ConsensusEvent::Commit(commit) => self.apply_commit(commit),
            ConsensusEvent::Block(block) => self.apply_block(block.clone().into()),
        };
        if outcome != ApplyOutcome::StaleWriteDiscarded {
            self.stats.events_applied += 1;
        }
        self.evict();
        outcome
    }

    /// Flag a slice whose fetch gave up
    pub fn mark_stale(&mut self, kind: SnapshotKind) -> ApplyOutcome {
        self.stats.fetch_failures += 1;
        if self.stale.set(kind, true) {
            tracing::warn!("{} data is stale; keeping last known state", kind);
            ApplyOutcome::Changed
        } else {
            ApplyOutcome::Unchanged
        }
    }

    /// Record that the server rejected the identity
    pub fn mark_auth_required(&mut self) -> ApplyOutcome {
        self.stats.fetch_failures += 1;
        if self.auth_required {
            return ApplyOutcome::Unchanged;
        }
        self.auth_required = true;
        tracing::warn!("Server rejected the session identity; login required");
        ApplyOutcome::Changed
    }

    /// Count a fetch attempt that failed but will be retried
    pub fn note_retry(&mut self) {
        self.stats.fetch_failures += 1;
    }

    pub fn note_reconnect_refetch(&mut self) {
        self.stats.refetches_after_reconnect += 1;
    }

    pub fn stats(&self) -> &ReconcilerStats {
        &self.stats
    }

    /// Copy of the visible state
    pub fn view(&self) -> ReconciledState {
        let results: BTreeMap<String, ConsensusResult> = self
            .results
            .iter()
            .map(|(tx_id, tracked)| (tx_id.clone(), tracked.result.clone()))
            .collect();
        let result = results
            .values()
            .max_by(|a, b| (a.sequence, &a.tx_id).cmp(&(b.sequence, &b.tx_id)))
            .cloned();

        ReconciledState {
            result,
            results,
            block: self.block.clone(),
            history: self.history.clone(),
            balance: self.balance,
            stale: self.stale,
            auth_required: self.auth_required,
        }
    }

    fn clear_failure_flags(&mut self, kind: SnapshotKind) -> ApplyOutcome {
        let mut changed = self.stale.set(kind, false);
        if self.auth_required {
            self.auth_required = false;
            changed = true;
        }
        if changed {
            ApplyOutcome::Changed
        } else {
            ApplyOutcome::Unchanged
        }
    }

    /// Replace one tx's result wholesale unless a newer one is held
    fn merge_result_snapshot(&mut self, result: ConsensusResult) -> ApplyOutcome {
        if let Some(existing) = self.results.get(&result.tx_id) {
            if existing.result.sequence > result.sequence {
                self.stats.stale_discarded += 1;
                tracing::debug!(
                    "Discarding stale pull for {} (sequence {} < {})",
                    result.tx_id,
                    result.sequence,
                    existing.result.sequence
                );
                return ApplyOutcome::StaleWriteDiscarded;
            }
            if existing.result == result {
                let tracked = TrackedResult::from_snapshot(result);
                self.results.insert(tracked.result.tx_id.clone(), tracked);
                return ApplyOutcome::Unchanged;
            }
        } else if self.beyond_retention(&result.tx_id, result.sequence) {
            return ApplyOutcome::StaleWriteDiscarded;
        }

        let tracked = TrackedResult::from_snapshot(result);
        self.results.insert(tracked.result.tx_id.clone(), tracked);
        ApplyOutcome::Changed
    }

    fn apply_vote(&mut self, event: &VoteEvent, rule: &dyn QuorumRule) -> ApplyOutcome {
        if self.beyond_retention(&event.tx_id, event.sequence) {
            return ApplyOutcome::StaleWriteDiscarded;
        }
        let tracked = self
            .results
            .entry(event.tx_id.clone())
            .or_insert_with(|| TrackedResult::placeholder(&event.tx_id));

        let validator_floor = tracked
            .vote_sequences
            .get(&event.validator_id)
            .copied()
            .unwrap_or(0);
        if event.sequence < tracked.snapshot_floor || event.sequence < validator_floor {
            self.stats.stale_discarded += 1;
            tracing::debug!(
                "Discarding stale vote from {} on {} (sequence {})",
                event.validator_id,
                event.tx_id,
                event.sequence
            );
            return ApplyOutcome::StaleWriteDiscarded;
        }

        let before = tracked.result.clone();
        tracked
            .result
            .validator_votes
            .insert(event.validator_id.clone(), event.vote);
        tracked
            .vote_sequences
            .insert(event.validator_id.clone(), event.sequence);
        tracked.result.sequence = tracked.result.sequence.max(event.sequence);
        if let Some(status) = event.status.filter(ConsensusStatus::is_terminal) {
            tracked.asserted = Some(status);
        }
        tracked.result.status = tracked
            .asserted
            .unwrap_or_else(|| rule.evaluate(&tracked.result.validator_votes));

        if tracked.result == before {
            ApplyOutcome::Unchanged
        } else {
            ApplyOutcome::Changed
        }
    }

    fn apply_commit(&mut self, event: &CommitEvent) -> ApplyOutcome {
        if self.beyond_retention(&event.tx_id, event.sequence) {
            return ApplyOutcome::StaleWriteDiscarded;
        }
        let tracked = self
            .results
            .entry(event.tx_id.clone())
            .or_insert_with(|| TrackedResult::placeholder(&event.tx_id));

        if event.sequence < tracked.snapshot_floor {
            self.stats.stale_discarded += 1;
            tracing::debug!(
                "Discarding stale commit for {} (sequence {} < {})",
                event.tx_id,
                event.sequence,
                tracked.snapshot_floor
            );
            return ApplyOutcome::StaleWriteDiscarded;
        }

        let before = tracked.result.clone();
        tracked.asserted = Some(ConsensusStatus::Committed);
        tracked.result.status = ConsensusStatus::Committed;
        tracked.result.sequence = tracked.result.sequence.max(event.sequence);

        if tracked.result == before {
            ApplyOutcome::Unchanged
        } else {
            ApplyOutcome::Changed
        }
    }

    fn apply_block(&mut self, block: Block) -> ApplyOutcome {
        if let Some(current) = &self.block {
            if block.height <= current.height {
                if block.height < current.height || *current != block {
                    self.stats.stale_discarded += 1;
                    tracing::debug!(
                        "Discarding block {} (showing {})",
                        block.height,
                        current.height
                    );
                    return ApplyOutcome::StaleWriteDiscarded;
                }
                return ApplyOutcome::Unchanged;
            }
        }
        tracing::debug!("Block {} is now current", block.height);
        self.block = Some(block);
        ApplyOutcome::Changed
    }

    /// True when an untracked tx at `sequence` would be the first evicted,
    /// so inserting it could never become visible
    fn beyond_retention(&mut self, tx_id: &str, sequence: u64) -> bool {
        if self.results.len() < self.max_tracked_results || self.results.contains_key(tx_id) {
            return false;
        }
        let below_all = self
            .results
            .values()
            .all(|tracked| (sequence, tx_id) < (tracked.result.sequence, tracked.result.tx_id.as_str()));
        if below_all {
            self.stats.stale_discarded += 1;
            tracing::debug!(
                "Discarding {} at sequence {}; older than every retained result",
                tx_id,
                sequence
            );
        }
        below_all
    }

    fn evict(&mut self) {
        while self.results.len() > self.max_tracked_results {
            let oldest = self
                .results
                .values()
                .min_by(|a, b| {
                    (a.result.sequence, &a.result.tx_id).cmp(&(b.result.sequence, &b.result.tx_id))
                })
                .map(|tracked| tracked.result.tx_id.clone());
            match oldest {
                Some(tx_id) => {
                    tracing::debug!("Evicting consensus result for {}", tx_id);
                    self.results.remove(&tx_id);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quorum::{ServerAsserted, ThresholdQuorum};
    use chrono::TimeZone;
    use pbft_trade_types::{
        BlockEvent, ConsensusSnapshot, TradeStatus, TradeType, Vote,
    };
    use std::collections::BTreeSet;

    fn vote(tx: &str, validator: &str, vote: Vote, sequence: u64) -> ConsensusEvent {
        ConsensusEvent::Vote(VoteEvent {
            tx_id: tx.into(),
            validator_id: validator.into(),
            vote,
            sequence,
            status: None,
        })
    }

    fn commit(tx: &str, sequence: u64) -> ConsensusEvent {
        ConsensusEvent::Commit(CommitEvent {
            tx_id: tx.into(),
            sequence,
        })
    }

    fn block_event(height: u64) -> ConsensusEvent {
        ConsensusEvent::Block(BlockEvent {
            height,
            timestamp: None,
            confirmed_tx_ids: BTreeSet::from(["tx1".to_string()]),
            confirmed_count: 1,
        })
    }

    fn pulled(tx: &str, status: ConsensusStatus, votes: &[(&str, Vote)], sequence: u64) -> ConsensusResult {
        ConsensusResult {
            tx_id: tx.into(),
            status,
            validator_votes: votes.iter().map(|(id, v)| (id.to_string(), *v)).collect(),
            sequence,
            failed_reason: None,
        }
    }

    fn consensus(results: Vec<ConsensusResult>) -> Snapshot {
        Snapshot::Consensus(ConsensusSnapshot {
            results,
            block: None,
        })
    }

    fn record(amount: f64) -> TradeRecord {
        TradeRecord {
            trade_type: TradeType::Buy,
            amount,
            price: None,
            node: None,
            time: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            status: TradeStatus::Success,
        }
    }

    fn apply(state: &mut ReconcilerState, snapshot: Snapshot) -> ApplyOutcome {
        let id = state.begin_fetch(snapshot.kind());
        state.apply_snapshot(id, snapshot)
    }

    #[test]
    fn test_two_votes_from_empty_state() {
        let mut state = ReconcilerState::new(16);
        state.apply_event(&vote("tx1", "v1", Vote::Commit, 1), &ServerAsserted);
        state.apply_event(&vote("tx1", "v2", Vote::Commit, 2), &ServerAsserted);

        let view = state.view();
        let tx1 = view.results.get("tx1").unwrap();
        assert_eq!(tx1.sequence, 2);
        assert_eq!(tx1.tally().commit, 2);
        assert_eq!(tx1.status, ConsensusStatus::Pending);
        assert_eq!(view.result.as_ref(), Some(tx1));
    }

    #[test]
    fn test_vote_interleavings_converge() {
        let rule = ThresholdQuorum::for_faults(1);
        let a = [
            vote("tx1", "v1", Vote::Commit, 1),
            vote("tx1", "v2", Vote::Precommit, 2),
            vote("tx1", "v1", Vote::Reject, 3),
            vote("tx1", "v3", Vote::Commit, 3),
            vote("tx1", "v2", Vote::Commit, 4),
        ];
        // Same multiset, equal sequences swapped
        let b = [
            a[0].clone(),
            a[1].clone(),
            a[3].clone(),
            a[2].clone(),
            a[4].clone(),
        ];

        let mut first = ReconcilerState::new(16);
        let mut second = ReconcilerState::new(16);
        for event in &a {
            first.apply_event(event, &rule);
        }
        for event in &b {
            second.apply_event(event, &rule);
        }

        let view = first.view();
        assert_eq!(view, second.view());
        let tx1 = view.results.get("tx1").unwrap();
        assert_eq!(tx1.validator_votes.get("v1"), Some(&Vote::Reject));
        assert_eq!(tx1.validator_votes.get("v2"), Some(&Vote::Commit));
        assert_eq!(tx1.validator_votes.get("v3"), Some(&Vote::Commit));
        // Two commits, one reject: below both thresholds
        assert_eq!(tx1.status, ConsensusStatus::Pending);
    }

    #[test]
    fn test_older_vote_from_same_validator_is_dropped() {
        let mut state = ReconcilerState::new(16);
        state.apply_event(&vote("tx1", "v1", Vote::Reject, 5), &ServerAsserted);
        let outcome = state.apply_event(&vote("tx1", "v1", Vote::Commit, 4), &ServerAsserted);

        assert_eq!(outcome, ApplyOutcome::StaleWriteDiscarded);
        let view = state.view();
        assert_eq!(view.results["tx1"].validator_votes["v1"], Vote::Reject);
        assert_eq!(state.stats().stale_discarded, 1);
    }

    #[test]
    fn test_threshold_rule_derives_status() {
        let rule = ThresholdQuorum::for_faults(1);
        let mut state = ReconcilerState::new(16);
        for (i, validator) in ["v1", "v2", "v3"].iter().enumerate() {
            state.apply_event(&vote("tx1", validator, Vote::Commit, i as u64 + 1), &rule);
        }
        assert_eq!(state.view().results["tx1"].status, ConsensusStatus::Committed);
    }

    #[test]
    fn test_asserted_status_on_vote_frame() {
        let mut state = ReconcilerState::new(16);
        let event = ConsensusEvent::Vote(VoteEvent {
            tx_id: "tx1".into(),
            validator_id: "v1".into(),
            vote: Vote::Reject,
            sequence: 3,
            status: Some(ConsensusStatus::Rejected),
        });
        state.apply_event(&event, &ServerAsserted);
        state.apply_event(&vote("tx1", "v2", Vote::Commit, 4), &ServerAsserted);
        assert_eq!(state.view().results["tx1"].status, ConsensusStatus::Rejected);
    }

    #[test]
    fn test_lower_block_is_a_no_op() {
        let mut state = ReconcilerState::new(16);
        assert!(state.apply_event(&block_event(12), &ServerAsserted).is_changed());
        let before = state.view();

        assert_eq!(
            state.apply_event(&block_event(11), &ServerAsserted),
            ApplyOutcome::StaleWriteDiscarded
        );
        assert_eq!(state.apply_event(&block_event(12), &ServerAsserted), ApplyOutcome::Unchanged);
        assert_eq!(state.view(), before);

        assert!(state.apply_event(&block_event(13), &ServerAsserted).is_changed());
        assert_eq!(state.view().block.unwrap().height, 13);
    }

    #[test]
    fn test_block_from_slow_pull_is_dropped() {
        let mut state = ReconcilerState::new(16);
        state.apply_event(&block_event(20), &ServerAsserted);

        let snapshot = Snapshot::Consensus(ConsensusSnapshot {
            results: vec![],
            block: Some(Block {
                height: 19,
                timestamp: None,
                confirmed_tx_ids: BTreeSet::new(),
                confirmed_count: 4,
            }),
        });
        assert_eq!(apply(&mut state, snapshot), ApplyOutcome::StaleWriteDiscarded);
        assert_eq!(state.view().block.unwrap().height, 20);
    }

    #[test]
    fn test_identical_snapshot_is_idempotent() {
        let mut state = ReconcilerState::new(16);
        let s1 = pulled("tx1", ConsensusStatus::Pending, &[("v1", Vote::Commit)], 5);

        assert!(apply(&mut state, consensus(vec![s1.clone()])).is_changed());
        let before = state.view();
        assert_eq!(apply(&mut state, consensus(vec![s1])), ApplyOutcome::Unchanged);
        assert_eq!(state.view(), before);
    }

    #[test]
    fn test_pull_older_than_commit_is_discarded() {
        let mut state = ReconcilerState::new(16);
        state.apply_event(&commit("tx1", 10), &ServerAsserted);

        let stale = pulled("tx1", ConsensusStatus::Pending, &[("v1", Vote::Precommit)], 7);
        let fresh = pulled("tx2", ConsensusStatus::Committed, &[("v1", Vote::Commit)], 8);
        let outcome = apply(&mut state, consensus(vec![stale, fresh]));

        // tx2 in the same snapshot still applies
        assert_eq!(outcome, ApplyOutcome::Changed);
        let view = state.view();
        assert_eq!(view.results["tx1"].sequence, 10);
        assert_eq!(view.results["tx1"].status, ConsensusStatus::Committed);
        assert!(view.results["tx1"].validator_votes.is_empty());
        assert_eq!(view.results["tx2"].status, ConsensusStatus::Committed);
        assert_eq!(view.result.unwrap().tx_id, "tx1");
    }

    #[test]
    fn test_snapshot_replaces_wholesale() {
        let mut state = ReconcilerState::new(16);
        state.apply_event(&vote("tx1", "v1", Vote::Commit, 1), &ServerAsserted);
        state.apply_event(&vote("tx1", "v2", Vote::Reject, 2), &ServerAsserted);

        let snapshot = pulled("tx1", ConsensusStatus::Committed, &[("v3", Vote::Commit)], 6);
        apply(&mut state, consensus(vec![snapshot.clone()]));
        assert_eq!(state.view().results["tx1"], snapshot);

        // Votes older than the snapshot no longer apply
        assert_eq!(
            state.apply_event(&vote("tx1", "v4", Vote::Reject, 5), &ServerAsserted),
            ApplyOutcome::StaleWriteDiscarded
        );
        // Newer ones do, keeping the asserted status
        state.apply_event(&vote("tx1", "v4", Vote::Reject, 7), &ServerAsserted);
        let tx1 = &state.view().results["tx1"];
        assert_eq!(tx1.validator_votes.len(), 2);
        assert_eq!(tx1.status, ConsensusStatus::Committed);
        assert_eq!(tx1.sequence, 7);
    }

    #[test]
    fn test_last_requested_wins() {
        let mut state = ReconcilerState::new(16);
        let first = state.begin_fetch(SnapshotKind::History);
        let second = state.begin_fetch(SnapshotKind::History);
        assert!(second > first);

        assert!(state
            .apply_snapshot(second, Snapshot::History(vec![record(2.0)]))
            .is_changed());
        assert_eq!(
            state.apply_snapshot(first, Snapshot::History(vec![record(1.0)])),
            ApplyOutcome::Superseded
        );

        assert_eq!(state.view().history, vec![record(2.0)]);
        assert_eq!(state.stats().superseded_responses, 1);
    }

    #[test]
    fn test_request_ids_are_per_kind() {
        let mut state = ReconcilerState::new(16);
        let balance = state.begin_fetch(SnapshotKind::Balance);
        state.begin_fetch(SnapshotKind::History);
        assert!(state.apply_snapshot(balance, Snapshot::Balance(40.0)).is_changed());
        assert_eq!(state.view().balance, Some(40.0));
    }

    #[test]
    fn test_stale_flag_keeps_state_and_clears_on_success() {
        let mut state = ReconcilerState::new(16);
        apply(&mut state, Snapshot::Balance(100.0));

        assert!(state.mark_stale(SnapshotKind::Balance).is_changed());
        assert_eq!(state.mark_stale(SnapshotKind::Balance), ApplyOutcome::Unchanged);
        let view = state.view();
        assert!(view.stale.balance);
        assert_eq!(view.balance, Some(100.0));

        // Same value, but the flag clears
        assert!(apply(&mut state, Snapshot::Balance(100.0)).is_changed());
        assert!(!state.view().stale.any());
    }

    #[test]
    fn test_auth_flag() {
        let mut state = ReconcilerState::new(16);
        assert!(state.mark_auth_required().is_changed());
        assert!(state.view().auth_required);
        apply(&mut state, Snapshot::History(vec![]));
        assert!(!state.view().auth_required);
    }

    #[test]
    fn test_history_replaced_not_patched() {
        let mut state = ReconcilerState::new(16);
        apply(&mut state, Snapshot::History(vec![record(1.0), record(2.0)]));
        apply(&mut state, Snapshot::History(vec![record(3.0)]));
        assert_eq!(state.view().history, vec![record(3.0)]);
    }

    #[test]
    fn test_eviction_drops_lowest_sequence() {
        let mut state = ReconcilerState::new(2);
        state.apply_event(&commit("tx1", 1), &ServerAsserted);
        state.apply_event(&commit("tx2", 5), &ServerAsserted);
        state.apply_event(&commit("tx3", 3), &ServerAsserted);

        let view = state.view();
        assert_eq!(view.results.len(), 2);
        assert!(!view.results.contains_key("tx1"));
        assert_eq!(view.result.unwrap().tx_id, "tx2");
    }

    #[test]
    fn test_result_older_than_retention_is_not_a_change() {
        let mut state = ReconcilerState::new(2);
        state.apply_event(&commit("tx2", 10), &ServerAsserted);
        state.apply_event(&commit("tx3", 20), &ServerAsserted);
        state.apply_event(&commit("tx4", 30), &ServerAsserted);
        let before = state.view();

        let outcome = apply(
            &mut state,
            consensus(vec![pulled("tx1", ConsensusStatus::Committed, &[], 7)]),
        );
        assert_eq!(outcome, ApplyOutcome::StaleWriteDiscarded);
        assert_eq!(state.view(), before);

        let outcome = state.apply_event(&vote("tx0", "v1", Vote::Commit, 5), &ServerAsserted);
        assert_eq!(outcome, ApplyOutcome::StaleWriteDiscarded);
        assert_eq!(state.view(), before);

        // A newer tx still displaces the oldest one
        let outcome = apply(
            &mut state,
            consensus(vec![pulled("tx5", ConsensusStatus::Committed, &[], 40)]),
        );
        assert!(outcome.is_changed());
        assert!(!state.view().results.contains_key("tx3"));
    }
}
