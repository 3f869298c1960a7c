//! Consensus view - push channel and state reconciliation
//!
//! Architecture:
//! - `EventChannel` owns the single WebSocket to the consensus feed and
//!   reconnects with capped exponential backoff
//! - `Reconciler` merges REST snapshots and pushed events through one apply
//!   loop into a `ReconciledState`
//! - `QuorumRule` decides what a vote set means; by default only the server
//!   declares outcomes

pub mod backoff;
pub mod channel;
pub mod quorum;
pub mod reconciler;
pub mod state;
pub mod subscriptions;
pub mod types;

pub use backoff::Backoff;
pub use channel::{ChannelError, EventChannel};
pub use quorum::{QuorumRule, ServerAsserted, ThresholdQuorum};
pub use reconciler::Reconciler;
pub use state::{ApplyOutcome, ReconciledState, ReconcilerState, StaleFlags};
pub use subscriptions::{Handler, SubscriptionId, Subscribers};
pub use types::*;
