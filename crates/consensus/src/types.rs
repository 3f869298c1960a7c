//! Core types for the push channel and the reconciler

use serde::Serialize;
use std::time::Duration;

/// Connection state of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// Not running; terminal once `stop()` has been called
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Handshake done, reading frames
    Connected,
    /// Waiting out the backoff delay before the next handshake
    Reconnecting,
}

/// Channel state plus the number of successful handshakes so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub state: ChannelState,
    /// Incremented on every successful handshake; epoch 1 is the first connection
    pub epoch: u64,
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self {
            state: ChannelState::Disconnected,
            epoch: 0,
        }
    }
}

/// Configuration for the push channel
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket endpoint
    pub url: String,
    /// Delay before the first reconnect attempt
    pub initial_backoff: Duration,
    /// Ceiling on the reconnect delay
    pub max_backoff: Duration,
    /// Growth factor per failed attempt
    pub backoff_multiplier: f64,
    /// Random spread added to each delay, as a fraction of it
    pub jitter: f64,
    /// Bound on the handshake
    pub handshake_timeout: Duration,
    /// Silence after which the connection counts as dead. A ping goes out
    /// halfway through; `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:5000/pbft/ws".to_string(),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.1,
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Configuration for the reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Bound on a single snapshot fetch
    pub fetch_timeout: Duration,
    /// Retries of a retryable fetch failure before the slice is flagged stale
    pub max_fetch_retries: u32,
    /// First retry delay; doubles per attempt
    pub retry_backoff: Duration,
    /// Ceiling on the retry delay
    pub max_retry_backoff: Duration,
    /// Consensus results kept; lowest sequences are evicted first
    pub max_tracked_results: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            max_fetch_retries: 3,
            retry_backoff: Duration::from_millis(250),
            max_retry_backoff: Duration::from_secs(5),
            max_tracked_results: 256,
        }
    }
}

/// Counters about reconciler activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilerStats {
    pub events_applied: u64,
    pub snapshots_applied: u64,
    /// Updates dropped because a newer sequence/height was already shown
    pub stale_discarded: u64,
    /// Fetch responses dropped because a newer request was issued
    pub superseded_responses: u64,
    pub fetches_issued: u64,
    pub fetch_failures: u64,
    pub refetches_after_reconnect: u64,
}
