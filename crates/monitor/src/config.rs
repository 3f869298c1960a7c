//! Monitor Configuration

use pbft_api_client::ApiConfig;
use pbft_consensus_view::{ChannelConfig, ReconcilerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Vote thresholds for deployments that let the client derive outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumThresholds {
    pub commit: usize,
    pub reject: usize,
}

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// REST prefix of the trade server
    pub api_url: String,
    /// Consensus feed WebSocket URL
    pub ws_url: String,
    /// Drop a feed connection silent for this many seconds (0 = never)
    pub feed_idle_secs: u64,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Send `username` as a query parameter as well as the bearer token
    pub legacy_username_query: bool,
    /// Directory holding the persisted login
    pub data_dir: PathBuf,
    /// Manual refresh of all slices every N seconds (0 = off)
    pub refresh_secs: u64,
    pub fetch_retries: u32,
    /// Without thresholds only the server decides outcomes
    pub quorum: Option<QuorumThresholds>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5000/api".to_string(),
            ws_url: "ws://127.0.0.1:5000/pbft/ws".to_string(),
            feed_idle_secs: 60,
            request_timeout_ms: 5000,
            legacy_username_query: true,
            data_dir: PathBuf::from("./data"),
            refresh_secs: 0,
            fetch_retries: 3,
            quorum: None,
        }
    }
}

impl MonitorConfig {
    /// Read a JSON config file; missing fields take their defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api_url.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            legacy_username_query: self.legacy_username_query,
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.ws_url.clone(),
            idle_timeout: (self.feed_idle_secs > 0).then(|| Duration::from_secs(self.feed_idle_secs)),
            ..Default::default()
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            fetch_timeout: Duration::from_millis(self.request_timeout_ms),
            max_fetch_retries: self.fetch_retries,
            ..Default::default()
        }
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session")
    }
}
