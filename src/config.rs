use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Leading hex zeros a block's proof hash must carry.
pub const MINING_DIFFICULTY: usize = 5;
/// Reserved sender of block rewards. Never signs anything.
pub const MINING_SENDER: &str = "Zero-Chain";
pub const MINING_REWARD: f64 = 7.0;
pub const MINING_TIMER_SEC: u64 = 20;
pub const BLOCKCHAIN_NEIGHBOR_SYNC_TIME_SEC: u64 = 20;
pub const REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LISTEN_ADDR: &str = "/ip4/0.0.0.0/tcp/7000";

const MAX_DIFFICULTY: usize = 64;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct NodeConfig {
    /// Address credited with the reward of every block this node mines.
    pub miner_address: String,
    pub listen_addr: String,
    /// Multiaddrs dialed at start and on every peer refresh.
    pub bootstrap: Vec<String>,
    pub difficulty: usize,
    pub mining_reward: f64,
    /// Zero disables the mining timer.
    pub mining_interval_secs: u64,
    pub peer_sync_interval_secs: u64,
    pub request_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            miner_address: String::new(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            bootstrap: Vec::new(),
            difficulty: MINING_DIFFICULTY,
            mining_reward: MINING_REWARD,
            mining_interval_secs: MINING_TIMER_SEC,
            peer_sync_interval_secs: BLOCKCHAIN_NEIGHBOR_SYNC_TIME_SEC,
            request_timeout_ms: REQUEST_TIMEOUT_MS,
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<NodeConfig, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.miner_address.is_empty() {
            return Err(ConfigError::Invalid("miner_address is required".into()));
        }
        if self.miner_address == MINING_SENDER {
            return Err(ConfigError::Invalid(format!(
                "miner_address may not be the reserved sender {MINING_SENDER}"
            )));
        }
        if self.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::Invalid(format!(
                "difficulty {} exceeds {MAX_DIFFICULTY} hex characters",
                self.difficulty
            )));
        }
        if !self.mining_reward.is_finite() || self.mining_reward < 0.0 {
            return Err(ConfigError::Invalid("mining_reward must be non-negative".into()));
        }
        if self.peer_sync_interval_secs == 0 || self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "peer_sync_interval_secs and request_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn mining_interval(&self) -> Option<Duration> {
        (self.mining_interval_secs > 0).then(|| Duration::from_secs(self.mining_interval_secs))
    }

    pub fn peer_sync_interval(&self) -> Duration {
        Duration::from_secs(self.peer_sync_interval_secs)
    }
}
