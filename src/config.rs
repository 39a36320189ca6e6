//! Peer Pool Configuration
//!
//! Configurable parameters for the peer pool, the session loop, the peer
//! directory and DNS bootstrap. Defaults follow the usual mainnet
//! constants (port 8333, 3 sessions, 100 queued messages per session).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::directory::DirectoryConfig;
use crate::discovery::DiscoveryConfig;
use crate::pool::PoolConfig;
use crate::session::SessionConfig;

/// Default DNS seeds used for initial peer discovery
pub const DEFAULT_DNS_SEEDS: [&str; 5] = [
    "bitseed.xf2.org",
    "dnsseed.bluematt.me",
    "seed.bitcoin.sipa.be",
    "dnsseed.bitcoin.dashjr.org",
    "seed.bitcoinstats.com",
];

/// Main configuration for the peer pool service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerPoolConfig {
    // === Pool ===

    /// Number of concurrent sessions the pool keeps open
    pub pool_size: usize,

    /// Wait between control-loop passes that could not start a session (ms)
    pub retry_backoff_ms: u64,

    /// Upper bound for joining the control loop on shutdown (seconds)
    pub shutdown_timeout_secs: u64,

    /// Score delta applied when a session ends without error
    pub clean_disconnect_reward: i32,

    /// Score delta applied when a session ends with an error
    pub error_disconnect_penalty: i32,

    // === Directory ===

    /// File holding the persisted peer directory
    pub peer_cache_path: PathBuf,

    /// Maximum number of peers kept in the directory
    pub max_directory_size: usize,

    /// Below this many peers the directory bootstraps from DNS seeds
    pub min_directory_size: usize,

    /// Score given to newly discovered peers
    pub initial_peer_score: i32,

    /// Interval for re-bootstrapping a sparse directory (seconds, 0 disables)
    pub rebootstrap_interval_secs: u64,

    // === Session ===

    /// Port every peer is dialed on
    pub peer_port: u16,

    /// Connect timeout (seconds)
    pub connect_timeout_secs: u64,

    /// Read timeout once connected (seconds)
    pub read_timeout_secs: u64,

    /// Activity deadline granted right after connecting (seconds)
    pub handshake_deadline_secs: u64,

    /// Bounded wait for the next outbound message per loop iteration (ms)
    pub poll_interval_ms: u64,

    /// Outbound queue capacity per session
    pub outbound_queue_capacity: usize,

    /// Bounded wait for a session loop to exit after a close request (ms)
    pub close_wait_ms: u64,

    // === Discovery ===

    /// DNS seed hostnames
    pub dns_seeds: Vec<String>,

    /// Per-seed resolution timeout (seconds)
    pub dns_timeout_secs: u64,
}

impl Default for PeerPoolConfig {
    fn default() -> Self {
        Self {
            // Pool
            pool_size: 3,
            retry_backoff_ms: 500,
            shutdown_timeout_secs: 5,
            clean_disconnect_reward: 3,
            error_disconnect_penalty: -1,

            // Directory
            peer_cache_path: PathBuf::from(".peercache.json"),
            max_directory_size: 500,
            min_directory_size: 5,
            initial_peer_score: 3,
            rebootstrap_interval_secs: 300,

            // Session
            peer_port: 8333,
            connect_timeout_secs: 10,
            read_timeout_secs: 10,
            handshake_deadline_secs: 60,
            poll_interval_ms: 1000,
            outbound_queue_capacity: 100,
            close_wait_ms: 1000,

            // Discovery
            dns_seeds: DEFAULT_DNS_SEEDS.iter().map(|s| s.to_string()).collect(),
            dns_timeout_secs: 10,
        }
    }
}

impl PeerPoolConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_pool_size(mut self, pool_size: Option<usize>) -> Self {
        if let Some(size) = pool_size {
            self.pool_size = size;
        }
        self
    }

    pub fn with_peer_cache_path(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.peer_cache_path = path;
        }
        self
    }

    pub fn with_peer_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.peer_port = port;
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pool_size == 0 {
            anyhow::bail!("pool_size must be at least 1");
        }

        if self.outbound_queue_capacity == 0 {
            anyhow::bail!("outbound_queue_capacity must be at least 1");
        }

        if self.max_directory_size == 0 {
            anyhow::bail!("max_directory_size must be at least 1");
        }

        if self.initial_peer_score < 0 {
            anyhow::bail!(
                "initial_peer_score ({}) must not be negative",
                self.initial_peer_score
            );
        }

        if self.min_directory_size > self.max_directory_size {
            anyhow::bail!(
                "min_directory_size ({}) must not exceed max_directory_size ({})",
                self.min_directory_size,
                self.max_directory_size
            );
        }

        if self.dns_seeds.is_empty() {
            anyhow::bail!("at least one DNS seed must be configured");
        }

        if self.clean_disconnect_reward <= 0 {
            anyhow::bail!(
                "clean_disconnect_reward ({}) must be positive",
                self.clean_disconnect_reward
            );
        }

        if self.error_disconnect_penalty >= 0 {
            anyhow::bail!(
                "error_disconnect_penalty ({}) must be negative",
                self.error_disconnect_penalty
            );
        }

        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be at least 1");
        }

        Ok(())
    }

    pub fn directory_config(&self) -> DirectoryConfig {
        DirectoryConfig {
            path: Some(self.peer_cache_path.clone()),
            max_size: self.max_directory_size,
            min_size: self.min_directory_size,
            initial_score: self.initial_peer_score,
        }
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            seeds: self.dns_seeds.clone(),
            port: self.peer_port,
            timeout: Duration::from_secs(self.dns_timeout_secs),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            port: self.peer_port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            handshake_deadline: Duration::from_secs(self.handshake_deadline_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            queue_capacity: self.outbound_queue_capacity,
            close_wait: Duration::from_millis(self.close_wait_ms),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            pool_size: self.pool_size,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            clean_disconnect_reward: self.clean_disconnect_reward,
            error_disconnect_penalty: self.error_disconnect_penalty,
            session: self.session_config(),
        }
    }

    pub fn rebootstrap_interval(&self) -> Option<Duration> {
        match self.rebootstrap_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
