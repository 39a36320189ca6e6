//! DNS Seeds - Initial peer discovery via DNS
//!
//! Every configured seed hostname is resolved concurrently. A seed that fails
//! to resolve is logged and skipped; the result is the union of the IPv4
//! addresses returned by the seeds that answered. Only an empty union is an
//! error.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_DNS_SEEDS;

/// Default port used for the lookup target (`host:port`)
pub const DEFAULT_LOOKUP_PORT: u16 = 8333;

/// Maximum time to wait for a single seed
pub const DNS_TIMEOUT_SECS: u64 = 10;

/// Error type for discovery
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("No DNS seeds configured")]
    NoSeedsConfigured,

    #[error("Cannot look up peers from any of {seeds} DNS seeds")]
    NoPeersResolved { seeds: usize },
}

/// Discovery configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Seed hostnames
    pub seeds: Vec<String>,

    /// Port appended to each hostname for the lookup
    pub port: u16,

    /// Per-seed timeout
    pub timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            seeds: DEFAULT_DNS_SEEDS.iter().map(|s| s.to_string()).collect(),
            port: DEFAULT_LOOKUP_PORT,
            timeout: Duration::from_secs(DNS_TIMEOUT_SECS),
        }
    }
}

/// Source of candidate peer addresses
#[async_trait]
pub trait SeedResolver: Send + Sync {
    async fn resolve_seeds(&self) -> Result<BTreeSet<Ipv4Addr>, DiscoveryError>;
}

/// DNS Seed Resolver - discovers peers via DNS A records
pub struct DnsSeedResolver {
    config: DiscoveryConfig,
}

impl DnsSeedResolver {
    /// Create a resolver with the default seeds
    pub fn new() -> Self {
        Self::with_config(DiscoveryConfig::default())
    }

    pub fn with_config(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Create a resolver with custom seeds
    pub fn with_seeds(seeds: Vec<String>) -> Self {
        Self::with_config(DiscoveryConfig {
            seeds,
            ..DiscoveryConfig::default()
        })
    }

    /// Add an additional DNS seed
    pub fn add_seed(&mut self, seed: String) {
        if !self.config.seeds.contains(&seed) {
            self.config.seeds.push(seed);
        }
    }

    /// Get number of configured seeds
    pub fn seed_count(&self) -> usize {
        self.config.seeds.len()
    }

    /// Resolve a single seed to its IPv4 addresses
    async fn resolve_seed(&self, seed: &str) -> io::Result<Vec<Ipv4Addr>> {
        let target = format!("{}:{}", seed, self.config.port);

        let addrs = tokio::time::timeout(self.config.timeout, tokio::net::lookup_host(target))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "DNS lookup timed out"))??;

        Ok(addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect())
    }
}

impl Default for DnsSeedResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SeedResolver for DnsSeedResolver {
    async fn resolve_seeds(&self) -> Result<BTreeSet<Ipv4Addr>, DiscoveryError> {
        if self.config.seeds.is_empty() {
            return Err(DiscoveryError::NoSeedsConfigured);
        }

        info!("🔍 Looking up peers from {} DNS seeds...", self.config.seeds.len());

        let lookups = self.config.seeds.iter().map(|seed| async move {
            (seed, self.resolve_seed(seed).await)
        });

        let mut discovered = BTreeSet::new();
        for (seed, result) in join_all(lookups).await {
            match result {
                Ok(ips) => {
                    debug!("DNS seed {} returned {} IPv4 addresses", seed, ips.len());
                    discovered.extend(ips);
                }
                Err(e) => {
                    warn!("Cannot look up DNS seed {}: {}", seed, e);
                }
            }
        }

        if discovered.is_empty() {
            return Err(DiscoveryError::NoPeersResolved {
                seeds: self.config.seeds.len(),
            });
        }

        info!("📡 {} peers found via DNS seeds", discovered.len());
        Ok(discovered)
    }
}

/// Resolver returning a fixed address list, for local networks and tests
#[derive(Debug, Clone, Default)]
pub struct StaticSeedResolver {
    addresses: Vec<Ipv4Addr>,
}

impl StaticSeedResolver {
    pub fn new(addresses: Vec<Ipv4Addr>) -> Self {
        Self { addresses }
    }
}

#[async_trait]
impl SeedResolver for StaticSeedResolver {
    async fn resolve_seeds(&self) -> Result<BTreeSet<Ipv4Addr>, DiscoveryError> {
        if self.addresses.is_empty() {
            return Err(DiscoveryError::NoPeersResolved { seeds: 0 });
        }
        Ok(self.addresses.iter().copied().collect())
    }
}
