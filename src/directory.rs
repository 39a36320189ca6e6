//! Peer Directory
//!
//! Scored store of known peers, persisted as a JSON list so reputation
//! survives restarts. Every public operation runs in a single critical
//! section; mutating operations rewrite the whole file inside that section.
//!
//! ## Selection
//!
//! Peers are ranked by score (descending), ties broken by address
//! (ascending). `select_peer` hands out the best ranked peer that is not
//! already allocated and marks it allocated before the lock is released.
//!
//! ## Scoring
//!
//! `release_peer` applies a delta to the score. A peer whose score turns
//! negative is removed for good.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::discovery::{DiscoveryError, SeedResolver};
use crate::types::Peer;

/// Maximum number of peers kept in the directory
pub const MAX_DIRECTORY_SIZE: usize = 500;

/// Below this size the directory bootstraps from DNS seeds
pub const MIN_DIRECTORY_SIZE: usize = 5;

/// Score given to newly discovered peers
pub const INITIAL_SCORE: i32 = 3;

/// Error type for directory persistence
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Cannot read peer cache {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Cannot write peer cache {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Malformed peer cache: {0}")]
    Format(#[from] serde_json::Error),
}

/// Directory configuration
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Peer cache file, `None` keeps the directory in memory only
    pub path: Option<PathBuf>,

    /// Maximum number of peers
    pub max_size: usize,

    /// Bootstrap threshold
    pub min_size: usize,

    /// Score for newly discovered peers
    pub initial_score: i32,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_size: MAX_DIRECTORY_SIZE,
            min_size: MIN_DIRECTORY_SIZE,
            initial_score: INITIAL_SCORE,
        }
    }
}

impl DirectoryConfig {
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Directory statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryStats {
    pub total: usize,
    pub in_use: usize,
    pub average_score: f64,
}

/// Scored, persisted set of known peers
pub struct PeerDirectory {
    config: DirectoryConfig,

    /// Peers keyed by address
    peers: Mutex<HashMap<String, Peer>>,

    /// Set while a bootstrap lookup is in flight
    bootstrapping: AtomicBool,
}

impl PeerDirectory {
    /// Open the directory, loading the peer cache if there is one
    ///
    /// A missing or unreadable cache is not an error: the directory starts
    /// empty and a warning is logged.
    pub fn open(config: DirectoryConfig) -> Self {
        let mut peers = HashMap::new();

        if let Some(path) = &config.path {
            match load_peers(path) {
                Ok(loaded) => {
                    for mut peer in loaded {
                        if peer.score < 0 || peers.contains_key(&peer.address) {
                            continue;
                        }
                        // Nothing owns an allocation across a restart
                        peer.in_use = false;
                        peers.insert(peer.address.clone(), peer);
                    }
                    info!("📦 Loaded {} peers from {}", peers.len(), path.display());
                }
                Err(PersistenceError::Read { source, .. })
                    if source.kind() == io::ErrorKind::NotFound =>
                {
                    debug!("No peer cache at {}, starting empty", path.display());
                }
                Err(e) => {
                    warn!("Load cached peers failed, starting empty: {}", e);
                }
            }
        }

        let directory = Self {
            config,
            peers: Mutex::new(peers),
            bootstrapping: AtomicBool::new(false),
        };

        {
            let mut peers = directory.lock();
            let evicted = directory.enforce_capacity(&mut peers);
            if evicted > 0 {
                debug!("Dropped {} cached peers over capacity", evicted);
            }
        }

        directory
    }

    /// Open the directory and, if it is sparse, bootstrap it in the background
    ///
    /// Discovery failures are logged and never reach the caller. Without a
    /// Tokio runtime the bootstrap is skipped.
    pub fn initialize(config: DirectoryConfig, resolver: Arc<dyn SeedResolver>) -> Arc<Self> {
        let directory = Arc::new(Self::open(config));

        if directory.needs_bootstrap() {
            info!(
                "Only {} known peers (< {}), bootstrapping from DNS seeds",
                directory.len(),
                directory.config.min_size
            );
            directory.spawn_bootstrap(resolver);
        }

        directory
    }

    /// Hand out the best ranked peer that is not in use
    pub fn select_peer(&self) -> Option<String> {
        let mut peers = self.lock();
        debug!("Try get an unused peer from {} peers...", peers.len());

        let address = peers
            .values()
            .filter(|p| !p.in_use)
            .min_by(|a, b| selection_order(a, b))
            .map(|p| p.address.clone())?;

        if let Some(peer) = peers.get_mut(&address) {
            peer.in_use = true;
        }
        self.store(&peers);
        Some(address)
    }

    /// Return a peer with a score adjustment
    ///
    /// The peer is removed once its score goes negative. Unknown addresses
    /// are ignored.
    pub fn release_peer(&self, address: &str, score_delta: i32) {
        let mut peers = self.lock();

        let Some(peer) = peers.get_mut(address) else {
            debug!("Release of unknown peer {} ignored", address);
            return;
        };

        peer.in_use = false;
        peer.score = peer.score.saturating_add(score_delta);

        if peer.score < 0 {
            info!("Removing peer {} (score {})", address, peer.score);
            peers.remove(address);
        } else {
            debug!("Released peer {} (score {})", address, peer.score);
        }

        self.store(&peers);
    }

    /// Add addresses not already known, returns how many were new
    pub fn merge_discovered<I, S>(&self, addresses: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut peers = self.lock();

        let mut added = 0;
        for address in addresses {
            let address = address.into();
            if !peers.contains_key(&address) {
                peers.insert(address.clone(), Peer::new(address, self.config.initial_score));
                added += 1;
            }
        }

        let evicted = self.enforce_capacity(&mut peers);
        info!(
            "Added {} discovered peers ({} evicted), total peers: {}",
            added,
            evicted,
            peers.len()
        );

        self.store(&peers);
        added
    }

    /// Resolve the DNS seeds and merge the result
    ///
    /// Returns the number of new peers. A lookup already in flight makes this
    /// call return `Ok(0)` immediately.
    pub async fn bootstrap(&self, resolver: &dyn SeedResolver) -> Result<usize, DiscoveryError> {
        if self
            .bootstrapping
            .compare_exchange(false, true, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
            .is_err()
        {
            debug!("Bootstrap already in progress");
            return Ok(0);
        }
        let _guard = BootstrapGuard(&self.bootstrapping);

        let ips = resolver.resolve_seeds().await?;
        Ok(self.merge_discovered(ips.into_iter().map(|ip| ip.to_string())))
    }

    /// Run `bootstrap` on its own task
    pub fn spawn_bootstrap(self: &Arc<Self>, resolver: Arc<dyn SeedResolver>) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, skipping peer bootstrap");
            return None;
        };

        let directory = Arc::clone(self);
        Some(runtime.spawn(async move {
            if let Err(e) = directory.bootstrap(resolver.as_ref()).await {
                warn!("Could not discover peers: {}", e);
            }
        }))
    }

    /// Periodically re-bootstrap while the directory is sparse
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        resolver: Arc<dyn SeedResolver>,
        interval: Duration,
    ) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, skipping directory maintenance");
            return None;
        };

        let directory = Arc::clone(self);
        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if directory.needs_bootstrap() {
                    info!("🔄 Directory sparse ({} peers), re-bootstrapping", directory.len());
                    if let Err(e) = directory.bootstrap(resolver.as_ref()).await {
                        warn!("Periodic bootstrap failed: {}", e);
                    }
                }
            }
        }))
    }

    /// Persist the current state
    pub fn shutdown(&self) {
        let peers = self.lock();
        self.store(&peers);
        info!("📦 Peer directory stored ({} peers)", peers.len());
    }

    pub fn needs_bootstrap(&self) -> bool {
        self.len() < self.config.min_size
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, address: &str) -> Option<Peer> {
        self.lock().get(address).cloned()
    }

    /// All peers in selection order
    pub fn snapshot(&self) -> Vec<Peer> {
        sorted(&self.lock())
    }

    pub fn stats(&self) -> DirectoryStats {
        let peers = self.lock();
        let total = peers.len();
        let in_use = peers.values().filter(|p| p.in_use).count();
        let average_score = if total == 0 {
            0.0
        } else {
            peers.values().map(|p| p.score as f64).sum::<f64>() / total as f64
        };

        DirectoryStats {
            total,
            in_use,
            average_score,
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Peer>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evict the lowest ranked free peers until the size bound holds
    fn enforce_capacity(&self, peers: &mut HashMap<String, Peer>) -> usize {
        let mut evicted = 0;

        while peers.len() > self.config.max_size {
            let victim = peers
                .values()
                .filter(|p| !p.in_use)
                .max_by(|a, b| selection_order(a, b))
                .map(|p| p.address.clone());

            match victim {
                Some(address) => {
                    debug!("Evicting peer {} due to capacity", address);
                    peers.remove(&address);
                    evicted += 1;
                }
                None => break,
            }
        }

        evicted
    }

    /// Rewrite the peer cache; failures are logged and swallowed
    fn store(&self, peers: &HashMap<String, Peer>) {
        if let Some(path) = &self.config.path {
            if let Err(e) = store_peers(path, &sorted(peers)) {
                warn!("Write peers to cached file failed: {}", e);
            }
        }
    }
}

struct BootstrapGuard<'a>(&'a AtomicBool);

impl Drop for BootstrapGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, AtomicOrdering::Release);
    }
}

/// Score descending, then address ascending
fn selection_order(a: &Peer, b: &Peer) -> Ordering {
    b.score.cmp(&a.score).then_with(|| a.address.cmp(&b.address))
}

fn sorted(peers: &HashMap<String, Peer>) -> Vec<Peer> {
    let mut list: Vec<Peer> = peers.values().cloned().collect();
    list.sort_by(selection_order);
    list
}

fn load_peers(path: &Path) -> Result<Vec<Peer>, PersistenceError> {
    let content = std::fs::read_to_string(path).map_err(|source| PersistenceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

fn store_peers(path: &Path, peers: &[Peer]) -> Result<(), PersistenceError> {
    let content = serde_json::to_string_pretty(peers)?;

    // Write aside then rename so a crash never leaves a truncated cache
    let tmp = path.with_extension("tmp");
    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(&tmp, content).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}
