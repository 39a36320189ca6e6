//! Connection Pool
//!
//! Keeps `pool_size` sessions alive, best effort. A control task asks the
//! directory for peers until the pool is full, then sleeps until a session
//! ends or the retry backoff elapses. Session outcomes are scored back into
//! the directory and forwarded to the application listener.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::{BincodeCodec, MessageCodec};
use crate::directory::PeerDirectory;
use crate::listener::{MessageSender, PeerListener};
use crate::session::{SessionConfig, SessionError, SessionHandle};
use crate::transport::{Dialer, TcpDialer};
use crate::types::Message;

/// Target number of concurrent sessions
pub const DEFAULT_POOL_SIZE: usize = 3;

/// Score added when a session ends without error
pub const CLEAN_DISCONNECT_REWARD: i32 = 3;

/// Score added when a session ends with an error
pub const ERROR_DISCONNECT_PENALTY: i32 = -1;

/// Wait between control passes when nothing changes
pub const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Bound on joining the control task at shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub pool_size: usize,
    pub retry_backoff: Duration,
    pub shutdown_timeout: Duration,
    pub clean_disconnect_reward: i32,
    pub error_disconnect_penalty: i32,
    pub session: SessionConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            retry_backoff: RETRY_BACKOFF,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            clean_disconnect_reward: CLEAN_DISCONNECT_REWARD,
            error_disconnect_penalty: ERROR_DISCONNECT_PENALTY,
            session: SessionConfig::default(),
        }
    }
}

/// State shared between the pool, its control task and its sessions
struct PoolShared {
    config: PoolConfig,
    directory: Arc<PeerDirectory>,

    /// Registered sessions keyed by peer address
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,

    running: AtomicBool,

    /// Set by shutdown; a stopped pool never starts another session
    stopped: AtomicBool,

    /// Signalled when a session ends or shutdown begins
    wake: Notify,

    listener: Arc<dyn PeerListener>,
    codec: Arc<dyn MessageCodec>,
    dialer: Arc<dyn Dialer>,
}

impl PoolShared {
    fn sessions(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<SessionHandle>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<SessionHandle>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// One control pass: start sessions until full or out of peers
    fn fill(self: &Arc<Self>) -> usize {
        let mut started = 0;

        while !self.is_stopped() && self.sessions().len() < self.config.pool_size {
            let Some(address) = self.directory.select_peer() else {
                debug!(
                    "No unused peer available ({}/{} sessions)",
                    self.sessions().len(),
                    self.config.pool_size
                );
                break;
            };

            let session = SessionHandle::new(address.clone(), self.config.session.clone());

            // Registered before start so an immediate disconnect finds it
            self.sessions_mut().insert(address.clone(), Arc::clone(&session));

            let listener: Arc<dyn PeerListener> = Arc::clone(self) as Arc<dyn PeerListener>;
            match session.start(Arc::clone(&self.dialer), Arc::clone(&self.codec), listener) {
                Ok(()) => {
                    info!("🔌 Starting session with peer {}", address);
                    started += 1;
                }
                Err(e) => {
                    warn!("Cannot start session with {}: {}", address, e);
                    self.sessions_mut().remove(&address);
                    self.directory.release_peer(&address, 0);
                }
            }
        }

        started
    }
}

impl PeerListener for PoolShared {
    fn on_connected(&self, address: &str) {
        info!("✅ Peer {} connected", address);
        self.listener.on_connected(address);
    }

    fn on_disconnected(&self, address: &str, error: Option<&SessionError>) {
        let session = self.sessions_mut().remove(address);
        let connected = session.is_some_and(|s| s.has_connected());

        // Closed before the transport came up: no outcome to score
        let delta = match error {
            Some(_) => self.config.error_disconnect_penalty,
            None if connected => self.config.clean_disconnect_reward,
            None => 0,
        };
        self.directory.release_peer(address, delta);
        self.wake.notify_one();

        self.listener.on_disconnected(address, error);
    }

    fn on_message(&self, sender: &dyn MessageSender, message: Message) {
        self.listener.on_message(sender, message);
    }
}

/// Pool of outbound peer sessions
pub struct PeerPool {
    shared: Arc<PoolShared>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl PeerPool {
    /// Create a pool dialing TCP peers with the default codec
    pub fn new(
        config: PoolConfig,
        directory: Arc<PeerDirectory>,
        listener: Arc<dyn PeerListener>,
    ) -> Self {
        Self::with_transport(
            config,
            directory,
            listener,
            Arc::new(TcpDialer),
            Arc::new(BincodeCodec::new()),
        )
    }

    pub fn with_transport(
        config: PoolConfig,
        directory: Arc<PeerDirectory>,
        listener: Arc<dyn PeerListener>,
        dialer: Arc<dyn Dialer>,
        codec: Arc<dyn MessageCodec>,
    ) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                config,
                directory,
                sessions: RwLock::new(HashMap::new()),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                wake: Notify::new(),
                listener,
                codec,
                dialer,
            }),
            control: Mutex::new(None),
        }
    }

    /// Spawn the control task
    ///
    /// Returns false if the pool is already running or was shut down.
    pub fn start(&self) -> bool {
        if self.shared.is_stopped() {
            warn!("Peer pool was shut down, not restarting");
            return false;
        }
        if self.shared.running.swap(true, Ordering::AcqRel) {
            warn!("Peer pool already running");
            return false;
        }

        info!("🚀 Peer pool started (target {} sessions)", self.shared.config.pool_size);

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            while shared.is_running() {
                shared.fill();

                tokio::select! {
                    _ = shared.wake.notified() => {}
                    _ = tokio::time::sleep(shared.config.retry_backoff) => {}
                }
            }
            debug!("Pool control loop stopped");
        });
        *self.control.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        true
    }

    /// Run a single control pass, returning the number of sessions started
    ///
    /// Starts nothing once the pool has been shut down. Must be called from
    /// within a Tokio runtime.
    pub fn fill_once(&self) -> usize {
        self.shared.fill()
    }

    /// Queue `message` on every registered session
    ///
    /// Returns the number of sessions attempted. A session whose queue is
    /// full misses the message; the others still get it.
    pub fn broadcast(&self, message: Message) -> usize {
        let sessions = self.shared.sessions();

        for (address, session) in sessions.iter() {
            if let Err(e) = session.enqueue(message.clone()) {
                debug!("Broadcast to {} dropped: {}", address, e);
            }
        }

        debug!("Broadcast {} to {} sessions", message.command(), sessions.len());
        sessions.len()
    }

    /// Stop the control task and close every session, each wait bounded
    pub async fn shutdown(&self) {
        info!("🛑 Shutting down peer pool...");
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.running.store(false, Ordering::Release);
        self.shared.wake.notify_one();

        // Joined first so no pass can register a session after the snapshot
        let control = self.control.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(control) = control {
            if tokio::time::timeout(self.shared.config.shutdown_timeout, control)
                .await
                .is_err()
            {
                warn!(
                    "Pool control loop did not stop within {:?}",
                    self.shared.config.shutdown_timeout
                );
            }
        }

        let sessions: Vec<Arc<SessionHandle>> = self.shared.sessions().values().cloned().collect();
        join_all(sessions.iter().map(|session| session.request_close())).await;

        info!("✅ Peer pool stopped");
    }

    pub fn active_count(&self) -> usize {
        self.shared.sessions().len()
    }

    /// Addresses of registered sessions, sorted
    pub fn active_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.shared.sessions().keys().cloned().collect();
        addresses.sort();
        addresses
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn directory(&self) -> &Arc<PeerDirectory> {
        &self.shared.directory
    }
}
