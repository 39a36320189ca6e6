//! Peer Pool
//!
//! Outbound peer networking for a node:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        PEER POOL                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PeerPool        ←── keeps N sessions alive, broadcasts     │
//! │  SessionHandle   ←── one task per peer, bounded out queue   │
//! │  PeerDirectory   ←── scored peers, persisted as JSON        │
//! │  DnsSeedResolver ←── bootstrap when the directory is sparse │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The directory is the only state shared across components. Sessions report
//! back to the pool through the `PeerListener` contract, and the pool forwards
//! every event to the application's listener.

pub mod codec;
pub mod config;
pub mod directory;
pub mod discovery;
pub mod listener;
pub mod pool;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
mod tests;

pub use codec::{BincodeCodec, CodecError, MessageCodec};
pub use config::PeerPoolConfig;
pub use directory::{DirectoryConfig, DirectoryStats, PeerDirectory, PersistenceError};
pub use discovery::{DiscoveryConfig, DiscoveryError, DnsSeedResolver, SeedResolver, StaticSeedResolver};
pub use listener::{MessageSender, NoopListener, PeerListener};
pub use pool::{PeerPool, PoolConfig};
pub use session::{SessionConfig, SessionError, SessionHandle, SessionState};
pub use transport::{Dialer, TcpDialer};
pub use types::{Message, Peer};
