//! Core types shared by the directory, sessions and the pool
//!
//! `Peer` is the persisted directory record. `Message` is the unit exchanged
//! over a session; its wire form belongs to the codec.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Protocol version advertised in the automatic version message
pub const PROTOCOL_VERSION: u32 = 70001;

/// User agent advertised in the automatic version message
pub const USER_AGENT: &str = concat!("/peer-pool:", env!("CARGO_PKG_VERSION"), "/");

// =============================================================================
// PEER
// =============================================================================

/// A known peer and its reputation state
///
/// Identity is the address: two records with the same address are the same
/// peer regardless of score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    /// IPv4 address in dotted form, dialed on the configured port
    pub address: String,

    /// Reputation score, higher is preferred. Negative means evicted.
    pub score: i32,

    /// Allocated to a caller that has not released it yet
    #[serde(default)]
    pub in_use: bool,
}

impl Peer {
    pub fn new(address: impl Into<String>, score: i32) -> Self {
        Self {
            address: address.into(),
            score,
            in_use: false,
        }
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Peer {}

// =============================================================================
// MESSAGES
// =============================================================================

/// Messages exchanged with a peer
///
/// Only the handshake is interpreted by this crate; everything else is handed
/// to the application listener untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Opening message sent automatically once connected
    Version {
        protocol_version: u32,
        services: u64,
        timestamp: i64,
        /// Address of the peer as seen by us
        receiver: String,
        user_agent: String,
        start_height: u64,
    },

    /// Acknowledges a version message
    Verack,

    /// Keep-alive probe
    Ping { nonce: u64 },

    /// Keep-alive answer
    Pong { nonce: u64 },

    /// Any other command with an opaque payload
    Custom { command: String, payload: Vec<u8> },
}

impl Message {
    /// Build the version message sent to `remote` right after connecting
    pub fn version(remote: SocketAddr, start_height: u64) -> Self {
        Message::Version {
            protocol_version: PROTOCOL_VERSION,
            services: 0,
            timestamp: chrono::Utc::now().timestamp(),
            receiver: remote.to_string(),
            user_agent: USER_AGENT.to_string(),
            start_height,
        }
    }

    /// Short command name, used for logging
    pub fn command(&self) -> &str {
        match self {
            Message::Version { .. } => "version",
            Message::Verack => "verack",
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::Custom { command, .. } => command,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Version { protocol_version, receiver, start_height, .. } => write!(
                f,
                "version(v={}, to={}, height={})",
                protocol_version, receiver, start_height
            ),
            Message::Ping { nonce } => write!(f, "ping({})", nonce),
            Message::Pong { nonce } => write!(f, "pong({})", nonce),
            Message::Custom { command, payload } => {
                write!(f, "{}({} bytes)", command, payload.len())
            }
            Message::Verack => write!(f, "verack"),
        }
    }
}
