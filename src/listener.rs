//! Session event contract
//!
//! Sessions report to a `PeerListener`; the pool implements it for its own
//! bookkeeping and forwards every event to the application's listener.

use std::time::Duration;

use crate::session::SessionError;
use crate::types::Message;

/// Handle back into the session that produced an event
pub trait MessageSender: Send + Sync {
    /// Address of the peer behind the session
    fn address(&self) -> &str;

    /// Queue a message for the peer without blocking
    fn send(&self, message: Message) -> Result<(), SessionError>;

    /// Move the session's activity deadline to `duration` from now
    fn set_deadline(&self, duration: Duration);
}

/// Receives session lifecycle events and inbound messages
///
/// Callbacks run on the session's own task and must not block.
pub trait PeerListener: Send + Sync {
    fn on_connected(&self, _address: &str) {}

    /// Exactly once per session; `error` is `None` for a graceful close
    fn on_disconnected(&self, _address: &str, _error: Option<&SessionError>) {}

    fn on_message(&self, _sender: &dyn MessageSender, _message: Message) {}
}

/// Ignores every event
#[derive(Debug, Clone, Default)]
pub struct NoopListener;

impl PeerListener for NoopListener {}
