// Shared test helpers: event recording, dialers and loopback peers

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::codec::{BincodeCodec, MessageCodec};
use crate::listener::{MessageSender, PeerListener};
use crate::pool::PoolConfig;
use crate::session::{SessionConfig, SessionError};
use crate::transport::Dialer;
use crate::types::Message;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

// =========================================================================
// CONFIGS
// =========================================================================

pub fn fast_session_config() -> SessionConfig {
    SessionConfig {
        port: 0,
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(2),
        handshake_deadline: Duration::from_secs(10),
        poll_interval: Duration::from_millis(50),
        queue_capacity: 100,
        close_wait: Duration::from_secs(1),
    }
}

pub fn fast_pool_config() -> PoolConfig {
    PoolConfig {
        retry_backoff: Duration::from_millis(20),
        shutdown_timeout: Duration::from_secs(2),
        session: fast_session_config(),
        ..PoolConfig::default()
    }
}

// =========================================================================
// LISTENER
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected(String),
    Disconnected { address: String, error: Option<String> },
    Message { address: String, message: Message },
}

/// Forwards every callback into a channel the test can await
pub struct RecordingListener {
    events: mpsc::UnboundedSender<Event>,
    reply_to_pings: bool,
}

impl RecordingListener {
    pub fn new() -> (Arc<Self>, Events) {
        Self::build(false)
    }

    /// Also answers every ping with a pong through the sender
    pub fn replying() -> (Arc<Self>, Events) {
        Self::build(true)
    }

    fn build(reply_to_pings: bool) -> (Arc<Self>, Events) {
        let (events, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events, reply_to_pings }), Events(rx))
    }
}

impl PeerListener for RecordingListener {
    fn on_connected(&self, address: &str) {
        let _ = self.events.send(Event::Connected(address.to_string()));
    }

    fn on_disconnected(&self, address: &str, error: Option<&SessionError>) {
        let _ = self.events.send(Event::Disconnected {
            address: address.to_string(),
            error: error.map(|e| e.to_string()),
        });
    }

    fn on_message(&self, sender: &dyn MessageSender, message: Message) {
        if self.reply_to_pings {
            if let Message::Ping { nonce } = message {
                sender.send(Message::Pong { nonce }).unwrap();
            }
        }
        let _ = self.events.send(Event::Message {
            address: sender.address().to_string(),
            message,
        });
    }
}

pub struct Events(mpsc::UnboundedReceiver<Event>);

impl Events {
    pub async fn next(&mut self) -> Event {
        tokio::time::timeout(EVENT_TIMEOUT, self.0.recv())
            .await
            .expect("timed out waiting for listener event")
            .expect("listener dropped")
    }

    /// True if no event arrives within `duration`
    pub async fn none_within(&mut self, duration: Duration) -> bool {
        !matches!(tokio::time::timeout(duration, self.0.recv()).await, Ok(Some(_)))
    }
}

// =========================================================================
// DIALERS
// =========================================================================

/// Sends every peer address to one local port
pub struct LoopbackDialer {
    port: u16,
}

impl LoopbackDialer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl Dialer for LoopbackDialer {
    async fn dial(&self, _address: &str, _port: u16, timeout: Duration) -> io::Result<TcpStream> {
        tokio::time::timeout(timeout, TcpStream::connect(("127.0.0.1", self.port)))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "loopback dial timed out"))?
    }
}

/// Never completes a connect
pub struct StallDialer;

#[async_trait]
impl Dialer for StallDialer {
    async fn dial(&self, _address: &str, _port: u16, _timeout: Duration) -> io::Result<TcpStream> {
        futures::future::pending().await
    }
}

/// Fails every connect immediately
pub struct RefusingDialer;

#[async_trait]
impl Dialer for RefusingDialer {
    async fn dial(&self, address: &str, port: u16, _timeout: Duration) -> io::Result<TcpStream> {
        Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("{}:{} refused", address, port),
        ))
    }
}

// =========================================================================
// PEERS
// =========================================================================

/// Accept one session and read its first frame
pub async fn accept_and_read_handshake(server: &TcpListener) -> (TcpStream, Message) {
    let (mut stream, _) = tokio::time::timeout(EVENT_TIMEOUT, server.accept())
        .await
        .expect("no session connected")
        .unwrap();
    let first = read_message(&mut stream).await;
    (stream, first)
}

pub async fn read_message(stream: &mut TcpStream) -> Message {
    tokio::time::timeout(EVENT_TIMEOUT, BincodeCodec::new().decode(stream))
        .await
        .expect("timed out reading frame")
        .unwrap()
}

/// Poll `check` until it holds, failing the test after a few seconds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let started = tokio::time::Instant::now();
    while !check() {
        assert!(started.elapsed() < EVENT_TIMEOUT, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
