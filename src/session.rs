//! Peer Session
//!
//! One live connection to one peer, driven by its own task.
//!
//! ```text
//! CREATED → CONNECTING → HANDSHAKING → ACTIVE → CLOSED | FAILED
//! ```
//!
//! Each iteration of the active loop:
//! 1. stops if the activity deadline has passed (graceful close)
//! 2. waits up to `poll_interval` for one outbound message and writes it
//! 3. if inbound bytes are already buffered or readable, decodes exactly one
//!    message and hands it to the listener
//!
//! A session never reconnects by itself. Whatever the outcome, the listener
//! receives exactly one `on_disconnected`.

use futures::FutureExt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::codec::{CodecError, MessageCodec};
use crate::listener::{MessageSender, PeerListener};
use crate::transport::Dialer;
use crate::types::Message;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Well-known peer port
pub const DEFAULT_PEER_PORT: u16 = 8333;

/// Connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read timeout once connected
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Activity deadline granted right after connecting
pub const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(60);

/// Bounded wait for an outbound message per loop iteration
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Outbound queue capacity
pub const OUTBOUND_QUEUE_CAPACITY: usize = 100;

/// Bounded wait for the loop to exit after a close request
pub const CLOSE_WAIT: Duration = Duration::from_secs(1);

// =============================================================================
// CONFIG, STATE, ERRORS
// =============================================================================

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub handshake_deadline: Duration,
    pub poll_interval: Duration,
    pub queue_capacity: usize,
    pub close_wait: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PEER_PORT,
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            handshake_deadline: HANDSHAKE_DEADLINE,
            poll_interval: POLL_INTERVAL,
            queue_capacity: OUTBOUND_QUEUE_CAPACITY,
            close_wait: CLOSE_WAIT,
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Connecting,
    Handshaking,
    Active,
    /// Ended without error (deadline, close request)
    Closed,
    /// Ended by a connect, transport or protocol error
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// Error type for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connect to {address} timed out")]
    ConnectTimeout { address: String },

    #[error("Connect to {address} failed: {source}")]
    Connect { address: String, source: io::Error },

    #[error("Transport failure: {0}")]
    ReadWrite(#[source] io::Error),

    #[error("Malformed inbound message: {0}")]
    Decode(#[source] CodecError),

    #[error("Cannot encode outbound message: {0}")]
    Encode(#[source] CodecError),

    #[error("Session interrupted by close request")]
    Interrupted,

    #[error("Outbound queue full ({capacity} messages)")]
    QueueFull { capacity: usize },

    #[error("Session is not running")]
    NotRunning,
}

impl SessionError {
    /// Failed before the session was established
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, SessionError::ConnectTimeout { .. } | SessionError::Connect { .. })
    }

    fn connect(address: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::TimedOut {
            SessionError::ConnectTimeout {
                address: address.to_string(),
            }
        } else {
            SessionError::Connect {
                address: address.to_string(),
                source,
            }
        }
    }

    fn read(error: CodecError) -> Self {
        match error {
            CodecError::Io(e) => SessionError::ReadWrite(e),
            other => SessionError::Decode(other),
        }
    }
}

fn timed_out(what: &str, after: Duration) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} timed out after {:?}", what, after))
}

// =============================================================================
// SESSION HANDLE
// =============================================================================

/// Shared handle to one session
///
/// The handle is what the pool keeps in its map and what listeners receive
/// as the message sender. The session task owns the transport.
pub struct SessionHandle {
    address: String,
    config: SessionConfig,

    /// Producer side of the outbound queue
    outbound: mpsc::Sender<Message>,

    /// Consumer side, taken by the task on start
    outbound_rx: Mutex<Option<mpsc::Receiver<Message>>>,

    /// Absolute time after which the session is considered stalled
    deadline: Mutex<Instant>,

    state: Mutex<SessionState>,
    running: AtomicBool,

    /// Set once the transport is established
    connected: AtomicBool,

    /// Wakes the loop early on a close request
    close: Notify,

    /// Flips to true after the disconnect has been reported
    exited: watch::Sender<bool>,
}

impl SessionHandle {
    pub fn new(address: impl Into<String>, config: SessionConfig) -> Arc<Self> {
        let (outbound, outbound_rx) = mpsc::channel(config.queue_capacity);
        let deadline = Instant::now() + config.handshake_deadline;
        let (exited, _) = watch::channel(false);

        Arc::new(Self {
            address: address.into(),
            config,
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            deadline: Mutex::new(deadline),
            state: Mutex::new(SessionState::Created),
            running: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            close: Notify::new(),
            exited,
        })
    }

    /// Spawn the session task
    ///
    /// A handle can be started once; later calls fail with `NotRunning`.
    pub fn start(
        self: &Arc<Self>,
        dialer: Arc<dyn Dialer>,
        codec: Arc<dyn MessageCodec>,
        listener: Arc<dyn PeerListener>,
    ) -> Result<(), SessionError> {
        let outbound_rx = lock(&self.outbound_rx).take().ok_or(SessionError::NotRunning)?;

        self.running.store(true, Ordering::Release);
        self.set_state(SessionState::Connecting);

        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.run(outbound_rx, dialer, codec, listener).await;
        });
        Ok(())
    }

    /// Queue a message without blocking
    pub fn enqueue(&self, message: Message) -> Result<(), SessionError> {
        self.outbound.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SessionError::QueueFull {
                capacity: self.config.queue_capacity,
            },
            mpsc::error::TrySendError::Closed(_) => SessionError::NotRunning,
        })
    }

    /// Move the activity deadline to `duration` from now
    pub fn extend_deadline(&self, duration: Duration) {
        *lock(&self.deadline) = Instant::now() + duration;
    }

    /// Ask the loop to stop and wait a bounded time for it to exit
    ///
    /// Every concurrent caller waits for the same exit. Returns regardless of
    /// whether the task finished in time.
    pub async fn request_close(&self) {
        self.running.store(false, Ordering::Release);
        self.close.notify_one();

        if lock(&self.outbound_rx).is_some() {
            // Never started, nothing to wait for
            return;
        }

        let mut exited = self.exited.subscribe();
        let wait = async move { exited.wait_for(|exited| *exited).await.is_ok() };
        if tokio::time::timeout(self.config.close_wait, wait).await.is_err() {
            warn!(
                "Session {} did not stop within {:?}, continuing",
                self.address, self.config.close_wait
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the transport was ever established
    pub fn has_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    fn deadline_passed(&self) -> bool {
        Instant::now() > *lock(&self.deadline)
    }

    /// Task body: run the session, then report exactly one disconnect
    async fn run(
        self: Arc<Self>,
        outbound_rx: mpsc::Receiver<Message>,
        dialer: Arc<dyn Dialer>,
        codec: Arc<dyn MessageCodec>,
        listener: Arc<dyn PeerListener>,
    ) {
        let result = self
            .drive(outbound_rx, dialer.as_ref(), codec.as_ref(), listener.as_ref())
            .await;
        self.running.store(false, Ordering::Release);

        match result {
            Ok(()) | Err(SessionError::Interrupted) => {
                self.set_state(SessionState::Closed);
                info!("Peer {} session closed", self.address);
                listener.on_disconnected(&self.address, None);
            }
            Err(e) => {
                self.set_state(SessionState::Failed);
                warn!("Peer {} session failed: {}", self.address, e);
                listener.on_disconnected(&self.address, Some(&e));
            }
        }
        self.exited.send_replace(true);
    }

    async fn drive(
        &self,
        mut outbound_rx: mpsc::Receiver<Message>,
        dialer: &dyn Dialer,
        codec: &dyn MessageCodec,
        listener: &dyn PeerListener,
    ) -> Result<(), SessionError> {
        let stream = tokio::select! {
            result = dialer.dial(&self.address, self.config.port, self.config.connect_timeout) => {
                result.map_err(|e| SessionError::connect(&self.address, e))?
            }
            _ = self.close.notified() => return Err(SessionError::Interrupted),
        };
        let remote = stream.peer_addr().map_err(SessionError::ReadWrite)?;

        self.connected.store(true, Ordering::Release);
        self.set_state(SessionState::Handshaking);
        self.extend_deadline(self.config.handshake_deadline);
        listener.on_connected(&self.address);
        self.enqueue(codec.handshake(remote))?;

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        self.set_state(SessionState::Active);
        debug!("Peer {} session active ({})", self.address, remote);

        while self.is_running() {
            if self.deadline_passed() {
                info!("Peer {} session timed out", self.address);
                return Ok(());
            }

            let next = tokio::select! {
                message = outbound_rx.recv() => message,
                _ = tokio::time::sleep(self.config.poll_interval) => None,
                _ = self.close.notified() => None,
            };

            if !self.is_running() {
                break;
            }

            if let Some(message) = next {
                self.write_message(&mut write_half, codec, &message).await?;
            }

            if self.is_running() && inbound_ready(&mut reader)? {
                let message = self.read_message(&mut reader, codec).await?;
                debug!("Peer {} msg in <= {}", self.address, message);
                listener.on_message(self, message);
            }
        }

        Err(SessionError::Interrupted)
    }

    async fn write_message(
        &self,
        writer: &mut OwnedWriteHalf,
        codec: &dyn MessageCodec,
        message: &Message,
    ) -> Result<(), SessionError> {
        let frame = codec.encode(message).map_err(SessionError::Encode)?;
        debug!("Peer {} msg out => {}", self.address, message);

        tokio::time::timeout(self.config.read_timeout, writer.write_all(&frame))
            .await
            .map_err(|_| SessionError::ReadWrite(timed_out("write", self.config.read_timeout)))?
            .map_err(SessionError::ReadWrite)
    }

    async fn read_message(
        &self,
        reader: &mut BufReader<OwnedReadHalf>,
        codec: &dyn MessageCodec,
    ) -> Result<Message, SessionError> {
        tokio::time::timeout(self.config.read_timeout, codec.decode(reader))
            .await
            .map_err(|_| SessionError::ReadWrite(timed_out("read", self.config.read_timeout)))?
            .map_err(SessionError::read)
    }
}

impl MessageSender for SessionHandle {
    fn address(&self) -> &str {
        &self.address
    }

    fn send(&self, message: Message) -> Result<(), SessionError> {
        self.enqueue(message)
    }

    fn set_deadline(&self, duration: Duration) {
        self.extend_deadline(duration);
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("address", &self.address)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Whether inbound bytes can be read without waiting
///
/// A readable stream with nothing in it means the peer closed the
/// connection.
fn inbound_ready(reader: &mut BufReader<OwnedReadHalf>) -> Result<bool, SessionError> {
    match reader.fill_buf().now_or_never() {
        None => Ok(false),
        Some(Ok(buf)) if buf.is_empty() => Err(SessionError::ReadWrite(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by peer",
        ))),
        Some(Ok(_)) => Ok(true),
        Some(Err(e)) => Err(SessionError::ReadWrite(e)),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BincodeCodec;
    use crate::tests::support::{
        accept_and_read_handshake, fast_session_config, Event, LoopbackDialer, RecordingListener,
        StallDialer,
    };
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn start(
        handle: &Arc<SessionHandle>,
        port: u16,
        listener: Arc<RecordingListener>,
    ) {
        handle
            .start(
                Arc::new(LoopbackDialer::new(port)),
                Arc::new(BincodeCodec::new()),
                listener,
            )
            .unwrap();
    }

    #[test]
    fn test_queue_capacity() {
        let handle = SessionHandle::new("1.2.3.4", SessionConfig::default());

        for i in 0..OUTBOUND_QUEUE_CAPACITY {
            assert!(handle.enqueue(Message::Ping { nonce: i as u64 }).is_ok());
        }
        let result = handle.enqueue(Message::Ping { nonce: 100 });
        assert!(matches!(result, Err(SessionError::QueueFull { capacity: 100 })));
    }

    #[test]
    fn test_new_session_state() {
        let handle = SessionHandle::new("1.2.3.4", SessionConfig::default());
        assert_eq!(handle.state(), SessionState::Created);
        assert!(!handle.is_running());
        assert_eq!(handle.address(), "1.2.3.4");
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let handle = SessionHandle::new("peer", fast_session_config());
        let (listener, _events) = RecordingListener::new();

        start(&handle, port, listener.clone());
        let again = handle.start(
            Arc::new(LoopbackDialer::new(port)),
            Arc::new(BincodeCodec::new()),
            listener,
        );
        assert!(matches!(again, Err(SessionError::NotRunning)));
        handle.request_close().await;
    }

    #[tokio::test]
    async fn test_connect_refused_reports_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let handle = SessionHandle::new("peer", fast_session_config());
        let (listener, mut events) = RecordingListener::new();

        start(&handle, port, listener);

        match events.next().await {
            Event::Disconnected { address, error: Some(error) } => {
                assert_eq!(address, "peer");
                assert!(error.contains("Connect"), "unexpected error: {}", error);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(events.none_within(Duration::from_millis(200)).await);
        assert_eq!(handle.state(), SessionState::Failed);
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_handshake_sent_automatically() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let handle = SessionHandle::new("peer", fast_session_config());
        let (listener, mut events) = RecordingListener::new();

        start(&handle, port, listener);

        let (_stream, first) = accept_and_read_handshake(&server).await;
        assert!(matches!(first, Message::Version { .. }));
        assert_eq!(events.next().await, Event::Connected("peer".to_string()));

        handle.request_close().await;
    }

    #[tokio::test]
    async fn test_idle_session_closes_at_deadline() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let mut config = fast_session_config();
        config.handshake_deadline = Duration::from_millis(600);
        let handle = SessionHandle::new("peer", config);
        let (listener, mut events) = RecordingListener::new();

        let started = Instant::now();
        start(&handle, port, listener);
        let (_stream, _) = accept_and_read_handshake(&server).await;

        assert_eq!(events.next().await, Event::Connected("peer".to_string()));
        assert_eq!(
            events.next().await,
            Event::Disconnected { address: "peer".to_string(), error: None }
        );

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(600));
        // deadline plus one loop iteration, with slack
        assert!(elapsed < Duration::from_millis(600) + Duration::from_secs(1));
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_extend_deadline_keeps_session_alive() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let mut config = fast_session_config();
        config.handshake_deadline = Duration::from_millis(300);
        let handle = SessionHandle::new("peer", config);
        let (listener, mut events) = RecordingListener::new();

        start(&handle, port, listener);
        let (_stream, _) = accept_and_read_handshake(&server).await;
        assert_eq!(events.next().await, Event::Connected("peer".to_string()));

        handle.extend_deadline(Duration::from_secs(30));
        assert!(events.none_within(Duration::from_millis(800)).await);
        assert!(handle.is_running());

        handle.request_close().await;
        assert_eq!(
            events.next().await,
            Event::Disconnected { address: "peer".to_string(), error: None }
        );
    }

    #[tokio::test]
    async fn test_outbound_messages_in_enqueue_order() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let handle = SessionHandle::new("peer", fast_session_config());
        let (listener, _events) = RecordingListener::new();
        let codec = BincodeCodec::new();

        for nonce in 1..=3 {
            handle.enqueue(Message::Ping { nonce }).unwrap();
        }
        start(&handle, port, listener);

        let (mut stream, first) = accept_and_read_handshake(&server).await;
        // Queued before connecting, so they precede the handshake
        assert_eq!(first, Message::Ping { nonce: 1 });
        for expected in [Message::Ping { nonce: 2 }, Message::Ping { nonce: 3 }] {
            assert_eq!(codec.decode(&mut stream).await.unwrap(), expected);
        }
        assert!(matches!(codec.decode(&mut stream).await.unwrap(), Message::Version { .. }));

        handle.request_close().await;
    }

    #[tokio::test]
    async fn test_inbound_messages_dispatched_in_order() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let handle = SessionHandle::new("peer", fast_session_config());
        let (listener, mut events) = RecordingListener::new();
        let codec = BincodeCodec::new();

        start(&handle, port, listener);
        let (mut stream, _) = accept_and_read_handshake(&server).await;
        assert_eq!(events.next().await, Event::Connected("peer".to_string()));

        let mut burst = Vec::new();
        for nonce in 1..=3 {
            burst.extend(codec.encode(&Message::Ping { nonce }).unwrap());
        }
        stream.write_all(&burst).await.unwrap();

        for nonce in 1..=3 {
            assert_eq!(
                events.next().await,
                Event::Message { address: "peer".to_string(), message: Message::Ping { nonce } }
            );
        }

        handle.request_close().await;
    }

    #[tokio::test]
    async fn test_malformed_inbound_fails_session() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let handle = SessionHandle::new("peer", fast_session_config());
        let (listener, mut events) = RecordingListener::new();

        start(&handle, port, listener);
        let (mut stream, _) = accept_and_read_handshake(&server).await;
        assert_eq!(events.next().await, Event::Connected("peer".to_string()));

        stream.write_all(b"garbage!garbage!").await.unwrap();

        match events.next().await {
            Event::Disconnected { error: Some(error), .. } => {
                assert!(error.contains("Malformed"), "unexpected error: {}", error);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(handle.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_peer_hangup_fails_session() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let handle = SessionHandle::new("peer", fast_session_config());
        let (listener, mut events) = RecordingListener::new();

        start(&handle, port, listener);
        let (stream, _) = accept_and_read_handshake(&server).await;
        assert_eq!(events.next().await, Event::Connected("peer".to_string()));
        drop(stream);

        match events.next().await {
            Event::Disconnected { error: Some(_), .. } => {}
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_close_is_graceful_and_bounded() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let mut config = fast_session_config();
        config.poll_interval = Duration::from_secs(5);
        let handle = SessionHandle::new("peer", config);
        let (listener, mut events) = RecordingListener::new();

        start(&handle, port, listener);
        let (_stream, _) = accept_and_read_handshake(&server).await;
        assert_eq!(events.next().await, Event::Connected("peer".to_string()));

        let started = Instant::now();
        handle.request_close().await;
        // Woken by the close signal rather than the 5s poll
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!handle.is_running());
        assert_eq!(
            events.next().await,
            Event::Disconnected { address: "peer".to_string(), error: None }
        );
        assert!(matches!(
            handle.enqueue(Message::Verack),
            Err(SessionError::NotRunning)
        ));
        assert!(handle.has_connected());
    }

    #[tokio::test]
    async fn test_close_while_connecting_never_connects() {
        let handle = SessionHandle::new("peer", fast_session_config());
        let (listener, mut events) = RecordingListener::new();
        handle
            .start(Arc::new(StallDialer), Arc::new(BincodeCodec::new()), listener)
            .unwrap();

        handle.request_close().await;

        assert_eq!(
            events.next().await,
            Event::Disconnected { address: "peer".to_string(), error: None }
        );
        assert!(!handle.has_connected());
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_concurrent_close_requests_all_wait_for_exit() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let handle = SessionHandle::new("peer", fast_session_config());
        let (listener, mut events) = RecordingListener::new();

        start(&handle, port, listener);
        let (_stream, _) = accept_and_read_handshake(&server).await;
        assert_eq!(events.next().await, Event::Connected("peer".to_string()));

        let first = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.request_close().await })
        };
        handle.request_close().await;

        // The second caller only returns once the disconnect was reported
        assert!(handle.state().is_terminal());
        assert_eq!(
            events.next().await,
            Event::Disconnected { address: "peer".to_string(), error: None }
        );
        first.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_before_start_returns_immediately() {
        let handle = SessionHandle::new("peer", fast_session_config());
        let started = Instant::now();
        handle.request_close().await;
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(handle.state(), SessionState::Created);
    }
}
