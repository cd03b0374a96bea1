//! WebSocket transport client for a single document channel.
//!
//! One client owns one connection to `{server_url}/{doc_id}?token=…` and
//! surfaces everything it hears as typed events on an mpsc channel. It is
//! constructed per document session; there is no shared global transport.
//!
//! Connection lifecycle:
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──open──► Connected
//!      ▲                          │                    │
//!      │                          └──handshake err──┐  │ close
//!      └◄──── backoff retry (≤ max attempts) ───────┴──┘
//! ```
//!
//! Sends are best-effort: a send while not Connected fails immediately
//! and is never queued. Reference: Kleppmann, Chapter 8 — the transport
//! makes no delivery promise; consistency is recovered at the sync layer.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::protocol::{ProtocolError, UserProfile, WireMessage};

/// Connection status surfaced to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the transport client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The connection status changed.
    StateChanged(ConnectionState),
    /// A decoded protocol message arrived.
    Message(WireMessage),
}

/// Transport-level failures. All recoverable; none abort the session.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("channel is not connected")]
    NotConnected,
    #[error("connection closed")]
    Closed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Supplies identity for the connection. Auth internals live elsewhere;
/// the client only needs a token and a profile.
pub trait AuthProvider: Send + Sync {
    fn token(&self) -> String;
    fn user_id(&self) -> Uuid;
    fn current_user(&self) -> UserProfile;
}

/// Delay before reconnect attempt `n` (1-based): `base * 2^(n-1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Next Lamport-style send timestamp: wall-clock millis, bumped past the
/// previous stamp so the sequence stays strictly monotonic even when the
/// clock stalls or steps backwards.
pub(crate) fn next_lamport(prev: u64, wall_ms: u64) -> u64 {
    wall_ms.max(prev + 1)
}

/// The transport client for one document channel.
pub struct CollabClient {
    inner: Arc<ClientInner>,
    event_rx: Option<mpsc::Receiver<ClientEvent>>,
}

struct ClientInner {
    config: ClientConfig,
    doc_id: Uuid,
    token: String,
    profile: UserProfile,
    state: RwLock<ConnectionState>,
    outgoing: RwLock<Option<mpsc::Sender<String>>>,
    event_tx: mpsc::Sender<ClientEvent>,
    /// Consecutive failed attempts; reset on every successful open.
    attempts: AtomicU32,
    /// Last issued send timestamp.
    clock: AtomicU64,
    /// Set by a deliberate disconnect; suppresses automatic reconnect.
    user_closed: AtomicBool,
}

impl CollabClient {
    /// Create a client for one document. Does not connect.
    pub fn new(config: ClientConfig, doc_id: Uuid, auth: &dyn AuthProvider) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let inner = ClientInner {
            config,
            doc_id,
            token: auth.token(),
            profile: auth.current_user(),
            state: RwLock::new(ConnectionState::Disconnected),
            outgoing: RwLock::new(None),
            event_tx,
            attempts: AtomicU32::new(0),
            clock: AtomicU64::new(0),
            user_closed: AtomicBool::new(false),
        };
        Self { inner: Arc::new(inner), event_rx: Some(event_rx) }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.event_rx.take()
    }

    /// Open the connection. A no-op when already Connecting or Connected.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.inner.user_closed.store(false, Ordering::SeqCst);
        ClientInner::connect(self.inner.clone()).await
    }

    /// Deliberately close the connection. No reconnect is scheduled.
    pub async fn disconnect(&self) {
        self.inner.user_closed.store(true, Ordering::SeqCst);
        *self.inner.outgoing.write().await = None;
        self.inner.transition(ConnectionState::Disconnected).await;
    }

    /// Send a message, stamping it with the next local timestamp.
    ///
    /// Fails fast when the channel is not Connected; messages are never
    /// queued for later. Returns the assigned timestamp.
    pub async fn send(&self, mut msg: WireMessage) -> Result<u64, TransportError> {
        if *self.inner.state.read().await != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let ts = self.inner.next_timestamp();
        msg.set_timestamp(ts);
        let frame = msg.encode()?;

        let guard = self.inner.outgoing.read().await;
        match guard.as_ref() {
            Some(tx) => tx
                .send(frame)
                .await
                .map_err(|_| TransportError::Closed)?,
            None => return Err(TransportError::NotConnected),
        }
        Ok(ts)
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    /// Last issued send timestamp.
    pub fn clock(&self) -> u64 {
        self.inner.clock.load(Ordering::SeqCst)
    }

    pub fn doc_id(&self) -> Uuid {
        self.inner.doc_id
    }

    pub fn profile(&self) -> &UserProfile {
        &self.inner.profile
    }

    pub fn local_user(&self) -> Uuid {
        self.inner.profile.user_id
    }
}

impl ClientInner {
    async fn connect(self: Arc<Self>) -> Result<(), TransportError> {
        {
            let mut state = self.state.write().await;
            if *state != ConnectionState::Disconnected {
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }
        self.emit(ClientEvent::StateChanged(ConnectionState::Connecting))
            .await;

        let url = format!("{}/{}?token={}", self.config.server_url, self.doc_id, self.token);
        match tokio_tungstenite::connect_async(&url).await {
            Ok((ws_stream, _)) => {
                // A successful open resets the retry budget.
                self.attempts.store(0, Ordering::SeqCst);

                let (mut ws_writer, mut ws_reader) = ws_stream.split();
                let (out_tx, mut out_rx) = mpsc::channel::<String>(self.config.send_buffer);
                *self.outgoing.write().await = Some(out_tx);

                // Writer task: forward the outgoing channel to the socket.
                tokio::spawn(async move {
                    while let Some(frame) = out_rx.recv().await {
                        if ws_writer.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    let _ = ws_writer.close().await;
                });

                self.transition(ConnectionState::Connected).await;
                log::info!("connected to document {}", self.doc_id);

                // Announce ourselves so the relay can place us in the room.
                let mut join = WireMessage::UserJoin {
                    user: self.profile.clone(),
                    timestamp: 0,
                };
                join.set_timestamp(self.next_timestamp());
                if let Ok(frame) = join.encode() {
                    let guard = self.outgoing.read().await;
                    if let Some(tx) = guard.as_ref() {
                        let _ = tx.send(frame).await;
                    }
                }

                // Reader task: decode frames, surface events, detect close.
                let inner = self.clone();
                tokio::spawn(async move {
                    while let Some(msg) = ws_reader.next().await {
                        match msg {
                            Ok(Message::Text(text)) => match WireMessage::decode(text.as_str()) {
                                Ok(decoded) => {
                                    inner.emit(ClientEvent::Message(decoded)).await;
                                }
                                Err(e) => {
                                    // Drop the frame, keep the connection.
                                    log::warn!("dropping malformed frame: {e}");
                                }
                            },
                            Ok(Message::Close(_)) | Err(_) => break,
                            _ => {}
                        }
                    }

                    *inner.outgoing.write().await = None;
                    inner.transition(ConnectionState::Disconnected).await;
                    if !inner.user_closed.load(Ordering::SeqCst) {
                        log::info!("connection to {} lost", inner.doc_id);
                        inner.schedule_reconnect();
                    }
                });

                Ok(())
            }
            Err(e) => {
                self.transition(ConnectionState::Disconnected).await;
                if !self.user_closed.load(Ordering::SeqCst) {
                    self.schedule_reconnect();
                }
                Err(TransportError::Connect(e.to_string()))
            }
        }
    }

    /// Arm the backoff timer for the next attempt, if budget remains.
    /// A successful connect in the meantime makes the fired attempt a
    /// no-op, which is how an obsolete timer gets canceled.
    fn schedule_reconnect(self: &Arc<Self>) {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > self.config.max_reconnect_attempts {
            log::warn!(
                "reconnect budget exhausted after {} attempts; staying disconnected",
                self.config.max_reconnect_attempts
            );
            return;
        }
        let delay = backoff_delay(self.config.base_delay, attempt);
        log::info!("reconnect attempt {attempt} in {delay:?}");

        let inner = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.user_closed.load(Ordering::SeqCst) {
                return;
            }
            let _ = ClientInner::connect(inner.clone()).await;
        });
    }

    /// Move to `to` if different, emitting a state-change event.
    async fn transition(&self, to: ConnectionState) {
        let changed = {
            let mut state = self.state.write().await;
            if *state == to {
                false
            } else {
                *state = to;
                true
            }
        };
        if changed {
            self.emit(ClientEvent::StateChanged(to)).await;
        }
    }

    async fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event).await;
    }

    fn next_timestamp(&self) -> u64 {
        let wall_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut prev = self.clock.load(Ordering::SeqCst);
        loop {
            let next = next_lamport(prev, wall_ms);
            match self
                .clock
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(observed) => prev = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestAuth(Uuid);

    impl AuthProvider for TestAuth {
        fn token(&self) -> String {
            "test-token".into()
        }
        fn user_id(&self) -> Uuid {
            self.0
        }
        fn current_user(&self) -> UserProfile {
            UserProfile::new(self.0, "Test User")
        }
    }

    fn test_client() -> CollabClient {
        let user = Uuid::new_v4();
        CollabClient::new(ClientConfig::default(), Uuid::new_v4(), &TestAuth(user))
    }

    #[tokio::test]
    async fn test_initial_state_disconnected() {
        let client = test_client();
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert_eq!(client.clock(), 0);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_fails_fast() {
        let client = test_client();
        let user = client.local_user();
        let result = client.send(WireMessage::insert(user, 0, "x")).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
        // Nothing was stamped: the clock never advanced.
        assert_eq!(client.clock(), 0);
    }

    #[tokio::test]
    async fn test_take_event_rx_only_once() {
        let mut client = test_client();
        assert!(client.take_event_rx().is_some());
        assert!(client.take_event_rx().is_none());
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_server_errors() {
        let user = Uuid::new_v4();
        let config = ClientConfig {
            // Reserved port on localhost; nothing listens here.
            server_url: "ws://127.0.0.1:1/doc".into(),
            base_delay: Duration::from_millis(1),
            max_reconnect_attempts: 0,
            ..ClientConfig::default()
        };
        let client = CollabClient::new(config, Uuid::new_v4(), &TestAuth(user));
        let result = client.connect().await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 5), Duration::from_millis(8000));
    }

    #[test]
    fn test_lamport_monotonic_under_stalled_clock() {
        let mut prev = 0;
        for _ in 0..5 {
            let next = next_lamport(prev, 1000);
            assert!(next > prev);
            prev = next;
        }
        // A clock far ahead wins outright.
        assert_eq!(next_lamport(prev, 50_000), 50_000);
    }

    #[test]
    fn test_connection_state_is_tri_state() {
        assert_ne!(ConnectionState::Disconnected, ConnectionState::Connecting);
        assert_ne!(ConnectionState::Connecting, ConnectionState::Connected);
    }
}
