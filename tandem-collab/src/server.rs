//! WebSocket relay with room-based document routing.
//!
//! The relay is the single authority that fans every edit out to the
//! other users of a document. It keeps no document tree — only a bounded
//! log of recent edit frames per room, replayed to answer `sync-request`
//! after a reconnect.
//!
//! ```text
//! Client A ──┐
//!            ├── Room (doc_id) ── BroadcastGroup ──► fan-out
//! Client B ──┘         │
//!                      └── edit log (ring) ──► sync-response
//! ```
//!
//! Clients connect to `/{doc_id}?token=…`; the token is required but its
//! verification belongs to the auth layer, not the relay.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{self, Uri};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::broadcast::BroadcastGroup;
use crate::config::ServerConfig;
use crate::protocol::{UserProfile, WireMessage};

/// Server-wide counters.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_frames: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
}

/// One document room: fan-out group plus the replay log.
struct RelayRoom {
    broadcast: Arc<BroadcastGroup>,
    edit_log: VecDeque<WireMessage>,
}

impl RelayRoom {
    fn new(broadcast_capacity: usize) -> Self {
        Self {
            broadcast: Arc::new(BroadcastGroup::new(broadcast_capacity)),
            edit_log: VecDeque::new(),
        }
    }

    fn record_edit(&mut self, msg: WireMessage, capacity: usize) {
        if self.edit_log.len() >= capacity {
            self.edit_log.pop_front();
        }
        self.edit_log.push_back(msg);
    }
}

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    rooms: Arc<RwLock<HashMap<Uuid, RelayRoom>>>,
    stats: Arc<RwLock<ServerStats>>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            rooms: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind and serve forever.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("relay listening on {}", self.config.bind_addr);
        self.run_with_listener(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn run_with_listener(
        &self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("new TCP connection from {addr}");

            let rooms = self.rooms.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, rooms, stats, config).await {
                    log::error!("connection error from {addr}: {e}");
                }
            });
        }
    }

    pub async fn stats(&self) -> ServerStats {
        let mut stats = self.stats.read().await.clone();
        stats.active_rooms = self.rooms.read().await.len();
        stats
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }
}

/// Extract the document id and token from the request URI.
fn parse_route(uri: &Uri) -> Option<(Uuid, String)> {
    let doc_id = uri
        .path()
        .rsplit('/')
        .next()
        .and_then(|segment| Uuid::parse_str(segment).ok())?;
    let token = uri
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))?;
    if token.is_empty() {
        return None;
    }
    Some((doc_id, token.to_string()))
}

fn wall_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    rooms: Arc<RwLock<HashMap<Uuid, RelayRoom>>>,
    stats: Arc<RwLock<ServerStats>>,
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut route: Option<(Uuid, String)> = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        match parse_route(req.uri()) {
            Some(parsed) => {
                route = Some(parsed);
                Ok(resp)
            }
            None => Err(http::Response::builder()
                .status(http::StatusCode::BAD_REQUEST)
                .body(Some("expected /{doc_id}?token=…".to_string()))
                .expect("static rejection response")),
        }
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let (doc_id, _token) = match route {
        Some(route) => route,
        None => return Ok(()), // handshake was rejected
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    log::info!("connection from {addr} for document {doc_id}");
    {
        let mut s = stats.write().await;
        s.total_connections += 1;
        s.active_connections += 1;
    }

    // Connection-local state, filled in by the join handshake.
    let mut user: Option<UserProfile> = None;
    let mut broadcast_rx: Option<tokio::sync::broadcast::Receiver<Arc<String>>> = None;
    let mut group: Option<Arc<BroadcastGroup>> = None;

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let msg = match WireMessage::decode(text.as_str()) {
                            Ok(msg) => msg,
                            Err(e) => {
                                // Drop the frame; the connection survives.
                                log::warn!("malformed frame from {addr}: {e}");
                                continue;
                            }
                        };
                        {
                            let mut s = stats.write().await;
                            s.total_frames += 1;
                            s.total_bytes += text.len() as u64;
                        }

                        match &msg {
                            WireMessage::UserJoin { user: profile, .. } => {
                                let mut rooms_w = rooms.write().await;
                                let room = rooms_w
                                    .entry(doc_id)
                                    .or_insert_with(|| RelayRoom::new(config.broadcast_capacity));

                                if room.broadcast.user_count().await >= config.max_users_per_room {
                                    log::warn!(
                                        "room {doc_id} is full; rejecting {}",
                                        profile.display_name()
                                    );
                                    break;
                                }

                                let rx = room.broadcast.join(profile.clone()).await;
                                broadcast_rx = Some(rx);
                                group = Some(room.broadcast.clone());
                                user = Some(profile.clone());

                                // The joiner gets the room roster directly.
                                let roster = WireMessage::CurrentUsers {
                                    users: room.broadcast.users().await,
                                    timestamp: wall_ms(),
                                };
                                drop(rooms_w);
                                ws_sender
                                    .send(Message::Text(roster.encode()?.into()))
                                    .await?;

                                // Everyone else learns about the join.
                                if let Some(g) = &group {
                                    g.send(Arc::new(text.as_str().to_string()));
                                }
                                log::info!(
                                    "{} joined document {doc_id}",
                                    profile.display_name()
                                );
                            }

                            WireMessage::TextInsert { .. } | WireMessage::TextDelete { .. } => {
                                let mut rooms_w = rooms.write().await;
                                if let Some(room) = rooms_w.get_mut(&doc_id) {
                                    room.record_edit(msg.clone(), config.edit_log_capacity);
                                    room.broadcast.send(Arc::new(text.as_str().to_string()));
                                }
                            }

                            WireMessage::CursorMove { .. } => {
                                if let Some(g) = &group {
                                    g.send(Arc::new(text.as_str().to_string()));
                                }
                            }

                            WireMessage::SyncRequest { .. } => {
                                let edits = {
                                    let rooms_r = rooms.read().await;
                                    rooms_r
                                        .get(&doc_id)
                                        .map(|room| room.edit_log.iter().cloned().collect())
                                        .unwrap_or_default()
                                };
                                let response = WireMessage::SyncResponse {
                                    edits,
                                    timestamp: wall_ms(),
                                };
                                ws_sender
                                    .send(Message::Text(response.encode()?.into()))
                                    .await?;
                            }

                            WireMessage::UserLeave { .. } => {
                                if let Some(g) = &group {
                                    g.send(Arc::new(text.as_str().to_string()));
                                }
                                break;
                            }

                            other => {
                                log::debug!("unhandled frame from {addr}: {other:?}");
                            }
                        }
                    }

                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("connection closed from {addr}");
                        break;
                    }

                    Some(Ok(Message::Ping(data))) => {
                        ws_sender.send(Message::Pong(data)).await?;
                    }

                    Some(Err(e)) => {
                        log::error!("websocket error from {addr}: {e}");
                        break;
                    }

                    _ => {}
                }
            }

            outbound = async {
                match broadcast_rx.as_mut() {
                    Some(rx) => rx.recv().await,
                    // Not in a room yet — wait forever.
                    None => std::future::pending().await,
                }
            } => {
                match outbound {
                    Ok(frame) => {
                        // Never echo a frame back to its author.
                        if let Ok(decoded) = WireMessage::decode(&frame) {
                            if decoded.user_id() == user.as_ref().map(|u| u.user_id) {
                                continue;
                            }
                        }
                        ws_sender.send(Message::Text(frame.as_str().into())).await?;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("connection {addr} lagged by {n} frames");
                    }
                    Err(_) => break,
                }
            }
        }
    }

    // Cleanup: leave the room and tell the others.
    if let (Some(profile), Some(g)) = (&user, &group) {
        g.leave(&profile.user_id).await;

        let leave = WireMessage::UserLeave {
            user: profile.clone(),
            timestamp: wall_ms(),
        };
        if let Ok(frame) = leave.encode() {
            g.send(Arc::new(frame));
        }

        let mut rooms_w = rooms.write().await;
        if g.user_count().await == 0 {
            rooms_w.remove(&doc_id);
            log::info!("room {doc_id} removed (empty)");
        }
    }

    {
        let mut s = stats.write().await;
        s.active_connections = s.active_connections.saturating_sub(1);
    }

    Ok(())
}
