//! Configuration for clients, sessions, and the relay.

use std::time::Duration;

/// Transport client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base WebSocket URL, e.g. `ws://127.0.0.1:9090/doc`.
    pub server_url: String,
    /// First reconnect delay; attempt `n` waits `base_delay * 2^(n-1)`.
    pub base_delay: Duration,
    /// Reconnect budget. Exhausting it leaves the client Disconnected.
    pub max_reconnect_attempts: u32,
    /// Outgoing channel depth before sends start failing.
    pub send_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:9090/doc".to_string(),
            base_delay: Duration::from_millis(500),
            max_reconnect_attempts: 5,
            send_buffer: 256,
        }
    }
}

/// Session-level tuning: debounce and presence behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-user window for batching bursty inserts and cursor moves.
    pub debounce_window: Duration,
    /// Age after which a remote cursor is considered stale.
    pub presence_ttl: Duration,
    /// How often stale cursors are swept.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(50),
            presence_ttl: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: String,
    /// Maximum users per document room.
    pub max_users_per_room: usize,
    /// Broadcast channel capacity per room.
    pub broadcast_capacity: usize,
    /// Edits retained per room for answering sync requests.
    pub edit_log_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_users_per_room: 100,
            broadcast_capacity: 256,
            edit_log_capacity: 1024,
        }
    }
}
