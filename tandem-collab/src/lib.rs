//! # tandem-collab — real-time synchronization for Tandem documents
//!
//! WebSocket transport, per-user operation sequencing, cursor presence,
//! and the relay server that fans edits out between clients.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐      WebSocket       ┌──────────────┐
//! │ CollabClient  │ ◄──────────────────► │ RelayServer  │
//! │ (per session) │   JSON per frame     │ (authority)  │
//! └──────┬────────┘                      └──────┬───────┘
//!        │ ClientEvent                          │
//!        ▼                                      ▼
//! ┌───────────────┐                     ┌──────────────┐
//! │ DocumentSession│                    │BroadcastGroup│
//! │ sequencer +    │                    │ (fan-out)    │
//! │ presence +     │                    └──────────────┘
//! │ editor surface │
//! └───────────────┘
//! ```
//!
//! The relay keeps no document state beyond a bounded edit log; each
//! client replays remote operations into its own tree, ordered per user
//! by origin timestamp within a short debounce window. Convergence is
//! best-effort by design: there is no operational transform, just a
//! single fan-out authority and self-healing resync.
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire protocol (`type`-tagged, `{ch}` offsets)
//! - [`client`] — transport client with reconnect backoff
//! - [`sequencer`] — per-user buffering, ordering, coalescing
//! - [`presence`] — remote cursors, TTL eviction, pixel projection
//! - [`session`] — per-document glue binding the pieces together
//! - [`broadcast`] — relay-side room fan-out
//! - [`server`] — the relay itself
//! - [`config`] — client/session/server tuning

pub mod broadcast;
pub mod client;
pub mod config;
pub mod presence;
pub mod protocol;
pub mod sequencer;
pub mod server;
pub mod session;

pub use broadcast::{BroadcastGroup, BroadcastStats};
pub use client::{
    backoff_delay, AuthProvider, ClientEvent, CollabClient, ConnectionState, TransportError,
};
pub use config::{ClientConfig, ServerConfig, SessionConfig};
pub use presence::{
    CursorColor, CursorRenderData, Point, PresenceTracker, Rect, RemoteCursor, RenderSurface,
};
pub use protocol::{
    ChPosition, ProtocolError, UserProfile, UserType, WireMessage, WireSelection,
};
pub use sequencer::{CursorUpdate, FlushOutcome, OpSequencer};
pub use server::{RelayServer, ServerStats};
pub use session::{DocumentSession, PageStore, StoreError};
