//! Fan-out of wire frames to the other users in a document room.
//!
//! Uses tokio broadcast channels for O(1) send to all subscribers; each
//! connection gets an independent receiver buffering up to `capacity`
//! frames, so one lagging reader cannot stall the room.
//!
//! Reference: Kleppmann, Chapter 8 — Broadcast Protocols

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::UserProfile;

/// Room health counters.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub frames_sent: u64,
    pub active_users: usize,
}

/// Lock-free counters for the fan-out hot path.
struct AtomicStats {
    frames_sent: AtomicU64,
}

/// A broadcast group for one document room.
///
/// All users of the same document share one channel; a frame sent by one
/// is fanned out to every receiver. Filtering out the sender's own frame
/// happens at the connection task, which knows whose socket it serves.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<String>>,
    users: Arc<RwLock<HashMap<Uuid, UserProfile>>>,
    capacity: usize,
    stats: Arc<AtomicStats>,
}

impl BroadcastGroup {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            users: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            stats: Arc::new(AtomicStats { frames_sent: AtomicU64::new(0) }),
        }
    }

    /// Add a user, returning their receiver for room traffic.
    pub async fn join(&self, profile: UserProfile) -> broadcast::Receiver<Arc<String>> {
        let mut users = self.users.write().await;
        users.insert(profile.user_id, profile);
        self.sender.subscribe()
    }

    /// Remove a user from the room.
    pub async fn leave(&self, user_id: &Uuid) -> Option<UserProfile> {
        let mut users = self.users.write().await;
        users.remove(user_id)
    }

    /// Fan a pre-encoded frame out to every receiver. Lock-free.
    ///
    /// Returns the number of receivers it reached.
    pub fn send(&self, frame: Arc<String>) -> usize {
        let count = self.sender.send(frame).unwrap_or(0);
        self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn users(&self) -> Vec<UserProfile> {
        self.users.read().await.values().cloned().collect()
    }

    pub async fn has_user(&self, user_id: &Uuid) -> bool {
        self.users.read().await.contains_key(user_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        let users = self.users.read().await;
        BroadcastStats {
            frames_sent: self.stats.frames_sent.load(Ordering::Relaxed),
            active_users: users.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
