//! Per-user ordering and coalescing of inbound remote operations.
//!
//! Bursty arrivals are buffered per user and flushed after a short
//! debounce window. Within a window, inserts flush in origin-timestamp
//! order, which tolerates out-of-order delivery from the relay. Deletes
//! carry no cursor-placement hazard and apply immediately.
//!
//! Cursor updates are the subtle case: a line-break insert and the
//! cursor move for the same keystroke can arrive as two frames, and
//! applying the cursor first would misplace it. A buffered cursor is
//! therefore held while inserts are pending for that user, and when a
//! flush applies inserts the cursor is derived from the last applied
//! insert's end offset instead of trusted from the wire.
//!
//! The sequencer never reads the clock itself: every entry point takes
//! `now`, and [`OpSequencer::next_deadline`] tells the caller when to
//! come back. Re-arming the deadline on each arrival is what cancels a
//! superseded flush.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::protocol::WireMessage;
use tandem_engine::Operation;

/// A remote user's cursor placement, ready for the presence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorUpdate {
    pub user_id: Uuid,
    pub offset: usize,
    pub selection: Option<(usize, usize)>,
    pub timestamp: u64,
}

/// What a sequencer step produced. Consumers must apply `operations`
/// to the tree before placing `cursors`.
#[derive(Debug, Default)]
pub struct FlushOutcome {
    pub operations: Vec<Operation>,
    pub cursors: Vec<CursorUpdate>,
}

impl FlushOutcome {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.cursors.is_empty()
    }
}

#[derive(Default)]
struct UserLane {
    inserts: Vec<Operation>,
    insert_due: Option<Instant>,
    cursor: Option<CursorUpdate>,
    cursor_due: Option<Instant>,
}

impl UserLane {
    fn is_idle(&self) -> bool {
        self.inserts.is_empty() && self.cursor.is_none()
    }
}

/// Buffers, orders, and coalesces inbound operations per remote user.
pub struct OpSequencer {
    local_user: Uuid,
    debounce: Duration,
    lanes: HashMap<Uuid, UserLane>,
}

impl OpSequencer {
    pub fn new(local_user: Uuid, debounce: Duration) -> Self {
        Self {
            local_user,
            debounce,
            lanes: HashMap::new(),
        }
    }

    /// Feed one inbound message. Returns whatever is ready right now:
    /// deletes pass straight through, inserts and cursors are buffered
    /// until their window elapses.
    ///
    /// Anything authored by the local user is discarded here — echo
    /// never reaches a buffer.
    pub fn offer(&mut self, msg: &WireMessage, now: Instant) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();
        match msg {
            WireMessage::TextInsert { user_id, .. } => {
                if *user_id == self.local_user {
                    log::trace!("ignoring echoed insert from {user_id}");
                    return outcome;
                }
                // as_operation is total for TextInsert
                if let Some(op) = msg.as_operation() {
                    let lane = self.lanes.entry(*user_id).or_default();
                    lane.inserts.push(op);
                    lane.insert_due = Some(now + self.debounce);
                }
            }
            WireMessage::TextDelete { user_id, .. } => {
                if *user_id == self.local_user {
                    log::trace!("ignoring echoed delete from {user_id}");
                    return outcome;
                }
                if let Some(op) = msg.as_operation() {
                    outcome.operations.push(op);
                }
            }
            WireMessage::CursorMove { user_id, position, selection, timestamp } => {
                if *user_id == self.local_user {
                    return outcome;
                }
                let lane = self.lanes.entry(*user_id).or_default();
                // Only the newest placement matters within a window.
                lane.cursor = Some(CursorUpdate {
                    user_id: *user_id,
                    offset: position.ch,
                    selection: selection.map(|s| (s.start.ch, s.end.ch)),
                    timestamp: *timestamp,
                });
                lane.cursor_due = Some(now + self.debounce);
            }
            _ => {}
        }
        outcome
    }

    /// Flush every lane whose window has elapsed.
    pub fn flush_due(&mut self, now: Instant) -> FlushOutcome {
        self.flush_lanes(Some(now))
    }

    /// Flush everything unconditionally (resync, shutdown).
    pub fn flush_all(&mut self) -> FlushOutcome {
        self.flush_lanes(None)
    }

    fn flush_lanes(&mut self, now: Option<Instant>) -> FlushOutcome {
        let due = |deadline: Option<Instant>| match (deadline, now) {
            (Some(d), Some(n)) => d <= n,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let mut outcome = FlushOutcome::default();
        for (user, lane) in self.lanes.iter_mut() {
            if due(lane.insert_due) {
                lane.insert_due = None;
                let mut batch = std::mem::take(&mut lane.inserts);
                batch.sort_by_key(|op| op.timestamp);

                if let Some(last) = batch.last() {
                    // Derive the cursor from the applied text, consuming
                    // any buffered wire placement for this user.
                    let wire = lane.cursor.take();
                    lane.cursor_due = None;
                    let timestamp = wire
                        .as_ref()
                        .map(|c| c.timestamp)
                        .unwrap_or(0)
                        .max(last.timestamp);
                    outcome.cursors.push(CursorUpdate {
                        user_id: *user,
                        offset: last.end_offset(),
                        selection: None,
                        timestamp,
                    });
                }
                outcome.operations.extend(batch);
            }

            if due(lane.cursor_due) {
                if lane.inserts.is_empty() {
                    lane.cursor_due = None;
                    if let Some(cursor) = lane.cursor.take() {
                        outcome.cursors.push(cursor);
                    }
                } else {
                    // Inserts arrived after the cursor: hold it until
                    // their flush, and advance the deadline with them.
                    lane.cursor_due = lane.insert_due;
                }
            }
        }
        self.lanes.retain(|_, lane| !lane.is_idle());
        outcome
    }

    /// Earliest pending flush deadline across all users.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lanes
            .values()
            .flat_map(|lane| [lane.insert_due, lane.cursor_due])
            .flatten()
            .min()
    }

    /// Buffered insert count for one user.
    pub fn pending_inserts(&self, user: Uuid) -> usize {
        self.lanes.get(&user).map_or(0, |lane| lane.inserts.len())
    }

    pub fn has_pending(&self) -> bool {
        !self.lanes.is_empty()
    }

    pub fn local_user(&self) -> Uuid {
        self.local_user
    }
}
