//! JSON wire protocol for document channels.
//!
//! One JSON object per WebSocket text frame, each carrying a `type` tag
//! and a sender-assigned `timestamp`. All positions travel as
//! single-field character offsets (`{"ch": n}`); line/column pairs never
//! cross the wire.
//!
//! ```text
//! ┌───────────────┬─────────────────────────────────────────┬───────────┐
//! │ type          │ payload                                 │ direction │
//! ├───────────────┼─────────────────────────────────────────┼───────────┤
//! │ current-users │ users: [profile…]                       │ s → c     │
//! │ user-join     │ profile                                 │ s ⇄ c     │
//! │ user-leave    │ profile                                 │ s → c     │
//! │ cursor-move   │ userId, position, selection?            │ s ⇄ c     │
//! │ text-insert   │ userId, text, position                  │ s ⇄ c     │
//! │ text-delete   │ userId, from, to                        │ s ⇄ c     │
//! │ sync-request  │ —                                       │ c → s     │
//! │ sync-response │ edits: [message…]                       │ s → c     │
//! └───────────────┴─────────────────────────────────────────┴───────────┘
//! ```
//!
//! A malformed payload is a [`ProtocolError`]: the message is logged and
//! dropped, the connection stays open.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use tandem_engine::{Operation, TextEdit};

/// Single-field character-offset position as transmitted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChPosition {
    pub ch: usize,
}

impl ChPosition {
    pub fn new(ch: usize) -> Self {
        Self { ch }
    }
}

impl From<usize> for ChPosition {
    fn from(ch: usize) -> Self {
        Self { ch }
    }
}

/// A selection range in wire coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSelection {
    pub start: ChPosition,
    pub end: ChPosition,
}

impl WireSelection {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start: start.into(), end: end.into() }
    }
}

/// Whether a user may edit or only observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Editor,
    Viewer,
}

/// Identity and display metadata for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Hex cursor color, e.g. `"#e8590c"`. Absent means derive from id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub user_type: UserType,
}

impl UserProfile {
    pub fn new(user_id: Uuid, full_name: impl Into<String>) -> Self {
        Self {
            user_id,
            full_name: Some(full_name.into()),
            email: None,
            color: None,
            user_type: UserType::Editor,
        }
    }

    /// Name to render next to this user's cursor.
    pub fn display_name(&self) -> String {
        self.full_name
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| format!("User-{}", &self.user_id.to_string()[..8]))
    }
}

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum WireMessage {
    CurrentUsers {
        users: Vec<UserProfile>,
        timestamp: u64,
    },
    UserJoin {
        #[serde(flatten)]
        user: UserProfile,
        timestamp: u64,
    },
    UserLeave {
        #[serde(flatten)]
        user: UserProfile,
        timestamp: u64,
    },
    CursorMove {
        user_id: Uuid,
        position: ChPosition,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection: Option<WireSelection>,
        timestamp: u64,
    },
    TextInsert {
        user_id: Uuid,
        text: String,
        position: ChPosition,
        timestamp: u64,
    },
    TextDelete {
        user_id: Uuid,
        from: ChPosition,
        to: ChPosition,
        timestamp: u64,
    },
    SyncRequest {
        timestamp: u64,
    },
    SyncResponse {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        edits: Vec<WireMessage>,
        timestamp: u64,
    },
}

impl WireMessage {
    pub fn insert(user_id: Uuid, at: usize, text: impl Into<String>) -> Self {
        WireMessage::TextInsert {
            user_id,
            text: text.into(),
            position: at.into(),
            timestamp: 0,
        }
    }

    pub fn delete(user_id: Uuid, from: usize, to: usize) -> Self {
        WireMessage::TextDelete {
            user_id,
            from: from.into(),
            to: to.into(),
            timestamp: 0,
        }
    }

    pub fn cursor(user_id: Uuid, offset: usize, selection: Option<(usize, usize)>) -> Self {
        WireMessage::CursorMove {
            user_id,
            position: offset.into(),
            selection: selection.map(|(s, e)| WireSelection::new(s, e)),
            timestamp: 0,
        }
    }

    /// Serialize to a single JSON object (one wire frame).
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Deserialize one wire frame.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    /// The authoring user, where the message has one.
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            WireMessage::UserJoin { user, .. } | WireMessage::UserLeave { user, .. } => {
                Some(user.user_id)
            }
            WireMessage::CursorMove { user_id, .. }
            | WireMessage::TextInsert { user_id, .. }
            | WireMessage::TextDelete { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            WireMessage::CurrentUsers { timestamp, .. }
            | WireMessage::UserJoin { timestamp, .. }
            | WireMessage::UserLeave { timestamp, .. }
            | WireMessage::CursorMove { timestamp, .. }
            | WireMessage::TextInsert { timestamp, .. }
            | WireMessage::TextDelete { timestamp, .. }
            | WireMessage::SyncRequest { timestamp }
            | WireMessage::SyncResponse { timestamp, .. } => *timestamp,
        }
    }

    /// Stamp the sender timestamp just before transmission.
    pub fn set_timestamp(&mut self, ts: u64) {
        match self {
            WireMessage::CurrentUsers { timestamp, .. }
            | WireMessage::UserJoin { timestamp, .. }
            | WireMessage::UserLeave { timestamp, .. }
            | WireMessage::CursorMove { timestamp, .. }
            | WireMessage::TextInsert { timestamp, .. }
            | WireMessage::TextDelete { timestamp, .. }
            | WireMessage::SyncRequest { timestamp }
            | WireMessage::SyncResponse { timestamp, .. } => *timestamp = ts,
        }
    }

    /// Whether this message mutates document text (and so belongs in the
    /// relay's replay log).
    pub fn is_edit(&self) -> bool {
        matches!(
            self,
            WireMessage::TextInsert { .. } | WireMessage::TextDelete { .. }
        )
    }

    /// View an edit message as an engine operation.
    pub fn as_operation(&self) -> Option<Operation> {
        match self {
            WireMessage::TextInsert { user_id, text, position, timestamp } => Some(
                Operation::insert(*user_id, *timestamp, position.ch, text.clone()),
            ),
            WireMessage::TextDelete { user_id, from, to, timestamp } => {
                Some(Operation::delete(*user_id, *timestamp, from.ch, to.ch))
            }
            _ => None,
        }
    }

    /// Build the wire form of a local edit.
    pub fn from_edit(user_id: Uuid, edit: &TextEdit) -> Self {
        match edit {
            TextEdit::Insert { at, text } => WireMessage::insert(user_id, *at, text.clone()),
            TextEdit::Delete { from, to } => WireMessage::delete(user_id, *from, *to),
        }
    }
}

/// Protocol-level failures.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(String),
    #[error("failed to decode message: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_round_trip() {
        let user = Uuid::new_v4();
        let mut msg = WireMessage::insert(user, 5, "hi");
        msg.set_timestamp(42);

        let encoded = msg.encode().unwrap();
        let decoded = WireMessage::decode(&encoded).unwrap();
        assert_eq!(msg, decoded);
        assert_eq!(decoded.timestamp(), 42);
        assert_eq!(decoded.user_id(), Some(user));
    }

    #[test]
    fn test_insert_wire_shape() {
        let user = Uuid::new_v4();
        let mut msg = WireMessage::insert(user, 5, "hi");
        msg.set_timestamp(7);

        let value: serde_json::Value =
            serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "text-insert");
        assert_eq!(value["userId"], user.to_string());
        assert_eq!(value["position"]["ch"], 5);
        assert_eq!(value["text"], "hi");
        assert_eq!(value["timestamp"], 7);
    }

    #[test]
    fn test_delete_wire_shape() {
        let msg = WireMessage::delete(Uuid::new_v4(), 3, 9);
        let value: serde_json::Value =
            serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "text-delete");
        assert_eq!(value["from"]["ch"], 3);
        assert_eq!(value["to"]["ch"], 9);
    }

    #[test]
    fn test_cursor_move_selection_optional() {
        let bare = WireMessage::cursor(Uuid::new_v4(), 4, None);
        let value: serde_json::Value =
            serde_json::from_str(&bare.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "cursor-move");
        assert_eq!(value["position"]["ch"], 4);
        assert!(value.get("selection").is_none());

        let with_sel = WireMessage::cursor(Uuid::new_v4(), 4, Some((1, 4)));
        let value: serde_json::Value =
            serde_json::from_str(&with_sel.encode().unwrap()).unwrap();
        assert_eq!(value["selection"]["start"]["ch"], 1);
        assert_eq!(value["selection"]["end"]["ch"], 4);
    }

    #[test]
    fn test_user_join_flattens_profile() {
        let profile = UserProfile::new(Uuid::new_v4(), "Alice");
        let msg = WireMessage::UserJoin { user: profile.clone(), timestamp: 1 };

        let value: serde_json::Value =
            serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "user-join");
        // Profile fields sit at the top level, not under a nested key.
        assert_eq!(value["userId"], profile.user_id.to_string());
        assert_eq!(value["fullName"], "Alice");
        assert_eq!(value["userType"], "editor");
        assert!(value.get("email").is_none());

        let decoded = WireMessage::decode(&value.to_string()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_current_users_round_trip() {
        let msg = WireMessage::CurrentUsers {
            users: vec![
                UserProfile::new(Uuid::new_v4(), "Alice"),
                UserProfile {
                    user_id: Uuid::new_v4(),
                    full_name: None,
                    email: Some("bob@example.com".into()),
                    color: Some("#e8590c".into()),
                    user_type: UserType::Viewer,
                },
            ],
            timestamp: 3,
        };
        let decoded = WireMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_sync_response_nests_edit_messages() {
        let user = Uuid::new_v4();
        let msg = WireMessage::SyncResponse {
            edits: vec![
                WireMessage::insert(user, 0, "a"),
                WireMessage::delete(user, 0, 1),
            ],
            timestamp: 9,
        };
        let decoded = WireMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_sync_response_edits_default_to_empty() {
        let decoded =
            WireMessage::decode(r#"{"type":"sync-response","timestamp":1}"#).unwrap();
        assert_eq!(
            decoded,
            WireMessage::SyncResponse { edits: Vec::new(), timestamp: 1 }
        );
    }

    #[test]
    fn test_decode_known_frame() {
        let raw = r#"{
            "type": "cursor-move",
            "userId": "550e8400-e29b-41d4-a716-446655440000",
            "position": {"ch": 12},
            "timestamp": 100
        }"#;
        let msg = WireMessage::decode(raw).unwrap();
        match msg {
            WireMessage::CursorMove { position, selection, .. } => {
                assert_eq!(position.ch, 12);
                assert!(selection.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_garbage_is_error() {
        assert!(WireMessage::decode("not json").is_err());
        assert!(WireMessage::decode(r#"{"type":"warp-drive"}"#).is_err());
    }

    #[test]
    fn test_as_operation() {
        let user = Uuid::new_v4();
        let mut insert = WireMessage::insert(user, 2, "xy");
        insert.set_timestamp(5);
        let op = insert.as_operation().unwrap();
        assert_eq!(op, Operation::insert(user, 5, 2, "xy"));

        let mut delete = WireMessage::delete(user, 1, 4);
        delete.set_timestamp(6);
        let op = delete.as_operation().unwrap();
        assert_eq!(op, Operation::delete(user, 6, 1, 4));

        assert!(WireMessage::SyncRequest { timestamp: 0 }.as_operation().is_none());
    }

    #[test]
    fn test_from_edit() {
        let user = Uuid::new_v4();
        let edit = TextEdit::Insert { at: 3, text: "q".into() };
        let msg = WireMessage::from_edit(user, &edit);
        assert!(msg.is_edit());
        assert_eq!(msg.user_id(), Some(user));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let named = UserProfile::new(id, "Alice");
        assert_eq!(named.display_name(), "Alice");

        let email_only = UserProfile {
            user_id: id,
            full_name: None,
            email: Some("bob@example.com".into()),
            color: None,
            user_type: UserType::Editor,
        };
        assert_eq!(email_only.display_name(), "bob@example.com");

        let anonymous = UserProfile {
            user_id: id,
            full_name: None,
            email: None,
            color: None,
            user_type: UserType::Viewer,
        };
        assert_eq!(anonymous.display_name(), "User-550e8400");
    }
}
