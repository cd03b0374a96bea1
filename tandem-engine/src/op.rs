//! Edit operations and their attribution.
//!
//! A [`TextEdit`] describes a pure text mutation in flattened character
//! coordinates. An [`Operation`] attributes an edit to an author and a
//! sender-assigned timestamp; it is the unit of wire transmission and is
//! immutable once created.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a tree mutation came from.
///
/// Threaded explicitly through the apply path so a remote application can
/// never be mistaken for a local edit and re-broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// An unattributed text mutation in character-offset coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEdit {
    Insert { at: usize, text: String },
    Delete { from: usize, to: usize },
}

impl TextEdit {
    /// Caret offset immediately after this edit is applied.
    pub fn end_offset(&self) -> usize {
        match self {
            TextEdit::Insert { at, text } => at + text.chars().count(),
            TextEdit::Delete { from, .. } => *from,
        }
    }
}

/// An attributed, timestamped edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub user_id: Uuid,
    pub timestamp: u64,
    pub edit: TextEdit,
}

impl Operation {
    pub fn insert(user_id: Uuid, timestamp: u64, at: usize, text: impl Into<String>) -> Self {
        Self {
            user_id,
            timestamp,
            edit: TextEdit::Insert { at, text: text.into() },
        }
    }

    pub fn delete(user_id: Uuid, timestamp: u64, from: usize, to: usize) -> Self {
        Self {
            user_id,
            timestamp,
            edit: TextEdit::Delete { from, to },
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self.edit, TextEdit::Insert { .. })
    }

    /// Caret offset immediately after this operation is applied.
    pub fn end_offset(&self) -> usize {
        self.edit.end_offset()
    }
}
