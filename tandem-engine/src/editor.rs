//! Editing surface adapter: bridges user input to the tree and the
//! change detector.
//!
//! The surface owns the tree, the local caret, and the previous flattened
//! snapshot. Local input mutates the tree and then diffs against the
//! snapshot to produce the edits to broadcast. Remote edits enter through
//! [`EditorSurface::apply_remote`], which advances the snapshot without
//! emitting anything: echo suppression is a property of the call path,
//! not a mutable flag.

use crate::apply;
use crate::diff;
use crate::op::{Origin, TextEdit};
use crate::tree::DocTree;

/// A user input event on the editing surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A typed character (including space).
    Char(char),
    /// The Enter key: inserts a break marker.
    Enter,
    /// Delete backward from the caret.
    Backspace,
    /// Delete forward from the caret.
    Delete,
    /// Clipboard paste, possibly multi-line.
    Paste(String),
    ArrowLeft,
    ArrowRight,
}

/// The local editing surface for one document.
#[derive(Debug, Clone)]
pub struct EditorSurface {
    tree: DocTree,
    /// Flattened text as of the last commit; the diff baseline.
    snapshot: String,
    /// Local caret, in flattened character offsets.
    caret: usize,
    /// Local selection range `[from, to)`, if any.
    selection: Option<(usize, usize)>,
}

impl Default for EditorSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorSurface {
    pub fn new() -> Self {
        Self {
            tree: DocTree::new(),
            snapshot: String::new(),
            caret: 0,
            selection: None,
        }
    }

    /// Create a surface over existing document text.
    pub fn with_text(text: &str) -> Self {
        Self {
            tree: DocTree::from_text(text),
            snapshot: text.to_string(),
            caret: 0,
            selection: None,
        }
    }

    pub fn tree(&self) -> &DocTree {
        &self.tree
    }

    /// Current flattened text.
    pub fn text(&self) -> String {
        self.tree.flatten()
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    /// Move the caret, clamped to the document length.
    pub fn set_caret(&mut self, offset: usize) {
        self.caret = offset.min(self.tree.char_len());
        self.selection = None;
    }

    pub fn selection(&self) -> Option<(usize, usize)> {
        self.selection
    }

    /// Select `[from, to)`; the caret moves to the selection end.
    pub fn select(&mut self, from: usize, to: usize) {
        let len = self.tree.char_len();
        let (from, to) = (from.min(len), to.min(len));
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        self.selection = (from < to).then_some((from, to));
        self.caret = to;
    }

    /// Handle a local input event, returning the edits to broadcast.
    pub fn handle_input(&mut self, event: InputEvent) -> Vec<TextEdit> {
        match event {
            InputEvent::Char(c) => {
                let mut buf = [0u8; 4];
                self.insert_text(c.encode_utf8(&mut buf))
            }
            InputEvent::Enter => self.insert_text("\n"),
            InputEvent::Paste(text) => self.insert_text(&text),
            InputEvent::Backspace => {
                let (from, to) = match self.selection.take() {
                    Some(range) => range,
                    None if self.caret > 0 => (self.caret - 1, self.caret),
                    None => return Vec::new(),
                };
                self.delete_range(from, to)
            }
            InputEvent::Delete => {
                let (from, to) = match self.selection.take() {
                    Some(range) => range,
                    None if self.caret < self.tree.char_len() => (self.caret, self.caret + 1),
                    None => return Vec::new(),
                };
                self.delete_range(from, to)
            }
            InputEvent::ArrowLeft => {
                self.set_caret(self.caret.saturating_sub(1));
                Vec::new()
            }
            InputEvent::ArrowRight => {
                self.set_caret(self.caret + 1);
                Vec::new()
            }
        }
    }

    /// Apply an edit authored remotely. Never emits: the snapshot is
    /// advanced under `Origin::Remote`, so the next local diff sees the
    /// remote mutation as already-committed baseline.
    pub fn apply_remote(&mut self, edit: &TextEdit) {
        apply::apply_edit(&mut self.tree, edit);
        self.shift_caret(edit);
        self.commit(Origin::Remote);
    }

    fn insert_text(&mut self, text: &str) -> Vec<TextEdit> {
        if let Some((from, to)) = self.selection.take() {
            apply::apply_delete(&mut self.tree, from, to);
            self.caret = from;
        }
        apply::apply_insert(&mut self.tree, self.caret, text);
        self.caret += text.chars().count();
        self.commit(Origin::Local)
    }

    fn delete_range(&mut self, from: usize, to: usize) -> Vec<TextEdit> {
        apply::apply_delete(&mut self.tree, from, to);
        self.caret = from;
        self.commit(Origin::Local)
    }

    /// Diff the snapshot against the current tree and advance it. Only
    /// local commits produce edits; remote commits just move the
    /// baseline forward.
    fn commit(&mut self, origin: Origin) -> Vec<TextEdit> {
        let current = self.tree.flatten();
        let edits = match origin {
            Origin::Local => diff::diff(&self.snapshot, &current),
            Origin::Remote => Vec::new(),
        };
        self.snapshot = current;
        edits
    }

    /// Keep the local caret stable across a remote mutation.
    fn shift_caret(&mut self, edit: &TextEdit) {
        match edit {
            TextEdit::Insert { at, text } if *at <= self.caret => {
                self.caret += text.chars().count();
            }
            TextEdit::Delete { from, to } if self.caret > *from => {
                let removed = self.caret.min(*to) - from;
                self.caret -= removed;
            }
            _ => {}
        }
        self.caret = self.caret.min(self.tree.char_len());
    }
}
