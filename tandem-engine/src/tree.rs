//! Structural document tree: an ordered sequence of text runs and
//! line-break markers.
//!
//! Concatenating run contents with each marker contributing exactly one
//! `\n` yields the flattened text. All character offsets elsewhere in the
//! engine are indices into that flattened text, with a marker counting as
//! one unit.

use serde::{Deserialize, Serialize};

/// A single node of the document tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// A contiguous piece of text containing no line breaks.
    Run(String),
    /// An explicit line-break marker, one offset unit wide.
    Break,
}

impl Node {
    /// Width of this node in character offsets.
    pub fn char_len(&self) -> usize {
        match self {
            Node::Run(text) => text.chars().count(),
            Node::Break => 1,
        }
    }

    pub fn is_break(&self) -> bool {
        matches!(self, Node::Break)
    }
}

/// In-memory model of a document as alternating text runs and break
/// markers. Mutated in place by every apply; no history is kept here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocTree {
    pub(crate) nodes: Vec<Node>,
}

impl DocTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Build a tree from flattened text, splitting on `\n`.
    pub fn from_text(text: &str) -> Self {
        let mut nodes = Vec::new();
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                nodes.push(Node::Break);
            }
            if !line.is_empty() {
                nodes.push(Node::Run(line.to_string()));
            }
        }
        Self { nodes }
    }

    /// Flatten the tree back into text, each marker becoming one `\n`.
    pub fn flatten(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Run(text) => out.push_str(text),
                Node::Break => out.push('\n'),
            }
        }
        out
    }

    /// Total length in character offsets (markers count as 1).
    pub fn char_len(&self) -> usize {
        self.nodes.iter().map(Node::char_len).sum()
    }

    /// The document's lines, as produced by splitting the flattened text
    /// on markers.
    pub fn lines(&self) -> Vec<String> {
        self.flatten().split('\n').map(str::to_string).collect()
    }

    /// Whether the tree holds no nodes at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop all content.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Read-only view of the node sequence.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Append a text run (builder-style, mostly for tests and fixtures).
    pub fn push_run(&mut self, text: impl Into<String>) -> &mut Self {
        self.nodes.push(Node::Run(text.into()));
        self
    }

    /// Append a break marker.
    pub fn push_break(&mut self) -> &mut Self {
        self.nodes.push(Node::Break);
        self
    }
}
