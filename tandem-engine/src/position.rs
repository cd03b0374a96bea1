//! Mapping between flat character offsets and structural tree locations.
//!
//! A break marker consumes exactly one offset unit and is atomic: it is
//! never split, and a caret landing on it resolves to the start of the
//! following run. When no such run exists an empty one is created, so
//! every marker has an addressable successor. Offsets past the end of the
//! tree clamp to end-of-tree instead of erroring.

use crate::tree::{DocTree, Node};

/// A position inside the tree: the index of a `Run` node and a character
/// offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub node: usize,
    pub offset: usize,
}

/// Resolve a flat character offset to a structural location.
///
/// May insert an empty run (after a trailing marker, between adjacent
/// markers, or into an empty tree) so the returned location always
/// addresses a `Run`.
pub fn locate(tree: &mut DocTree, offset: usize) -> Location {
    let mut remaining = offset;
    let mut idx = 0;
    while idx < tree.nodes.len() {
        let run_len = match &tree.nodes[idx] {
            Node::Run(text) => Some(text.chars().count()),
            Node::Break => None,
        };
        match run_len {
            Some(len) => {
                if remaining <= len {
                    return Location { node: idx, offset: remaining };
                }
                remaining -= len;
            }
            None => {
                if remaining == 0 {
                    // Caret sits directly before a marker with no run to
                    // land in (start of tree, or between two markers).
                    tree.nodes.insert(idx, Node::Run(String::new()));
                    return Location { node: idx, offset: 0 };
                }
                remaining -= 1;
            }
        }
        idx += 1;
    }

    // Ran off the end: clamp to end-of-tree.
    if let Some(Node::Run(text)) = tree.nodes.last() {
        return Location {
            node: tree.nodes.len() - 1,
            offset: text.chars().count(),
        };
    }
    // Empty tree or trailing marker: give the caret a run.
    tree.nodes.push(Node::Run(String::new()));
    Location { node: tree.nodes.len() - 1, offset: 0 }
}

/// Convert a structural location back to a flat character offset.
pub fn resolve(tree: &DocTree, loc: &Location) -> usize {
    let prefix: usize = tree
        .nodes
        .iter()
        .take(loc.node)
        .map(Node::char_len)
        .sum();
    prefix + loc.offset
}
