//! Applying edits to the structural tree.
//!
//! Inserts and deletes arrive in flattened character coordinates and are
//! resolved to tree locations through the position mapper. Malformed
//! offsets clamp (to end-of-tree or range end) rather than failing the
//! apply: the worst case for a bad offset is a misplaced edit, which
//! self-heals on the next sync.

use crate::op::TextEdit;
use crate::position;
use crate::tree::{DocTree, Node};

/// Apply a single edit to the tree.
pub fn apply_edit(tree: &mut DocTree, edit: &TextEdit) {
    match edit {
        TextEdit::Insert { at, text } => apply_insert(tree, *at, text),
        TextEdit::Delete { from, to } => apply_delete(tree, *from, *to),
    }
}

/// Insert `text` at character offset `at`.
///
/// Text containing `\n` is split into alternating runs (possibly empty)
/// and break markers, spliced into the node sequence at the located
/// position. Plain text splices directly into the target run.
pub fn apply_insert(tree: &mut DocTree, at: usize, text: &str) {
    if text.is_empty() {
        return;
    }

    if tree.is_empty() {
        // First content: build the node sequence directly.
        for (i, piece) in text.split('\n').enumerate() {
            if i > 0 {
                tree.nodes.push(Node::Break);
            }
            if !piece.is_empty() {
                tree.nodes.push(Node::Run(piece.to_string()));
            }
        }
        return;
    }

    let loc = position::locate(tree, at);

    if !text.contains('\n') {
        if let Node::Run(run) = &mut tree.nodes[loc.node] {
            let byte = byte_index(run, loc.offset);
            run.insert_str(byte, text);
        }
        return;
    }

    // Multi-line insert: split the target run around the caret, then
    // weave the pieces with break markers between them.
    let (head, tail) = match &tree.nodes[loc.node] {
        Node::Run(run) => {
            let byte = byte_index(run, loc.offset);
            (run[..byte].to_string(), run[byte..].to_string())
        }
        // locate() only returns runs; defensive arm kept unreachable.
        Node::Break => (String::new(), String::new()),
    };

    let pieces: Vec<&str> = text.split('\n').collect();
    let mut replacement: Vec<Node> = Vec::with_capacity(pieces.len() * 2);
    let mut first = head;
    first.push_str(pieces[0]);
    replacement.push(Node::Run(first));
    for piece in &pieces[1..] {
        replacement.push(Node::Break);
        replacement.push(Node::Run(piece.to_string()));
    }
    if let Some(Node::Run(last)) = replacement.last_mut() {
        last.push_str(&tail);
    }
    tree.nodes.splice(loc.node..=loc.node, replacement);
}

/// Delete the character range `[from, to)`.
///
/// A range inside one run removes the substring. A range spanning nodes
/// truncates the boundary runs, clears fully covered runs to empty, and
/// removes markers wholly inside the range. Deleting the full document
/// range clears the tree outright.
pub fn apply_delete(tree: &mut DocTree, from: usize, to: usize) {
    let total = tree.char_len();
    if to > total {
        log::debug!("delete range end {to} clamped to document length {total}");
    }
    let to = to.min(total);
    if from >= to {
        return;
    }

    if from == 0 && to == total {
        tree.clear();
        return;
    }

    let start = position::locate(tree, from);
    let end = position::locate(tree, to);

    if start.node == end.node {
        if let Node::Run(run) = &mut tree.nodes[start.node] {
            let lo = byte_index(run, start.offset);
            let hi = byte_index(run, end.offset);
            run.replace_range(lo..hi, "");
        }
        return;
    }

    // Boundary runs first, while node indices are still stable.
    if let Node::Run(run) = &mut tree.nodes[start.node] {
        let lo = byte_index(run, start.offset);
        run.truncate(lo);
    }
    if let Node::Run(run) = &mut tree.nodes[end.node] {
        let hi = byte_index(run, end.offset);
        run.replace_range(..hi, "");
    }

    // Covered interior: runs become empty, markers disappear.
    let mut idx = start.node + 1;
    let mut end_node = end.node;
    while idx < end_node {
        if tree.nodes[idx].is_break() {
            tree.nodes.remove(idx);
            end_node -= 1;
        } else {
            if let Node::Run(run) = &mut tree.nodes[idx] {
                run.clear();
            }
            idx += 1;
        }
    }
}

/// Byte index of a character offset within a run, clamped to its end.
fn byte_index(s: &str, char_offset: usize) -> usize {
    s.char_indices()
        .nth(char_offset)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(nodes: &[Node]) -> DocTree {
        let mut tree = DocTree::new();
        for node in nodes {
            tree.nodes.push(node.clone());
        }
        tree
    }

    #[test]
    fn test_insert_plain_into_run() {
        let mut tree = DocTree::from_text("Hello world");
        apply_insert(&mut tree, 5, ",");
        assert_eq!(tree.flatten(), "Hello, world");
    }

    #[test]
    fn test_insert_into_empty_tree() {
        let mut tree = DocTree::new();
        apply_insert(&mut tree, 0, "hi");
        assert_eq!(tree.nodes(), &[Node::Run("hi".into())]);
    }

    #[test]
    fn test_insert_multiline_into_empty_tree() {
        let mut tree = DocTree::new();
        apply_insert(&mut tree, 0, "a\nb");
        assert_eq!(
            tree.nodes(),
            &[Node::Run("a".into()), Node::Break, Node::Run("b".into())]
        );
    }

    #[test]
    fn test_insert_lone_break_into_empty_tree() {
        let mut tree = DocTree::new();
        apply_insert(&mut tree, 0, "\n");
        assert_eq!(tree.nodes(), &[Node::Break]);
    }

    #[test]
    fn test_insert_break_and_text_at_run_end() {
        let mut tree = DocTree::from_text("abc");
        apply_insert(&mut tree, 3, "\nX");
        assert_eq!(
            tree.nodes(),
            &[Node::Run("abc".into()), Node::Break, Node::Run("X".into())]
        );
    }

    #[test]
    fn test_insert_multiline_mid_run_keeps_tail() {
        let mut tree = DocTree::from_text("abcd");
        apply_insert(&mut tree, 2, "1\n2");
        assert_eq!(tree.flatten(), "ab1\n2cd");
        assert_eq!(
            tree.nodes(),
            &[Node::Run("ab1".into()), Node::Break, Node::Run("2cd".into())]
        );
    }

    #[test]
    fn test_insert_after_marker_lands_in_next_run() {
        let mut tree = DocTree::from_text("ab\ncd");
        apply_insert(&mut tree, 3, "X");
        assert_eq!(tree.flatten(), "ab\nXcd");
    }

    #[test]
    fn test_insert_clamps_past_end() {
        let mut tree = DocTree::from_text("ab");
        apply_insert(&mut tree, 99, "c");
        assert_eq!(tree.flatten(), "abc");
    }

    #[test]
    fn test_insert_same_offset_is_deterministic() {
        let mut a = DocTree::from_text("ab\ncd");
        let mut b = DocTree::from_text("ab\ncd");
        apply_insert(&mut a, 4, "zz");
        apply_insert(&mut b, 4, "zz");
        assert_eq!(a, b);
        assert_eq!(a.flatten(), "ab\nczzd");
    }

    #[test]
    fn test_delete_within_run() {
        let mut tree = DocTree::from_text("Hello, world");
        apply_delete(&mut tree, 5, 6);
        assert_eq!(tree.flatten(), "Hello world");
    }

    #[test]
    fn test_delete_full_range_clears_tree() {
        let mut tree = tree_of(&[
            Node::Run("abc".into()),
            Node::Break,
            Node::Run("def".into()),
        ]);
        let len = tree.char_len();
        apply_delete(&mut tree, 0, len);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_delete_across_marker_removes_it() {
        let mut tree = DocTree::from_text("abc\ndef");
        // Delete just the newline: offsets [3, 4).
        apply_delete(&mut tree, 3, 4);
        assert_eq!(tree.flatten(), "abcdef");
        assert!(!tree.nodes().iter().any(Node::is_break));
    }

    #[test]
    fn test_delete_spanning_nodes_clears_covered_runs() {
        let mut tree = DocTree::from_text("abc\ndef\ngh");
        apply_delete(&mut tree, 1, 9);
        assert_eq!(tree.flatten(), "ah");
        // The covered run is cleared to empty, markers are gone.
        assert_eq!(
            tree.nodes(),
            &[
                Node::Run("a".into()),
                Node::Run(String::new()),
                Node::Run("h".into()),
            ]
        );
    }

    #[test]
    fn test_delete_clamps_out_of_range_end() {
        let mut tree = DocTree::from_text("abc");
        apply_delete(&mut tree, 1, 99);
        assert_eq!(tree.flatten(), "a");
    }

    #[test]
    fn test_delete_empty_range_is_noop() {
        let mut tree = DocTree::from_text("abc");
        apply_delete(&mut tree, 2, 2);
        apply_delete(&mut tree, 3, 1);
        assert_eq!(tree.flatten(), "abc");
    }

    #[test]
    fn test_delete_multibyte_within_run() {
        let mut tree = DocTree::from_text("héllo");
        apply_delete(&mut tree, 1, 2);
        assert_eq!(tree.flatten(), "hllo");
    }

    #[test]
    fn test_apply_edit_dispatch() {
        let mut tree = DocTree::from_text("abc");
        apply_edit(&mut tree, &TextEdit::Insert { at: 3, text: "d".into() });
        apply_edit(&mut tree, &TextEdit::Delete { from: 0, to: 1 });
        assert_eq!(tree.flatten(), "bcd");
    }
}
