//! Local change detection: turn "old text" → "new text" into edits.
//!
//! The algorithm is a prefix/suffix heuristic, not a general minimal-edit
//! diff: it is exact for single-caret typing, deletion and paste, and may
//! over-report the changed span for disjoint multi-point edits. That
//! trade-off buys determinism and O(n) cost on the keystroke hot path.

use crate::op::TextEdit;

/// Compute the edit(s) that transform `old` into `new`.
///
/// Cases, in priority order:
/// 1. `new` extends `old` — a single `Insert` at the old end.
/// 2. `new` truncates `old` — a single `Delete` of the tail.
/// 3. Otherwise, strip the longest common prefix `p` and suffix `s`
///    (bounded so `p + s` never exceeds either length) and emit a
///    `Delete` of `[p, old_len - s)` followed by an `Insert` at `p`.
///    Empty components are skipped.
///
/// Offsets are character offsets into the flattened text.
pub fn diff(old: &str, new: &str) -> Vec<TextEdit> {
    if old == new {
        return Vec::new();
    }

    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    if new_chars.len() > old_chars.len() && new_chars[..old_chars.len()] == old_chars[..] {
        return vec![TextEdit::Insert {
            at: old_chars.len(),
            text: new_chars[old_chars.len()..].iter().collect(),
        }];
    }

    if old_chars.len() > new_chars.len() && old_chars[..new_chars.len()] == new_chars[..] {
        return vec![TextEdit::Delete {
            from: new_chars.len(),
            to: old_chars.len(),
        }];
    }

    let mut prefix = 0;
    while prefix < old_chars.len()
        && prefix < new_chars.len()
        && old_chars[prefix] == new_chars[prefix]
    {
        prefix += 1;
    }

    let mut suffix = 0;
    while suffix < old_chars.len() - prefix
        && suffix < new_chars.len() - prefix
        && old_chars[old_chars.len() - 1 - suffix] == new_chars[new_chars.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mut edits = Vec::with_capacity(2);
    if old_chars.len() - suffix > prefix {
        edits.push(TextEdit::Delete {
            from: prefix,
            to: old_chars.len() - suffix,
        });
    }
    if new_chars.len() - suffix > prefix {
        edits.push(TextEdit::Insert {
            at: prefix,
            text: new_chars[prefix..new_chars.len() - suffix].iter().collect(),
        });
    }
    edits
}
