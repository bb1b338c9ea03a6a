//! Line diff
//!
//! Hunks come from `similar`'s Myers diff over the two line sequences.
//! Adjacent delete and insert operations are merged into one replacement.

use similar::{DiffTag, TextDiff};

/// A contiguous change: `old_len` lines starting at `old_start` were replaced
/// by `new_len` lines starting at `new_start` (0-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
}

impl Hunk {
    /// Net change in line count
    pub fn delta(&self) -> i64 {
        self.new_len as i64 - self.old_len as i64
    }

    fn old_end(&self) -> usize {
        self.old_start + self.old_len
    }

    fn new_end(&self) -> usize {
        self.new_start + self.new_len
    }
}

/// Hunks turning `old` into `new`, ordered by position.
pub fn line_hunks(old: &[&str], new: &[&str]) -> Vec<Hunk> {
    let diff = TextDiff::configure().diff_slices(old, new);
    let mut hunks: Vec<Hunk> = Vec::new();

    for op in diff.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            continue;
        }

        let hunk = Hunk {
            old_start: old_range.start,
            old_len: old_range.len(),
            new_start: new_range.start,
            new_len: new_range.len(),
        };
        match hunks.last_mut() {
            Some(last) if last.old_end() == hunk.old_start && last.new_end() == hunk.new_start => {
                last.old_len += hunk.old_len;
                last.new_len += hunk.new_len;
            }
            _ => hunks.push(hunk),
        }
    }
    hunks
}
