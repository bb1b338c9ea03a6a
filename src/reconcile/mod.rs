//! Range reconciliation - move note ranges along with edits to their source
//!
//! `reconcile` is pure: it diffs two snapshots of a document and reports, for
//! each note range, where it ended up. `NoteStore::apply_reconciliation`
//! persists those outcomes by renaming note files (the range is part of the
//! path) while keeping uid and body.

pub mod diff;

pub use diff::{line_hunks, Hunk};

use crate::note::{Note, NoteStore};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Inclusive, 1-indexed line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub from: u32,
    pub to: u32,
}

impl LineRange {
    pub fn new(from: u32, to: u32) -> Self {
        Self { from, to }
    }
}

impl From<&Note> for LineRange {
    fn from(note: &Note) -> Self {
        Self::new(note.from_line(), note.to_line())
    }
}

/// Where a note range ended up after an edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    Unchanged,
    Shifted(LineRange),
    /// Every line of the range was deleted
    Orphaned,
}

/// What to do with a note whose whole range was deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Delete the note
    #[default]
    Remove,
    /// Keep the note at line 0 until the user deals with it
    Pin,
}

/// Map each range of `ranges` through the edit from `previous` to `current`.
///
/// Ranges that do not fit inside `previous` and pinned `[0, 0]` ranges are
/// reported unchanged.
pub fn reconcile(previous: &str, current: &str, ranges: &[LineRange]) -> Vec<RangeOutcome> {
    let old: Vec<&str> = previous.lines().collect();
    let new: Vec<&str> = current.lines().collect();
    let hunks = line_hunks(&old, &new);

    ranges
        .iter()
        .map(|range| {
            if range.from == 0 || range.from > range.to || range.to as usize > old.len() {
                return RangeOutcome::Unchanged;
            }
            shift_range(*range, &hunks)
        })
        .collect()
}

fn shift_range(range: LineRange, hunks: &[Hunk]) -> RangeOutcome {
    // 0-indexed, inclusive
    let mut f = range.from as i64 - 1;
    let mut t = range.to as i64 - 1;

    // Bottom-up, so positions above the current hunk are still in old coordinates
    for hunk in hunks.iter().rev() {
        if hunk.old_len == hunk.new_len {
            continue;
        }
        let a = hunk.old_start as i64;
        let deleted = hunk.old_len as i64;
        let inserted = hunk.new_len as i64;
        let delta = hunk.delta();

        if deleted == 0 {
            if a <= f {
                f += delta;
                t += delta;
            } else if a <= t {
                t += delta;
            }
            continue;
        }

        let del_end = a + deleted - 1;
        if del_end < f {
            f += delta;
            t += delta;
        } else if a <= t {
            if a <= f && del_end >= t {
                // Every line of the range was deleted or rewritten
                return RangeOutcome::Orphaned;
            }
            let new_f = if a <= f { a } else { f };
            let new_t = if del_end < t { t + delta } else { a - 1 + inserted };
            if new_t < new_f {
                return RangeOutcome::Orphaned;
            }
            f = new_f;
            t = new_t;
        }
    }

    let shifted = LineRange::new((f + 1) as u32, (t + 1) as u32);
    if shifted == range {
        RangeOutcome::Unchanged
    } else {
        RangeOutcome::Shifted(shifted)
    }
}

impl NoteStore {
    /// Persist reconciliation outcomes; returns the notes that still exist,
    /// with their new ranges.
    ///
    /// A storage failure leaves that note where it was.
    pub async fn apply_reconciliation(
        &self,
        notes: &[Note],
        outcomes: &[RangeOutcome],
        policy: OrphanPolicy,
    ) -> Vec<Note> {
        let mut kept = Vec::with_capacity(notes.len());

        for (note, outcome) in notes.iter().zip(outcomes) {
            match outcome {
                RangeOutcome::Unchanged => kept.push(note.clone()),
                RangeOutcome::Shifted(range) => match note.relocate(range.from, range.to).await {
                    Ok(moved) => {
                        tracing::debug!("Shifted note {} to {}-{}", note.key(), range.from, range.to);
                        kept.push(moved);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to move note {}: {}", note.key(), e);
                        kept.push(note.clone());
                    }
                },
                RangeOutcome::Orphaned => match policy {
                    OrphanPolicy::Remove => match note.remove().await {
                        Ok(_) => tracing::info!("Removed note {} whose lines were deleted", note.key()),
                        Err(e) => {
                            tracing::warn!("Failed to remove note {}: {}", note.key(), e);
                            kept.push(note.clone());
                        }
                    },
                    OrphanPolicy::Pin => match note.relocate(0, 0).await {
                        Ok(pinned) => {
                            tracing::info!("Pinned note {} to line 0", note.key());
                            kept.push(pinned);
                        }
                        Err(e) => {
                            tracing::warn!("Failed to pin note {}: {}", note.key(), e);
                            kept.push(note.clone());
                        }
                    },
                },
            }
        }

        kept.sort_by(|a, b| {
            a.from_line()
                .cmp(&b.from_line())
                .then_with(|| a.uid().cmp(b.uid()))
        });
        kept
    }

    /// Reconcile every note of `source` against an edit and persist the result.
    pub async fn reconcile_document(
        &self,
        source: &Path,
        previous: &str,
        current: &str,
        policy: OrphanPolicy,
    ) -> Result<Vec<Note>> {
        let notes = self.corresponding_notes(source).await?;
        if notes.is_empty() || previous == current {
            return Ok(notes);
        }

        let ranges: Vec<LineRange> = notes.iter().map(LineRange::from).collect();
        let outcomes = reconcile(previous, current, &ranges);
        Ok(self.apply_reconciliation(&notes, &outcomes, policy).await)
    }
}
