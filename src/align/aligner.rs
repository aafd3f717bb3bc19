//! Span re-alignment between two versions of a text.
//!
//! ## Shift Table
//!
//! The diff is walked left to right with a source position `pos` and the
//! accumulated length difference `shift`:
//!
//! ```text
//! Delete(k)  shift -= k, pos += k
//! Equal(k)   pos += k
//! Insert(k)  shift += k
//! ```
//!
//! After every run `pos -> shift` is recorded, later records at the same
//! position replacing earlier ones. A span is moved by the shift in effect at
//! its first character and at its last character:
//!
//! ```text
//! start' = start + shift_at(start)
//! end'   = end   + shift_at(end - 1)
//! ```
//!
//! Alignment is total. A span whose characters were deleted may come out
//! with a negative or inverted range; callers decide what to keep.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::canonical::canonical_hash_hex;
use crate::types::{Mention, Offset, Span};

use super::diff::{diff_chars, DiffRun};

/// Default bound on the number of edits the diff searches for.
pub const DEFAULT_MAX_EDIT_DISTANCE: usize = 1024;

/// Largest bound [`AlignerConfig::clamped`] lets through.
///
/// The diff trace grows with the square of the bound; at this limit it stays
/// in the tens of megabytes.
pub const MAX_EDIT_DISTANCE_LIMIT: usize = 2 * DEFAULT_MAX_EDIT_DISTANCE;

/// Tuning for [`TextAligner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignerConfig {
    /// Edit distance beyond which the changed middle is replaced wholesale.
    pub max_edit_distance: usize,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            max_edit_distance: DEFAULT_MAX_EDIT_DISTANCE,
        }
    }
}

impl AlignerConfig {
    /// Copy with `max_edit_distance` capped at [`MAX_EDIT_DISTANCE_LIMIT`].
    ///
    /// For configs that arrive from untrusted callers.
    pub fn clamped(&self) -> Self {
        if self.max_edit_distance > MAX_EDIT_DISTANCE_LIMIT {
            tracing::warn!(
                requested = self.max_edit_distance,
                limit = MAX_EDIT_DISTANCE_LIMIT,
                "Edit distance bound above limit, capping"
            );
        }
        Self {
            max_edit_distance: self.max_edit_distance.min(MAX_EDIT_DISTANCE_LIMIT),
        }
    }

    /// Stable hash of the configuration.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(self)
    }
}

/// Values that can be moved from the source text onto the destination text.
pub trait Realign: Sized {
    /// Produce the re-aligned copy. Never mutates `self`.
    fn realign(&self, aligner: &TextAligner) -> Self;
}

impl Realign for Span {
    fn realign(&self, aligner: &TextAligner) -> Self {
        let start = self.start + aligner.shift_at(self.start);
        let end = self.end + aligner.shift_at(self.end - 1);
        self.with_range(start, end).with_text(Arc::clone(&aligner.dest))
    }
}

impl Realign for Mention {
    fn realign(&self, aligner: &TextAligner) -> Self {
        Mention {
            span: self.span.realign(aligner),
            entity: self.entity.clone(),
            essential: self.essential.as_ref().map(|e| e.realign(aligner)),
        }
    }
}

/// Maps offsets in a source text onto a destination text.
#[derive(Debug, Clone)]
pub struct TextAligner {
    shifts: BTreeMap<Offset, Offset>,
    dest: Arc<str>,
    exact: bool,
}

impl TextAligner {
    /// Build an aligner with the default configuration.
    pub fn new(source: &str, dest: impl Into<Arc<str>>) -> Self {
        Self::with_config(source, dest, &AlignerConfig::default())
    }

    /// Build an aligner.
    ///
    /// # Arguments
    /// * `source` - Text the spans currently point into
    /// * `dest` - Text the spans should point into afterwards
    /// * `config` - Diff tuning
    pub fn with_config(source: &str, dest: impl Into<Arc<str>>, config: &AlignerConfig) -> Self {
        let dest: Arc<str> = dest.into();
        let a: Vec<char> = source.chars().collect();
        let b: Vec<char> = dest.chars().collect();

        let diff = diff_chars(&a, &b, config.max_edit_distance);
        if !diff.exact {
            tracing::warn!(
                source_len = a.len(),
                dest_len = b.len(),
                max_edit_distance = config.max_edit_distance,
                "Edit distance bound exceeded, aligning changed region wholesale"
            );
        }

        let shifts = build_shift_table(&diff.runs);
        tracing::debug!(
            runs = diff.runs.len(),
            entries = shifts.len(),
            "Built shift table"
        );

        Self {
            shifts,
            dest,
            exact: diff.exact,
        }
    }

    /// Shift in effect at `pos`: the entry with the greatest position `<= pos`, else 0.
    pub fn shift_at(&self, pos: Offset) -> Offset {
        self.shifts
            .range(..=pos)
            .next_back()
            .map(|(_, shift)| *shift)
            .unwrap_or(0)
    }

    /// Re-align one span or mention.
    pub fn align<T: Realign>(&self, item: &T) -> T {
        item.realign(self)
    }

    /// Re-align a list element-wise, keeping order.
    pub fn align_all<T: Realign>(&self, items: &[T]) -> Vec<T> {
        items.iter().map(|item| item.realign(self)).collect()
    }

    /// The destination text.
    pub fn dest(&self) -> &Arc<str> {
        &self.dest
    }

    /// The recorded `(position, shift)` entries.
    pub fn shift_table(&self) -> impl Iterator<Item = (Offset, Offset)> + '_ {
        self.shifts.iter().map(|(p, s)| (*p, *s))
    }

    /// False when the diff hit its edit bound.
    pub fn is_exact(&self) -> bool {
        self.exact
    }
}

fn build_shift_table(runs: &[DiffRun]) -> BTreeMap<Offset, Offset> {
    let mut table = BTreeMap::new();
    let mut pos: Offset = 0;
    let mut shift: Offset = 0;

    for run in runs {
        match *run {
            DiffRun::Delete(k) => {
                shift -= k as Offset;
                pos += k as Offset;
            }
            DiffRun::Equal(k) => pos += k as Offset,
            DiffRun::Insert(k) => shift += k as Offset,
        }
        table.insert(pos, shift);
    }

    // A leading deletion must also move spans that start at 0.
    if let Some((&first_pos, &first_shift)) = table.range(0..).next() {
        if first_shift < 0 && first_pos != 0 {
            table.insert(0, first_shift);
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_realignment() {
        let aligner = TextAligner::new("\n abc def ghi", "abc  def  ghi");

        let abc = aligner.align(&Span::new(2, 5));
        assert_eq!((abc.start, abc.end), (0, 3));
        assert_eq!(abc.covered_text().as_deref(), Some("abc"));

        let def = aligner.align(&Span::new(6, 9));
        assert_eq!((def.start, def.end), (5, 8));
        assert_eq!(def.covered_text().as_deref(), Some("def"));
    }

    #[test]
    fn test_identical_texts_do_not_move() {
        let aligner = TextAligner::new("same", "same");
        let span = aligner.align(&Span::new(1, 3));
        assert_eq!((span.start, span.end), (1, 3));
        assert_eq!(aligner.shift_at(-5), 0);
    }

    #[test]
    fn test_inserted_prefix_shifts_right() {
        let aligner = TextAligner::new("Paris is big", ">> Paris is big");
        let m = aligner.align(&Mention::new(0, 5, "Paris"));
        assert_eq!((m.start(), m.end()), (3, 8));
        assert_eq!(m.entity(), Some("Paris"));
        assert_eq!(m.span.covered_text().as_deref(), Some("Paris"));
    }

    #[test]
    fn test_deleted_span_is_returned_not_dropped() {
        let aligner = TextAligner::new("xxxx tail", "tail");
        let gone = aligner.align(&Span::new(0, 4));
        assert!(!gone.is_valid());
    }

    #[test]
    fn test_essential_span_moves_with_mention() {
        let aligner = TextAligner::new("the old man", "  the old man");
        let m = aligner.align(&Mention::new(0, 11, "E").with_essential(8, 11));
        let essential = m.essential.unwrap();
        assert_eq!((essential.start, essential.end), (10, 13));
    }

    #[test]
    fn test_align_all_keeps_order_and_input() {
        let aligner = TextAligner::new("ab cd", "ab  cd");
        let input = vec![Span::new(3, 5), Span::new(0, 2)];
        let out = aligner.align_all(&input);
        assert_eq!((out[0].start, out[0].end), (4, 6));
        assert_eq!((out[1].start, out[1].end), (0, 2));
        assert_eq!((input[0].start, input[0].end), (3, 5));
        assert!(aligner.align_all::<Span>(&[]).is_empty());
    }

    #[test]
    fn test_clamped_caps_edit_bound() {
        let huge = AlignerConfig { max_edit_distance: usize::MAX };
        assert_eq!(huge.clamped().max_edit_distance, MAX_EDIT_DISTANCE_LIMIT);

        let small = AlignerConfig { max_edit_distance: 8 };
        assert_eq!(small.clamped(), small);
        assert_eq!(AlignerConfig::default().clamped(), AlignerConfig::default());
    }

    #[test]
    fn test_config_hash_is_stable() {
        assert_eq!(AlignerConfig::default().params_hash(), AlignerConfig::default().params_hash());
        let tight = AlignerConfig { max_edit_distance: 8 };
        assert_ne!(tight.params_hash(), AlignerConfig::default().params_hash());
    }
}
