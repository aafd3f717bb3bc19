//! Segments produced by the N-way boundary merge.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::mention::Mention;
use super::span::Offset;

/// Relation of an open mention to the end boundary of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenKind {
    /// The mention starts at the segment's end boundary.
    Start,
    /// The mention spans across the segment's end boundary.
    Intermediate,
    /// The mention ends at the segment's end boundary.
    End,
}

impl fmt::Display for OpenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "START"),
            Self::Intermediate => write!(f, "INTERMEDIATE"),
            Self::End => write!(f, "END"),
        }
    }
}

/// One mention open in a segment.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OpenEntry<'a> {
    /// Index of the mention in the caller's list.
    pub index: usize,
    /// The mention itself.
    pub mention: &'a Mention,
    /// Relation to the segment's end boundary.
    pub kind: OpenKind,
}

/// Mentions of one list open in a segment, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct OpenSet<'a> {
    entries: Vec<OpenEntry<'a>>,
}

impl<'a> OpenSet<'a> {
    pub(crate) fn from_entries(entries: Vec<OpenEntry<'a>>) -> Self {
        Self { entries }
    }

    /// Entries in the order the mentions were opened.
    pub fn entries(&self) -> &[OpenEntry<'a>] {
        &self.entries
    }

    /// Whether no mention is open.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of open mentions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries of one kind, most recently opened first.
    pub fn latest_of_kind(&self, kind: OpenKind) -> impl Iterator<Item = &OpenEntry<'a>> {
        self.entries.iter().rev().filter(move |e| e.kind == kind)
    }
}

/// A slice `[start, end)` of the text with the mentions open in it, per list.
#[derive(Debug, Clone, Serialize)]
pub struct Segment<'a> {
    /// First character of the slice.
    pub start: Offset,
    /// One past the last character of the slice.
    pub end: Offset,
    /// One open set per input list, in input order.
    pub open: Vec<OpenSet<'a>>,
}

impl<'a> Segment<'a> {
    /// Number of characters covered.
    pub fn len(&self) -> Offset {
        self.end - self.start
    }

    /// Whether the segment covers no characters.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The innermost mention of `list` that has covered text by the segment end.
    ///
    /// Scans from the most recently opened mention backwards and returns the
    /// first one with `start < segment.end`. A mention opening exactly at the
    /// boundary is skipped because it has not covered anything yet. Starts
    /// before the text count as 0.
    pub fn principal(&self, list: usize) -> Option<&'a Mention> {
        self.principal_entry(list).map(|e| e.mention)
    }

    /// Like [`Segment::principal`], returning the whole entry.
    pub fn principal_entry(&self, list: usize) -> Option<&OpenEntry<'a>> {
        self.open
            .get(list)?
            .entries
            .iter()
            .rev()
            .find(|e| e.mention.start().max(0) < self.end)
    }

    /// Principal mention of every list.
    pub fn principals(&self) -> Vec<Option<&'a Mention>> {
        (0..self.open.len()).map(|i| self.principal(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: usize, mention: &Mention, kind: OpenKind) -> OpenEntry<'_> {
        OpenEntry { index, mention, kind }
    }

    #[test]
    fn test_principal_prefers_innermost() {
        let outer = Mention::new(0, 10, "outer");
        let inner = Mention::new(2, 8, "inner");
        let seg = Segment {
            start: 2,
            end: 8,
            open: vec![OpenSet::from_entries(vec![
                entry(0, &outer, OpenKind::Intermediate),
                entry(1, &inner, OpenKind::End),
            ])],
        };
        assert_eq!(seg.principal(0).and_then(Mention::entity), Some("inner"));
    }

    #[test]
    fn test_principal_skips_mention_opening_at_boundary() {
        let outer = Mention::new(0, 10, "outer");
        let inner = Mention::new(2, 8, "inner");
        let seg = Segment {
            start: 0,
            end: 2,
            open: vec![OpenSet::from_entries(vec![
                entry(0, &outer, OpenKind::Intermediate),
                entry(1, &inner, OpenKind::Start),
            ])],
        };
        assert_eq!(seg.principal(0).and_then(Mention::entity), Some("outer"));
    }

    #[test]
    fn test_principal_treats_negative_start_as_zero() {
        let m = Mention::new(-2, 3, "m");
        let empty = Segment {
            start: 0,
            end: 0,
            open: vec![OpenSet::from_entries(vec![entry(0, &m, OpenKind::Start)])],
        };
        assert!(empty.principal(0).is_none());

        let covered = Segment {
            start: 0,
            end: 3,
            open: vec![OpenSet::from_entries(vec![entry(0, &m, OpenKind::End)])],
        };
        assert_eq!(covered.principal(0).and_then(Mention::entity), Some("m"));
    }

    #[test]
    fn test_principal_none_for_empty_or_unknown_list() {
        let m = Mention::new(0, 3, "m");
        let seg = Segment {
            start: 0,
            end: 0,
            open: vec![OpenSet::from_entries(vec![entry(0, &m, OpenKind::Start)]), OpenSet::default()],
        };
        assert!(seg.principal(0).is_none());
        assert!(seg.principal(1).is_none());
        assert!(seg.principal(7).is_none());
    }
}
