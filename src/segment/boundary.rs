//! Start/end boundary events of one mention list.
//!
//! ## Ordering
//!
//! Starts are taken from the list in boundary order (start ascending, end
//! descending). Each emitted start schedules its end in a min-heap keyed by
//! `(end, boundary rank)`. The next event is whichever of the two sources has
//! the smaller position; starts win ties, so at one position the starts of
//! outer mentions come before those of inner mentions, and a zero-length
//! mention's end follows its own start.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::types::{Mention, Offset};

/// Whether an event opens or closes a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The mention opens at `position`.
    Start,
    /// The mention closes at `position`.
    End,
}

/// One boundary of one mention.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BoundaryEvent<'a> {
    /// Offset of the boundary.
    pub position: Offset,
    /// Start or end.
    pub kind: EventKind,
    /// Index of the mention in the caller's list.
    pub index: usize,
    /// The mention.
    pub mention: &'a Mention,
}

/// Scheduled end event; ordered so that `BinaryHeap` pops the smallest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingEnd {
    position: Offset,
    rank: usize,
    index: usize,
}

impl PartialOrd for PendingEnd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEnd {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: smaller position first, then earlier boundary rank.
        other
            .position
            .cmp(&self.position)
            .then_with(|| other.rank.cmp(&self.rank))
    }
}

/// Lazy, single-pass stream of boundary events over one mention list.
///
/// Positions never decrease. Once exhausted the stream reports
/// [`BoundaryStream::EXHAUSTED`] as its next position.
#[derive(Debug, Clone)]
pub struct BoundaryStream<'a> {
    mentions: &'a [Mention],
    /// Caller indices in boundary order.
    order: Vec<usize>,
    /// Effective start per caller index (negative starts clamped to 0).
    starts: Vec<Offset>,
    /// Effective end per caller index (malformed ends clamped to the start).
    ends: Vec<Offset>,
    next_start: usize,
    pending_ends: BinaryHeap<PendingEnd>,
}

impl<'a> BoundaryStream<'a> {
    /// Position reported once every event has been consumed.
    pub const EXHAUSTED: Offset = Offset::MAX;

    /// Build the stream. The list need not be pre-sorted.
    ///
    /// Boundary order is taken over the effective ranges, so a mention that
    /// starts before the text is ordered as if it started at 0.
    pub fn new(mentions: &'a [Mention]) -> Self {
        let starts: Vec<Offset> = mentions.iter().map(|m| m.start().max(0)).collect();
        let ends: Vec<Offset> = mentions
            .iter()
            .enumerate()
            .map(|(index, m)| {
                if m.end() < starts[index] {
                    tracing::warn!(
                        index = index,
                        start = m.start(),
                        end = m.end(),
                        entity = ?m.entity(),
                        "Mention ends before it starts, clamping end to start"
                    );
                    starts[index]
                } else {
                    m.end()
                }
            })
            .collect();

        let mut order: Vec<usize> = (0..mentions.len()).collect();
        order.sort_by(|&a, &b| starts[a].cmp(&starts[b]).then_with(|| ends[b].cmp(&ends[a])));

        Self {
            mentions,
            order,
            starts,
            ends,
            next_start: 0,
            pending_ends: BinaryHeap::new(),
        }
    }

    /// Position of the next event without consuming it.
    pub fn peek_position(&self) -> Offset {
        let start = self
            .order
            .get(self.next_start)
            .map(|&i| self.starts[i])
            .unwrap_or(Self::EXHAUSTED);
        let end = self
            .pending_ends
            .peek()
            .map(|e| e.position)
            .unwrap_or(Self::EXHAUSTED);
        start.min(end)
    }

    /// Whether every event has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.next_start >= self.order.len() && self.pending_ends.is_empty()
    }

    /// Effective start of the mention at caller index `index`.
    pub fn effective_start(&self, index: usize) -> Offset {
        self.starts[index]
    }

    /// Effective end of the mention at caller index `index`.
    pub fn effective_end(&self, index: usize) -> Offset {
        self.ends[index]
    }

    /// The underlying list.
    pub fn mentions(&self) -> &'a [Mention] {
        self.mentions
    }
}

impl<'a> Iterator for BoundaryStream<'a> {
    type Item = BoundaryEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start_pos = self
            .order
            .get(self.next_start)
            .map(|&i| self.starts[i]);
        let end_pos = self.pending_ends.peek().map(|e| e.position);

        let take_start = match (start_pos, end_pos) {
            (Some(s), Some(e)) => s <= e,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };

        if take_start {
            let rank = self.next_start;
            let index = self.order[rank];
            self.next_start += 1;
            self.pending_ends.push(PendingEnd {
                position: self.ends[index],
                rank,
                index,
            });
            Some(BoundaryEvent {
                position: self.starts[index],
                kind: EventKind::Start,
                index,
                mention: &self.mentions[index],
            })
        } else {
            let end = self.pending_ends.pop()?;
            Some(BoundaryEvent {
                position: end.position,
                kind: EventKind::End,
                index: end.index,
                mention: &self.mentions[end.index],
            })
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = 2 * (self.order.len() - self.next_start) + self.pending_ends.len();
        (remaining, Some(remaining))
    }
}
