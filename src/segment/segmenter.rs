//! N-way boundary merge.
//!
//! The segmenter walks N mention lists over the same text in lock-step and
//! cuts the text at every mention boundary of any list.
//!
//! ## Algorithm
//!
//! ```text
//! per list: BoundaryStream ──► batch of events at the next position
//!                                         │
//! cut = min(batch positions, exhausted = L), clamped to [last_cut, L]
//!                                         │
//! per list: push starts at cut ─► snapshot open mentions ─► pop ends at cut
//!                                         │
//!                          emit Segment [last_cut, cut)
//! ```
//!
//! Each snapshot entry is tagged by the mention's relation to the cut:
//! `Start` if the mention opens there, `End` if it closes there, otherwise
//! `Intermediate`. Iteration stops once a cut reaches the text length, so the
//! segments always tile `[0, L)` and there is at least one of them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{char_len, Mention, Offset, OpenEntry, OpenKind, OpenSet, Segment};

use super::boundary::{BoundaryEvent, BoundaryStream, EventKind};

/// Error type for segmentation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SegmentError {
    /// A mention is bound to a text of a different length than the one being segmented.
    #[error("Mention {index} of list {list} is bound to a text of {found} characters, expected {expected}")]
    TextLengthMismatch {
        /// Input list holding the mention.
        list: usize,
        /// Index of the mention in that list.
        index: usize,
        /// Length passed to the segmenter.
        expected: Offset,
        /// Length of the mention's bound text.
        found: Offset,
    },
}

#[derive(Debug, Clone, Copy)]
struct OpenSlot<'a> {
    index: usize,
    mention: &'a Mention,
    start: Offset,
    end: Offset,
}

/// Open mentions of one list in opening order.
///
/// Removal tombstones the slot and is O(1); tombstones are compacted away
/// once they outnumber the live slots.
#[derive(Debug, Default)]
struct OpenStack<'a> {
    slots: Vec<Option<OpenSlot<'a>>>,
    positions: HashMap<usize, usize>,
    live: usize,
}

impl<'a> OpenStack<'a> {
    fn push(&mut self, slot: OpenSlot<'a>) {
        if let Some(old) = self.positions.insert(slot.index, self.slots.len()) {
            self.slots[old] = None;
            self.live -= 1;
        }
        self.slots.push(Some(slot));
        self.live += 1;
    }

    fn remove(&mut self, index: usize) {
        if let Some(at) = self.positions.remove(&index) {
            self.slots[at] = None;
            self.live -= 1;
            if self.slots.len() - self.live > self.live {
                self.compact();
            }
        }
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        self.positions.clear();
        for (at, slot) in self.slots.iter().flatten().enumerate() {
            self.positions.insert(slot.index, at);
        }
    }

    fn iter(&self) -> impl Iterator<Item = &OpenSlot<'a>> {
        self.slots.iter().flatten()
    }
}

#[derive(Debug)]
struct ListState<'a> {
    stream: BoundaryStream<'a>,
    batch: Vec<BoundaryEvent<'a>>,
    batch_pos: Offset,
    open: OpenStack<'a>,
}

impl<'a> ListState<'a> {
    fn new(mentions: &'a [Mention]) -> Self {
        let mut state = Self {
            stream: BoundaryStream::new(mentions),
            batch: Vec::new(),
            batch_pos: BoundaryStream::EXHAUSTED,
            open: OpenStack::default(),
        };
        state.refill();
        state
    }

    /// Pull every event sharing the next position.
    fn refill(&mut self) {
        self.batch.clear();
        self.batch_pos = self.stream.peek_position();
        while !self.stream.is_exhausted() && self.stream.peek_position() == self.batch_pos {
            match self.stream.next() {
                Some(event) => self.batch.push(event),
                None => break,
            }
        }
    }

    /// Apply events up to `cut`, snapshot, then close the ended mentions.
    fn step(&mut self, cut: Offset) -> OpenSet<'a> {
        let mut closing = Vec::new();
        while self.batch_pos <= cut {
            for event in self.batch.drain(..) {
                match event.kind {
                    EventKind::Start => self.open.push(OpenSlot {
                        index: event.index,
                        mention: event.mention,
                        start: event.position,
                        end: self.stream.effective_end(event.index),
                    }),
                    EventKind::End => closing.push(event.index),
                }
            }
            self.refill();
        }

        let entries = self
            .open
            .iter()
            .map(|slot| OpenEntry {
                index: slot.index,
                mention: slot.mention,
                kind: if cut == slot.start {
                    OpenKind::Start
                } else if cut == slot.end {
                    OpenKind::End
                } else {
                    OpenKind::Intermediate
                },
            })
            .collect();

        for index in closing {
            self.open.remove(index);
        }

        OpenSet::from_entries(entries)
    }
}

/// Lazy iterator of [`Segment`]s over N mention lists.
///
/// Single forward pass; not restartable. The same inputs always produce the
/// same segments.
#[derive(Debug)]
pub struct Segmenter<'a> {
    text_len: Offset,
    lists: Vec<ListState<'a>>,
    last_cut: Offset,
    done: bool,
}

impl<'a> Segmenter<'a> {
    /// Create a segmenter over a text of `text_len` characters.
    ///
    /// # Arguments
    /// * `text_len` - Length of the shared text in characters
    /// * `lists` - One mention list per annotator, in boundary order or not
    ///
    /// # Errors
    /// [`SegmentError::TextLengthMismatch`] if a mention is bound to a text of
    /// another length.
    pub fn new(text_len: Offset, lists: &[&'a [Mention]]) -> Result<Self, SegmentError> {
        check_bound_texts(text_len, lists)?;
        Ok(Self::unchecked(text_len, lists))
    }

    /// Create a segmenter without checking bound texts.
    pub(crate) fn unchecked(text_len: Offset, lists: &[&'a [Mention]]) -> Self {
        let text_len = text_len.max(0);
        for (list, mentions) in lists.iter().enumerate() {
            let beyond = mentions.iter().filter(|m| m.end() > text_len).count();
            if beyond > 0 {
                tracing::warn!(
                    list = list,
                    mentions = beyond,
                    text_len = text_len,
                    "Mentions extend past the end of the text and are cut off"
                );
            }
            let before = mentions.iter().filter(|m| m.start() < 0).count();
            if before > 0 {
                tracing::warn!(
                    list = list,
                    mentions = before,
                    "Mentions start before the text, clamping starts to 0"
                );
            }
        }

        Self {
            text_len,
            lists: lists.iter().map(|m| ListState::new(m)).collect(),
            last_cut: 0,
            done: false,
        }
    }

    /// Number of input lists.
    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    /// Length of the segmented text.
    pub fn text_len(&self) -> Offset {
        self.text_len
    }
}

impl<'a> Iterator for Segmenter<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let next_event = self
            .lists
            .iter()
            .map(|l| l.batch_pos)
            .min()
            .unwrap_or(BoundaryStream::EXHAUSTED);
        let mut cut = next_event.min(self.text_len);
        if cut < self.last_cut {
            tracing::warn!(
                position = cut,
                last_cut = self.last_cut,
                "Boundary position went backwards, clamping"
            );
            cut = self.last_cut;
        }

        let open = self.lists.iter_mut().map(|l| l.step(cut)).collect();
        let segment = Segment {
            start: self.last_cut,
            end: cut,
            open,
        };

        tracing::trace!(start = segment.start, end = segment.end, "segment");

        self.last_cut = cut;
        if cut >= self.text_len {
            self.done = true;
        }
        Some(segment)
    }
}

/// Segment N mention lists over a text of `text_len` characters.
///
/// Convenience wrapper around [`Segmenter::new`].
pub fn segment<'a>(text_len: Offset, lists: &[&'a [Mention]]) -> Result<Segmenter<'a>, SegmentError> {
    Segmenter::new(text_len, lists)
}

fn check_bound_texts(text_len: Offset, lists: &[&[Mention]]) -> Result<(), SegmentError> {
    let mut seen: Vec<(&Arc<str>, Offset)> = Vec::new();
    for (list, mentions) in lists.iter().enumerate() {
        for (index, mention) in mentions.iter().enumerate() {
            let Some(text) = mention.span.text() else {
                continue;
            };
            let found = match seen.iter().find(|(t, _)| Arc::ptr_eq(t, text)) {
                Some((_, len)) => *len,
                None => {
                    let len = char_len(text);
                    seen.push((text, len));
                    len
                }
            };
            if found != text_len {
                return Err(SegmentError::TextLengthMismatch {
                    list,
                    index,
                    expected: text_len,
                    found,
                });
            }
        }
    }
    Ok(())
}
