//! Property tests for segmentation and span alignment.

use mention_compare::{canonical_hash_hex, segment, Mention, Offset, OpenKind, Span, TextAligner};
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────────────────
// Strategies
// ─────────────────────────────────────────────────────────────────────────────

fn mention_list(text_len: Offset) -> impl Strategy<Value = Vec<Mention>> {
    prop::collection::vec((0..=text_len, 0..=text_len, 0u8..4), 0..8).prop_map(|raw| {
        raw.into_iter()
            .map(|(a, b, label)| Mention::new(a.min(b), a.max(b), format!("e{label}")))
            .collect()
    })
}

fn annotated_lists() -> impl Strategy<Value = (Offset, Vec<Vec<Mention>>)> {
    (0i64..40).prop_flat_map(|len| (Just(len), prop::collection::vec(mention_list(len), 0..4)))
}

fn as_slices(lists: &[Vec<Mention>]) -> Vec<&[Mention]> {
    lists.iter().map(Vec::as_slice).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Segmentation
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn segments_tile_the_text((len, lists) in annotated_lists()) {
        let refs = as_slices(&lists);
        let segments: Vec<_> = segment(len, &refs).unwrap().collect();

        prop_assert!(!segments.is_empty());
        prop_assert_eq!(segments[0].start, 0);
        prop_assert_eq!(segments[segments.len() - 1].end, len);
        for pair in segments.windows(2) {
            prop_assert_eq!(pair[0].end, pair[1].start);
            prop_assert!(pair[0].end < pair[1].end);
        }
        for s in &segments {
            prop_assert!(s.start <= s.end);
            prop_assert_eq!(s.open.len(), refs.len());
        }
    }

    #[test]
    fn every_mention_starts_and_ends_once((len, lists) in annotated_lists()) {
        let refs = as_slices(&lists);
        let segments: Vec<_> = segment(len, &refs).unwrap().collect();

        for (list, mentions) in lists.iter().enumerate() {
            for (index, mention) in mentions.iter().enumerate() {
                if mention.start() >= mention.end() {
                    continue;
                }
                let ends_with = |kind: OpenKind| -> Vec<Offset> {
                    segments
                        .iter()
                        .filter(|s| {
                            s.open[list]
                                .entries()
                                .iter()
                                .any(|e| e.index == index && e.kind == kind)
                        })
                        .map(|s| s.end)
                        .collect()
                };
                prop_assert_eq!(ends_with(OpenKind::Start), vec![mention.start()]);
                prop_assert_eq!(ends_with(OpenKind::End), vec![mention.end()]);
            }
        }
    }

    #[test]
    fn principal_is_open_across_the_segment((len, lists) in annotated_lists()) {
        let refs = as_slices(&lists);
        for s in segment(len, &refs).unwrap() {
            for list in 0..refs.len() {
                if let Some(m) = s.principal(list) {
                    prop_assert!(m.start() < s.end);
                    prop_assert!(m.end() >= s.end);
                }
            }
        }
    }

    #[test]
    fn segmentation_is_deterministic((len, lists) in annotated_lists()) {
        let refs = as_slices(&lists);
        let first: Vec<_> = segment(len, &refs).unwrap().collect();
        let second: Vec<_> = segment(len, &refs).unwrap().collect();
        prop_assert_eq!(canonical_hash_hex(&first), canonical_hash_hex(&second));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Alignment
// ─────────────────────────────────────────────────────────────────────────────

fn text_with_insertion() -> impl Strategy<Value = (String, usize, usize)> {
    "[a-z ]{1,30}".prop_flat_map(|text| {
        let len = text.chars().count();
        (Just(text), 0..=len, 1usize..5)
    })
}

proptest! {
    #[test]
    fn insertion_round_trip_restores_spans(
        (text, at, width) in text_with_insertion(),
        raw in (0usize..30, 1usize..30),
    ) {
        let len = text.chars().count();
        let start = raw.0 % len;
        let end = (start + raw.1).min(len);
        prop_assume!(start < end);

        let edited: String = text
            .chars()
            .take(at)
            .chain(std::iter::repeat('#').take(width))
            .chain(text.chars().skip(at))
            .collect();

        let forward = TextAligner::new(&text, edited.as_str());
        let backward = TextAligner::new(&edited, text.as_str());

        let span = Span::new(start as Offset, end as Offset);
        let moved = forward.align(&span);
        prop_assert!(moved.is_valid_for(edited.chars().count() as Offset));

        let restored = backward.align(&moved);
        prop_assert_eq!((restored.start, restored.end), (span.start, span.end));
    }
}
