//! Label alignment between two annotations of the same text.
//!
//! Two systems rarely agree on entity identifiers. The aligner segments both
//! mention lists together and counts, per segment, which pair of principal
//! labels co-occur. The counts drive the mapping.
//!
//! ## Greedy Alignment
//!
//! ```text
//! count[a][b] ──► buckets by count ──► highest bucket first
//!                                      first claim on `a` wins
//! ```
//!
//! Pairs inside one bucket are visited in first co-occurrence order. The
//! result is a locally maximal mapping, not an optimal bipartite matching.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::canonical::canonical_hash_hex;
use crate::segment::Segmenter;
use crate::types::{Mention, Offset};

/// Number of candidate maps above which enumeration is logged as expensive.
pub const CANDIDATE_WARN_THRESHOLD: u128 = 1000;

/// Partial mapping from source labels to target labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlignmentMap(BTreeMap<String, String>);

impl AlignmentMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target of `source`, if mapped.
    pub fn get(&self, source: &str) -> Option<&str> {
        self.0.get(source).map(String::as_str)
    }

    /// Target of `source`, or `fallback` when unmapped.
    pub fn get_or<'s>(&'s self, source: &str, fallback: &'s str) -> &'s str {
        self.get(source).unwrap_or(fallback)
    }

    /// Map `source` to `target`, returning the previous target.
    pub fn insert(&mut self, source: impl Into<String>, target: impl Into<String>) -> Option<String> {
        self.0.insert(source.into(), target.into())
    }

    /// Whether `source` has a mapping.
    pub fn contains(&self, source: &str) -> bool {
        self.0.contains_key(source)
    }

    /// Mappings in source label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(s, t)| (s.as_str(), t.as_str()))
    }

    /// Number of mapped labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Structural hash of the mapping.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(self)
    }
}

impl<S: Into<String>, T: Into<String>> FromIterator<(S, T)> for AlignmentMap {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(s, t)| (s.into(), t.into())).collect())
    }
}

/// How often two labels were principal in the same segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoOccurrence {
    /// Label in the source list.
    pub source: String,
    /// Label in the target list.
    pub target: String,
    /// Number of segments where both were principal.
    pub count: usize,
}

/// Strategy for [`ChainAligner::align`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignStrategy {
    /// Highest co-occurrence count wins.
    #[default]
    Greedy,
    /// The last co-occurring target wins.
    LastOverlap,
}

/// Computes label mappings between two mention lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainAligner {
    text_len: Option<Offset>,
}

impl ChainAligner {
    /// Aligner that segments up to the furthest mention end.
    pub fn new() -> Self {
        Self::default()
    }

    /// Aligner that segments a text of `text_len` characters.
    pub fn with_text_len(text_len: Offset) -> Self {
        Self {
            text_len: Some(text_len),
        }
    }

    /// Align with the chosen strategy.
    pub fn align(&self, source: &[Mention], target: &[Mention], strategy: AlignStrategy) -> AlignmentMap {
        match strategy {
            AlignStrategy::Greedy => self.greedy_align(source, target),
            AlignStrategy::LastOverlap => self.last_overlap_align(source, target),
        }
    }

    /// Greedy mapping by co-occurrence count.
    ///
    /// Labels of `source` that never share a segment with a labelled
    /// principal of `target` stay unmapped.
    pub fn greedy_align(&self, source: &[Mention], target: &[Mention]) -> AlignmentMap {
        let table = self.co_occurrences(source, target);

        let mut buckets: BTreeMap<usize, Vec<&CoOccurrence>> = BTreeMap::new();
        for pair in &table {
            buckets.entry(pair.count).or_default().push(pair);
        }

        let mut result = AlignmentMap::new();
        for pairs in buckets.values().rev() {
            for pair in pairs {
                if !result.contains(&pair.source) {
                    result.insert(pair.source.clone(), pair.target.clone());
                }
            }
        }

        tracing::debug!(
            pairs = table.len(),
            mapped = result.len(),
            "Greedy chain alignment"
        );
        result
    }

    /// Map each source label to the target label of its last shared segment.
    pub fn last_overlap_align(&self, source: &[Mention], target: &[Mention]) -> AlignmentMap {
        let mut result = AlignmentMap::new();
        self.for_each_principal_pair(source, target, |s, t| {
            result.insert(s, t);
        });
        result
    }

    /// Co-occurrence counts in first-seen order.
    pub fn co_occurrences(&self, source: &[Mention], target: &[Mention]) -> Vec<CoOccurrence> {
        let mut table: Vec<CoOccurrence> = Vec::new();
        let mut slots: HashMap<(String, String), usize> = HashMap::new();

        self.for_each_principal_pair(source, target, |s, t| {
            let key = (s.to_string(), t.to_string());
            match slots.get(&key) {
                Some(&at) => table[at].count += 1,
                None => {
                    slots.insert(key, table.len());
                    table.push(CoOccurrence {
                        source: s.to_string(),
                        target: t.to_string(),
                        count: 1,
                    });
                }
            }
        });

        table
    }

    /// Every combination of plausible source-to-target assignments.
    ///
    /// Each source label may map to any target it co-occurred with. With
    /// `prune`, targets counted less than `floor(sqrt(max))` times for that
    /// source are discarded first. The enumeration is lazy.
    pub fn candidate_maps(&self, source: &[Mention], target: &[Mention], prune: bool) -> CandidateMaps {
        let table = self.co_occurrences(source, target);

        let mut sources: Vec<String> = Vec::new();
        let mut options: Vec<Vec<(String, usize)>> = Vec::new();
        let mut slot_of: HashMap<String, usize> = HashMap::new();
        for pair in table {
            let slot = *slot_of.entry(pair.source.clone()).or_insert_with(|| {
                sources.push(pair.source.clone());
                options.push(Vec::new());
                sources.len() - 1
            });
            options[slot].push((pair.target, pair.count));
        }

        let options: Vec<Vec<String>> = options
            .into_iter()
            .map(|targets| {
                let max = targets.iter().map(|(_, c)| *c).max().unwrap_or(0);
                let floor = if prune { (max as f64).sqrt().floor() as usize } else { 0 };
                targets
                    .into_iter()
                    .filter(|(_, c)| *c >= floor)
                    .map(|(t, _)| t)
                    .collect()
            })
            .collect();

        let total = options
            .iter()
            .fold(1u128, |acc, o| acc.saturating_mul(o.len() as u128));
        if total > CANDIDATE_WARN_THRESHOLD {
            tracing::warn!(
                candidates = %total,
                sources = sources.len(),
                prune = prune,
                "Large number of candidate alignment maps"
            );
        }

        CandidateMaps {
            cursor: vec![0; sources.len()],
            sources,
            options,
            total,
            done: false,
        }
    }

    fn for_each_principal_pair<F>(&self, source: &[Mention], target: &[Mention], mut f: F)
    where
        F: FnMut(&str, &str),
    {
        let text_len = self.text_len.unwrap_or_else(|| extent(source, target));
        for segment in Segmenter::unchecked(text_len, &[source, target]) {
            let s = segment.principal(0).and_then(Mention::entity);
            let t = segment.principal(1).and_then(Mention::entity);
            if let (Some(s), Some(t)) = (s, t) {
                f(s, t);
            }
        }
    }
}

fn extent(a: &[Mention], b: &[Mention]) -> Offset {
    a.iter().chain(b).map(|m| m.end().max(m.start())).max().unwrap_or(0)
}

/// Lazy cartesian enumeration of candidate maps.
#[derive(Debug, Clone)]
pub struct CandidateMaps {
    sources: Vec<String>,
    options: Vec<Vec<String>>,
    cursor: Vec<usize>,
    total: u128,
    done: bool,
}

impl CandidateMaps {
    /// Number of maps the enumeration yields, saturating.
    pub fn total(&self) -> u128 {
        self.total
    }
}

impl Iterator for CandidateMaps {
    type Item = AlignmentMap;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let map: AlignmentMap = self
            .sources
            .iter()
            .zip(&self.cursor)
            .zip(&self.options)
            .map(|((s, &c), o)| (s.clone(), o[c].clone()))
            .collect();

        // Odometer step, last source turning fastest.
        self.done = true;
        for slot in (0..self.cursor.len()).rev() {
            self.cursor[slot] += 1;
            if self.cursor[slot] < self.options[slot].len() {
                self.done = false;
                break;
            }
            self.cursor[slot] = 0;
        }

        Some(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greedy_prefers_highest_count() {
        // source A overlaps x twice and y once
        let source = vec![
            Mention::new(0, 2, "A"),
            Mention::new(3, 5, "A"),
            Mention::new(6, 8, "A"),
            Mention::new(10, 12, "B"),
        ];
        let target = vec![
            Mention::new(0, 2, "y"),
            Mention::new(3, 5, "x"),
            Mention::new(6, 8, "x"),
            Mention::new(10, 12, "z"),
        ];

        let map = ChainAligner::new().greedy_align(&source, &target);
        assert_eq!(map.get("A"), Some("x"));
        assert_eq!(map.get("B"), Some("z"));
        assert_eq!(map.get_or("C", "-"), "-");
    }

    #[test]
    fn test_last_overlap_takes_final_pair() {
        let source = vec![Mention::new(0, 2, "A"), Mention::new(3, 5, "A"), Mention::new(6, 8, "A")];
        let target = vec![Mention::new(0, 2, "x"), Mention::new(3, 5, "x"), Mention::new(6, 8, "y")];

        let aligner = ChainAligner::new();
        assert_eq!(aligner.last_overlap_align(&source, &target).get("A"), Some("y"));
        assert_eq!(aligner.greedy_align(&source, &target).get("A"), Some("x"));
        assert_eq!(aligner.align(&source, &target, AlignStrategy::LastOverlap).get("A"), Some("y"));
    }

    #[test]
    fn test_no_overlap_no_mapping() {
        let source = vec![Mention::new(0, 2, "A")];
        let target = vec![Mention::new(5, 7, "x"), Mention::unlabelled(0, 2)];
        assert!(ChainAligner::new().greedy_align(&source, &target).is_empty());
    }

    #[test]
    fn test_ties_broken_by_first_occurrence() {
        let source = vec![Mention::new(0, 2, "A"), Mention::new(3, 5, "A")];
        let target = vec![Mention::new(0, 2, "late"), Mention::new(3, 5, "other")];
        let map = ChainAligner::new().greedy_align(&source, &target);
        assert_eq!(map.get("A"), Some("late"));
    }

    #[test]
    fn test_co_occurrence_counts_segments() {
        // nested target splits the source mention into three segments
        let source = vec![Mention::new(0, 9, "A")];
        let target = vec![Mention::new(0, 9, "x"), Mention::new(3, 6, "y")];
        let table = ChainAligner::with_text_len(9).co_occurrences(&source, &target);

        assert_eq!(
            table,
            vec![
                CoOccurrence { source: "A".into(), target: "x".into(), count: 2 },
                CoOccurrence { source: "A".into(), target: "y".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_mentions_before_text_count_once() {
        let source = vec![Mention::new(-3, 2, "A")];
        let target = vec![Mention::new(-1, 2, "x")];
        let table = ChainAligner::with_text_len(5).co_occurrences(&source, &target);

        assert_eq!(
            table,
            vec![CoOccurrence { source: "A".into(), target: "x".into(), count: 1 }]
        );
    }

    #[test]
    fn test_candidate_maps_cartesian() {
        let source = vec![Mention::new(0, 4, "A"), Mention::new(5, 9, "B")];
        let target = vec![
            Mention::new(0, 2, "x"),
            Mention::new(2, 4, "y"),
            Mention::new(5, 7, "x"),
            Mention::new(7, 9, "z"),
        ];

        let maps: Vec<_> = ChainAligner::new().candidate_maps(&source, &target, false).collect();
        assert_eq!(maps.len(), 4);
        assert_eq!(maps[0].get("A"), Some("x"));
        assert_eq!(maps[0].get("B"), Some("x"));
        assert_eq!(maps[1].get("B"), Some("z"));
        assert_eq!(maps[3].get("A"), Some("y"));
    }

    #[test]
    fn test_candidate_maps_pruning() {
        // A meets x four times and y once; floor(sqrt(4)) = 2 drops y
        let mut source = Vec::new();
        let mut target = Vec::new();
        for i in 0..5 {
            source.push(Mention::new(i * 3, i * 3 + 2, "A"));
            target.push(Mention::new(i * 3, i * 3 + 2, if i == 2 { "y" } else { "x" }));
        }

        let aligner = ChainAligner::new();
        assert_eq!(aligner.candidate_maps(&source, &target, false).total(), 2);
        let pruned: Vec<_> = aligner.candidate_maps(&source, &target, true).collect();
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].get("A"), Some("x"));
    }

    #[test]
    fn test_candidate_maps_empty_yields_single_empty_map() {
        let maps: Vec<_> = ChainAligner::new().candidate_maps(&[], &[], true).collect();
        assert_eq!(maps, vec![AlignmentMap::new()]);
    }

    #[test]
    fn test_alignment_map_fingerprint_order_independent() {
        let a: AlignmentMap = [("b", "2"), ("a", "1")].into_iter().collect();
        let b: AlignmentMap = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
