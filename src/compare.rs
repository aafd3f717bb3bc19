//! Multi-annotator comparison of one document.
//!
//! Document 0 is the gold standard; every other document is a candidate.
//!
//! ## Pipeline
//!
//! ```text
//! documents ─► same id & text? ─► drop NIL labels ─► essential mentions
//!                                                        │
//!             ChainIndex per document ◄──────────────────┤
//!             candidate labels ─► gold labels (greedy)   │
//!                                                        ▼
//!                                  Segmenter over all documents
//!                                                        │
//!          per segment: principals, verdicts, split flag, chain marks
//! ```
//!
//! Candidate chains are renumbered to the index of the gold chain they align
//! to. Chains without a gold counterpart get fresh numbers after the last
//! gold chain, in first-seen order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::canonical::canonical_hash_hex;
use crate::chain::{AlignmentMap, ChainAligner, ChainIndex};
use crate::segment::{SegmentError, Segmenter};
use crate::types::{AnnotatedText, Mention, Offset, OpenKind, Segment};

/// Labels that mark a mention as not linked to any entity.
pub const DEFAULT_NIL_ENTITIES: [&str; 3] = ["--", "--NME--", "--OOKBE--"];

/// Label of entities outside the knowledge base.
pub const OUT_OF_KB_ENTITY: &str = "--OOKBE--";

/// Identifier of the comparison configuration schema.
pub const COMPARE_CONFIG_VERSION: &str = "compare_config_v1";

/// Error type for document comparison.
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    /// Nothing to compare.
    #[error("No documents to compare")]
    NoDocuments,
    /// A candidate annotates a different document.
    #[error("Document {index} has id '{found}', expected '{expected}'")]
    DocumentIdMismatch {
        /// Position of the offending document.
        index: usize,
        /// Gold document id.
        expected: String,
        /// Candidate document id.
        found: String,
    },
    /// A candidate annotates a different version of the text.
    #[error(
        "Document {index} text differs after {common_prefix} characters \
         (gold length {expected_len}, candidate length {found_len})"
    )]
    TextMismatch {
        /// Position of the offending document.
        index: usize,
        /// Number of leading characters both texts share.
        common_prefix: usize,
        /// Gold text length in characters.
        expected_len: usize,
        /// Candidate text length in characters.
        found_len: usize,
    },
    /// Segmentation rejected the input.
    #[error("Segmentation failed: {0}")]
    Segment(#[from] SegmentError),
}

/// Comparison options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Compare essential ranges instead of full mention extents.
    pub essential_only: bool,
    /// Drop mentions labelled with one of `nil_entities` before comparing.
    pub filter_nil_entities: bool,
    /// Placeholder labels for unlinked mentions.
    pub nil_entities: BTreeSet<String>,
    /// Label whose principals are treated as absent.
    pub suppressed_entity: Option<String>,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            essential_only: true,
            filter_nil_entities: true,
            nil_entities: DEFAULT_NIL_ENTITIES.iter().map(|s| s.to_string()).collect(),
            suppressed_entity: Some(OUT_OF_KB_ENTITY.to_string()),
        }
    }
}

impl CompareConfig {
    /// Compare mentions exactly as given.
    pub fn minimal() -> Self {
        Self {
            essential_only: false,
            filter_nil_entities: false,
            nil_entities: BTreeSet::new(),
            suppressed_entity: None,
        }
    }

    /// Configuration schema identifier.
    pub fn config_id(&self) -> &'static str {
        COMPARE_CONFIG_VERSION
    }

    /// Stable hash of the configuration.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(self)
    }

    fn is_suppressed(&self, entity: Option<&str>) -> bool {
        matches!((entity, &self.suppressed_entity), (Some(e), Some(s)) if e == s.as_str())
    }
}

/// Candidate's agreement with gold on one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Same label as gold.
    Correct,
    /// Different label than gold.
    Wrong,
    /// Gold labelled the segment, the candidate did not.
    Missed,
    /// The candidate labelled a segment gold left untagged.
    Spurious,
    /// Neither labelled the segment.
    Unannotated,
}

impl Verdict {
    fn judge(gold: Option<&Mention>, candidate: Option<&Mention>) -> Self {
        let gold_label = gold.and_then(Mention::entity);
        match (gold_label, candidate.and_then(Mention::entity)) {
            (Some(g), Some(c)) if g == c => Self::Correct,
            (_, Some(_)) if gold.is_none() => Self::Spurious,
            (_, Some(_)) => Self::Wrong,
            (Some(_), None) => Self::Missed,
            (None, None) => Self::Unannotated,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Correct => "correct",
            Self::Wrong => "wrong",
            Self::Missed => "missed",
            Self::Spurious => "spurious",
            Self::Unannotated => "",
        };
        f.write_str(s)
    }
}

/// Principal mention of one document in one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Entity label, if the mention carries one.
    pub entity: Option<String>,
    /// Display chain index, aligned to gold numbering.
    pub chain: Option<usize>,
    /// Mention range.
    pub start: Offset,
    /// Mention range end.
    pub end: Offset,
}

/// Chains opening at a segment's start and closing at its end.
///
/// `None` means no mention of the document is open there, or one of the
/// mentions at that boundary belongs to no chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMarks {
    /// Chains whose mention starts where the segment starts, innermost first.
    pub opening: Option<Vec<usize>>,
    /// Chains whose mention ends where the segment ends, innermost first.
    pub closing: Option<Vec<usize>>,
}

impl ChainMarks {
    /// Bracket notation for opening chains, e.g. `(1,(3`.
    pub fn opening_label(&self) -> Option<String> {
        self.opening
            .as_ref()
            .map(|c| c.iter().map(|i| format!("({i}")).collect::<Vec<_>>().join(","))
    }

    /// Bracket notation for closing chains, e.g. `3),1)`.
    pub fn closing_label(&self) -> Option<String> {
        self.closing
            .as_ref()
            .map(|c| c.iter().map(|i| format!("{i})")).collect::<Vec<_>>().join(","))
    }
}

/// Evaluation of a segment where at least one document has a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mark {
    /// Candidates disagree among themselves.
    pub split: bool,
    /// One verdict per candidate.
    pub verdicts: Vec<Verdict>,
    /// Chain boundaries per document, gold first.
    pub chains: Vec<ChainMarks>,
}

/// One segment of the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentReport {
    /// First character.
    pub start: Offset,
    /// One past the last character.
    pub end: Offset,
    /// Covered text.
    pub text: String,
    /// Principal per document, gold first.
    pub principals: Vec<Option<Principal>>,
    /// Present when any document has a principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark: Option<Mark>,
}

/// Verdict totals of one candidate over all marked segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    /// Segments with the gold label.
    pub correct: usize,
    /// Segments with another label.
    pub wrong: usize,
    /// Segments left unlabelled.
    pub missed: usize,
    /// Segments labelled without a gold label.
    pub spurious: usize,
}

impl VerdictCounts {
    fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Correct => self.correct += 1,
            Verdict::Wrong => self.wrong += 1,
            Verdict::Missed => self.missed += 1,
            Verdict::Spurious => self.spurious += 1,
            Verdict::Unannotated => {}
        }
    }
}

/// Result of comparing all annotations of one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentComparison {
    /// Shared document id.
    pub document_id: String,
    /// SHA-256 of the shared text.
    pub text_hash: String,
    /// Hash of the configuration used.
    pub config_hash: String,
    /// Number of chains per document, gold first.
    pub chain_counts: Vec<usize>,
    /// Candidate-to-gold label maps, one per candidate.
    pub alignments: Vec<AlignmentMap>,
    /// Segments tiling the text.
    pub segments: Vec<SegmentReport>,
    /// Verdict totals per candidate.
    pub summary: Vec<VerdictCounts>,
    /// Hash over alignments and segments.
    pub comparison_hash: String,
    /// When the comparison was computed. Not part of the hash.
    pub computed_at: DateTime<Utc>,
}

impl DocumentComparison {
    /// Number of candidates.
    pub fn candidate_count(&self) -> usize {
        self.alignments.len()
    }

    /// Segments where candidates disagree.
    pub fn split_segments(&self) -> impl Iterator<Item = &SegmentReport> {
        self.segments
            .iter()
            .filter(|s| s.mark.as_ref().is_some_and(|m| m.split))
    }
}

/// Compare annotations of one document; `documents[0]` is gold.
///
/// # Errors
/// - [`CompareError::NoDocuments`] for an empty slice
/// - [`CompareError::DocumentIdMismatch`] / [`CompareError::TextMismatch`]
///   when a candidate annotates another document or text version
pub fn compare_documents(
    documents: &[AnnotatedText],
    config: &CompareConfig,
) -> Result<DocumentComparison, CompareError> {
    let gold = documents.first().ok_or(CompareError::NoDocuments)?;
    check_documents(documents)?;

    let prepared: Vec<AnnotatedText> = documents.iter().map(|d| prepare(d, config)).collect();
    let lists: Vec<&[Mention]> = prepared.iter().map(|d| d.mentions()).collect();
    let text_len = gold.text_len();

    let chains: Vec<ChainIndex<'_>> = lists.iter().copied().map(ChainIndex::build).collect();

    let aligner = ChainAligner::with_text_len(text_len);
    let alignments: Vec<AlignmentMap> = lists[1..]
        .iter()
        .map(|candidate| aligner.greedy_align(candidate, lists[0]))
        .collect();

    let display = display_indices(&chains, &alignments);

    let byte_at = char_boundaries(gold.text());
    let mut segments = Vec::new();
    let mut summary = vec![VerdictCounts::default(); alignments.len()];
    let mut previous: Option<Segment<'_>> = None;

    for segment in Segmenter::new(text_len, &lists)? {
        let principals: Vec<Option<&Mention>> = (0..lists.len())
            .map(|i| segment.principal(i).filter(|m| !config.is_suppressed(m.entity())))
            .collect();

        let mark = if principals.iter().any(Option::is_some) {
            let verdicts: Vec<Verdict> = principals[1..]
                .iter()
                .map(|c| Verdict::judge(principals[0], *c))
                .collect();
            for (counts, verdict) in summary.iter_mut().zip(&verdicts) {
                counts.record(*verdict);
            }
            let split = verdicts.windows(2).any(|w| w[0] != w[1]);
            let chain_marks = (0..lists.len())
                .map(|doc| ChainMarks {
                    opening: previous
                        .as_ref()
                        .and_then(|p| chain_mark(p, doc, OpenKind::Start, &chains[doc], &display[doc])),
                    closing: chain_mark(&segment, doc, OpenKind::End, &chains[doc], &display[doc]),
                })
                .collect();
            Some(Mark {
                split,
                verdicts,
                chains: chain_marks,
            })
        } else {
            None
        };

        segments.push(SegmentReport {
            start: segment.start,
            end: segment.end,
            text: slice_chars(gold.text(), &byte_at, segment.start, segment.end).to_string(),
            principals: principals
                .iter()
                .enumerate()
                .map(|(doc, p)| {
                    p.map(|m| Principal {
                        entity: m.entity.clone(),
                        chain: m.entity().and_then(|e| display[doc].get(e).copied()),
                        start: m.start(),
                        end: m.end(),
                    })
                })
                .collect(),
            mark,
        });
        previous = Some(segment);
    }

    let comparison_hash = canonical_hash_hex(&(&alignments, &segments));
    tracing::info!(
        document_id = %gold.id,
        documents = documents.len(),
        segments = segments.len(),
        comparison_hash = %comparison_hash,
        "Compared document annotations"
    );

    Ok(DocumentComparison {
        document_id: gold.id.clone(),
        text_hash: gold.text_hash(),
        config_hash: config.params_hash(),
        chain_counts: chains.iter().map(ChainIndex::len).collect(),
        alignments,
        segments,
        summary,
        comparison_hash,
        computed_at: Utc::now(),
    })
}

/// Reject documents that annotate another document or text version.
pub fn check_documents(documents: &[AnnotatedText]) -> Result<(), CompareError> {
    let Some(gold) = documents.first() else {
        return Err(CompareError::NoDocuments);
    };

    for (index, doc) in documents.iter().enumerate().skip(1) {
        if doc.id != gold.id {
            tracing::warn!(
                index = index,
                expected = %gold.id,
                found = %doc.id,
                "Document id differs from gold"
            );
            return Err(CompareError::DocumentIdMismatch {
                index,
                expected: gold.id.clone(),
                found: doc.id.clone(),
            });
        }

        if doc.text() != gold.text() {
            let common_prefix = gold
                .text()
                .chars()
                .zip(doc.text().chars())
                .take_while(|(a, b)| a == b)
                .count();
            let continuation = |t: &str| t.chars().skip(common_prefix).take(10).collect::<String>();
            tracing::warn!(
                document_id = %gold.id,
                index = index,
                common_prefix = common_prefix,
                gold_continues = %continuation(gold.text()),
                candidate_continues = %continuation(doc.text()),
                "Document text differs from gold"
            );
            return Err(CompareError::TextMismatch {
                index,
                common_prefix,
                expected_len: gold.text_len() as usize,
                found_len: doc.text_len() as usize,
            });
        }
    }

    Ok(())
}

fn prepare(doc: &AnnotatedText, config: &CompareConfig) -> AnnotatedText {
    let filtered = if config.filter_nil_entities {
        doc.without_entities(&config.nil_entities)
    } else {
        doc.clone()
    };
    if config.essential_only {
        filtered.essential_mentions()
    } else {
        filtered
    }
}

/// Entity label to display chain index, per document.
fn display_indices<'a>(chains: &[ChainIndex<'a>], alignments: &[AlignmentMap]) -> Vec<HashMap<&'a str, usize>> {
    let gold = &chains[0];
    let mut display = Vec::with_capacity(chains.len());
    display.push(gold.chains().iter().map(|c| (c.entity, c.index)).collect());

    for (candidate, alignment) in chains[1..].iter().zip(alignments) {
        let mut next_free = gold.len() + 1;
        let mut map = HashMap::new();
        for chain in candidate.chains() {
            let index = match alignment.get(chain.entity).and_then(|g| gold.get(g)) {
                Some(gold_chain) => gold_chain.index,
                None => {
                    next_free += 1;
                    next_free - 1
                }
            };
            map.insert(chain.entity, index);
        }
        display.push(map);
    }

    display
}

/// Display indices of chains whose mention has `kind` at the segment end, innermost first.
fn chain_mark(
    segment: &Segment<'_>,
    doc: usize,
    kind: OpenKind,
    chains: &ChainIndex<'_>,
    display: &HashMap<&str, usize>,
) -> Option<Vec<usize>> {
    let open = segment.open.get(doc)?;
    if open.is_empty() {
        return None;
    }
    open.latest_of_kind(kind)
        .map(|entry| {
            let chain = chains.chain_of(entry.index)?;
            display.get(chain.entity).copied()
        })
        .collect()
}

pub(crate) fn char_boundaries(text: &str) -> Vec<usize> {
    let mut at: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    at.push(text.len());
    at
}

pub(crate) fn slice_chars<'t>(text: &'t str, byte_at: &[usize], start: Offset, end: Offset) -> &'t str {
    let clamp = |o: Offset| o.clamp(0, byte_at.len() as Offset - 1) as usize;
    let (s, e) = (clamp(start), clamp(end));
    if s >= e {
        return "";
    }
    &text[byte_at[s]..byte_at[e]]
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "Obama met Merkel in Berlin.";

    fn doc(mentions: Vec<Mention>) -> AnnotatedText {
        AnnotatedText::new("doc1", TEXT).with_mentions(mentions)
    }

    fn gold() -> AnnotatedText {
        doc(vec![
            Mention::new(0, 5, "Barack_Obama"),
            Mention::new(10, 16, "Angela_Merkel"),
            Mention::new(20, 26, "Berlin"),
        ])
    }

    fn marked(cmp: &DocumentComparison) -> Vec<&SegmentReport> {
        cmp.segments.iter().filter(|s| s.mark.is_some()).collect()
    }

    #[test]
    fn test_identical_annotations_are_correct() {
        let cmp = compare_documents(&[gold(), gold()], &CompareConfig::default()).unwrap();
        let marks = marked(&cmp);

        assert_eq!(marks.len(), 3);
        for seg in marks {
            let mark = seg.mark.as_ref().unwrap();
            assert_eq!(mark.verdicts, vec![Verdict::Correct]);
            assert!(!mark.split);
        }
        assert_eq!(cmp.summary[0].correct, 3);
        assert_eq!(cmp.alignments[0].get("Berlin"), Some("Berlin"));
    }

    #[test]
    fn test_verdict_kinds() {
        let candidate = doc(vec![
            Mention::new(0, 5, "Barack_Obama"),
            Mention::new(10, 16, "Merkel_Company"),
            Mention::new(17, 19, "In"),
        ]);
        let cmp = compare_documents(&[gold(), candidate], &CompareConfig::minimal()).unwrap();

        let verdict_of = |text: &str| {
            cmp.segments
                .iter()
                .find(|s| s.text == text)
                .and_then(|s| s.mark.as_ref())
                .map(|m| m.verdicts[0])
        };
        assert_eq!(verdict_of("Obama"), Some(Verdict::Correct));
        assert_eq!(verdict_of("Merkel"), Some(Verdict::Wrong));
        assert_eq!(verdict_of("in"), Some(Verdict::Spurious));
        assert_eq!(verdict_of("Berlin"), Some(Verdict::Missed));
        assert_eq!(verdict_of(" met "), None);
    }

    #[test]
    fn test_split_when_candidates_disagree() {
        let right = gold();
        let wrong = doc(vec![Mention::new(0, 5, "Other")]);
        let cmp = compare_documents(&[gold(), right, wrong], &CompareConfig::default()).unwrap();

        let obama = cmp.segments.iter().find(|s| s.text == "Obama").unwrap();
        let mark = obama.mark.as_ref().unwrap();
        assert_eq!(mark.verdicts, vec![Verdict::Correct, Verdict::Wrong]);
        assert!(mark.split);
        assert_eq!(cmp.split_segments().count(), 3);
    }

    #[test]
    fn test_candidate_chains_renumbered_to_gold() {
        let gold = doc(vec![Mention::new(0, 5, "A"), Mention::new(10, 16, "B")]);
        let candidate = doc(vec![
            Mention::new(0, 5, "c2"),
            Mention::new(10, 16, "c1"),
            Mention::new(20, 26, "c3"),
        ]);
        let cmp = compare_documents(&[gold, candidate], &CompareConfig::minimal()).unwrap();

        let chain_of = |text: &str, doc: usize| {
            cmp.segments
                .iter()
                .find(|s| s.text == text)
                .and_then(|s| s.principals[doc].as_ref())
                .and_then(|p| p.chain)
        };
        assert_eq!(chain_of("Obama", 1), Some(1));
        assert_eq!(chain_of("Merkel", 1), Some(2));
        assert_eq!(chain_of("Berlin", 1), Some(3));
        assert_eq!(cmp.alignments[0].get("c2"), Some("A"));
    }

    #[test]
    fn test_chain_marks_bracket_mentions() {
        let cmp = compare_documents(&[gold()], &CompareConfig::default()).unwrap();
        let merkel = cmp.segments.iter().find(|s| s.text == "Merkel").unwrap();
        let marks = &merkel.mark.as_ref().unwrap().chains[0];

        assert_eq!(marks.opening_label().as_deref(), Some("(2"));
        assert_eq!(marks.closing_label().as_deref(), Some("2)"));
    }

    #[test]
    fn test_nil_and_out_of_kb_filtered() {
        let with_nil = doc(vec![
            Mention::new(0, 5, "--NME--"),
            Mention::new(10, 16, "--OOKBE--"),
            Mention::new(20, 26, "Berlin"),
        ]);
        let cmp = compare_documents(&[with_nil.clone()], &CompareConfig::default()).unwrap();
        assert_eq!(marked(&cmp).len(), 1);

        let mut keep_nil = CompareConfig::minimal();
        keep_nil.suppressed_entity = Some(OUT_OF_KB_ENTITY.to_string());
        let cmp = compare_documents(&[with_nil], &keep_nil).unwrap();
        assert_eq!(marked(&cmp).len(), 2);
    }

    #[test]
    fn test_essential_only_narrows_mentions() {
        let gold = doc(vec![Mention::new(0, 16, "E").with_essential(0, 5)]);
        let cmp = compare_documents(&[gold.clone()], &CompareConfig::default()).unwrap();
        assert_eq!(marked(&cmp)[0].text, "Obama");

        let cmp = compare_documents(&[gold], &CompareConfig::minimal()).unwrap();
        assert_eq!(marked(&cmp)[0].text, "Obama met Merkel");
    }

    #[test]
    fn test_segments_tile_text() {
        let cmp = compare_documents(&[gold(), gold()], &CompareConfig::default()).unwrap();
        let joined: String = cmp.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(joined, TEXT);
        assert_eq!(cmp.segments.first().unwrap().start, 0);
        assert_eq!(cmp.segments.last().unwrap().end, TEXT.chars().count() as Offset);
    }

    #[test]
    fn test_mismatched_documents_rejected() {
        assert!(matches!(
            compare_documents(&[], &CompareConfig::default()),
            Err(CompareError::NoDocuments)
        ));

        let other_id = AnnotatedText::new("doc2", TEXT);
        assert!(matches!(
            compare_documents(&[gold(), other_id], &CompareConfig::default()),
            Err(CompareError::DocumentIdMismatch { index: 1, .. })
        ));

        let other_text = AnnotatedText::new("doc1", "Obama met Merkel in Bonn.");
        match compare_documents(&[gold(), other_text], &CompareConfig::default()) {
            Err(CompareError::TextMismatch { common_prefix, .. }) => assert_eq!(common_prefix, 21),
            other => panic!("expected text mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_comparison_hash_deterministic() {
        let a = compare_documents(&[gold(), gold()], &CompareConfig::default()).unwrap();
        let b = compare_documents(&[gold(), gold()], &CompareConfig::default()).unwrap();
        assert_eq!(a.comparison_hash, b.comparison_hash);
        assert_eq!(a.text_hash, b.text_hash);
    }

    #[test]
    fn test_config_hash_differs_between_presets() {
        assert_ne!(CompareConfig::default().params_hash(), CompareConfig::minimal().params_hash());
        assert_eq!(CompareConfig::default().config_id(), COMPARE_CONFIG_VERSION);
    }
}
