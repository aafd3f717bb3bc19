//! Batch comparison of many candidates against one gold annotation.
//!
//! Each candidate is compared against gold independently, so the work is
//! spread over a rayon pool when the `parallel` feature is enabled. Results
//! are returned in candidate order either way.

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::compare::{compare_documents, CompareConfig, DocumentComparison, VerdictCounts};
use crate::types::AnnotatedText;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Outcome for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    /// Position of the candidate in the input.
    pub candidate: usize,
    /// Candidate document id.
    pub document_id: String,
    /// The pairwise comparison, if it succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<DocumentComparison>,
    /// Why the comparison failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Registry of comparison fingerprints in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRegistry {
    /// One entry per candidate.
    pub entries: Vec<ComparisonRegistryEntry>,
    /// Hash over all entries.
    pub registry_hash: String,
}

/// Fingerprint of one pairwise comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRegistryEntry {
    /// Position of the candidate.
    pub candidate: usize,
    /// Comparison hash, `None` if the comparison failed.
    pub comparison_hash: Option<String>,
    /// Verdict totals, `None` if the comparison failed.
    pub counts: Option<VerdictCounts>,
}

impl ComparisonRegistry {
    /// Create a registry from entries.
    pub fn new(entries: Vec<ComparisonRegistryEntry>) -> Self {
        let registry_hash = canonical_hash_hex(&entries);
        Self {
            entries,
            registry_hash,
        }
    }

    /// Entry of one candidate.
    pub fn get(&self, candidate: usize) -> Option<&ComparisonRegistryEntry> {
        self.entries.iter().find(|e| e.candidate == candidate)
    }
}

/// Result of a batch comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchComparison {
    /// Gold document id.
    pub gold_id: String,
    /// Hash of the configuration used.
    pub config_hash: String,
    /// Per-candidate outcomes in input order.
    pub results: Vec<CandidateResult>,
    /// Number of successful comparisons.
    pub success_count: usize,
    /// Fingerprints of all comparisons.
    pub registry: ComparisonRegistry,
}

/// Compare every candidate against `gold`.
///
/// A failing candidate (wrong id, different text) is reported in its result
/// and does not stop the batch.
pub fn compare_against_gold(
    gold: &AnnotatedText,
    candidates: &[AnnotatedText],
    config: &CompareConfig,
) -> BatchComparison {
    let run = |(candidate, doc): (usize, &AnnotatedText)| -> CandidateResult {
        let pair = [gold.clone(), doc.clone()];
        match compare_documents(&pair, config) {
            Ok(comparison) => CandidateResult {
                candidate,
                document_id: doc.id.clone(),
                comparison: Some(comparison),
                error: None,
            },
            Err(e) => {
                tracing::warn!(
                    gold_id = %gold.id,
                    candidate = candidate,
                    error = %e,
                    "Candidate comparison failed"
                );
                CandidateResult {
                    candidate,
                    document_id: doc.id.clone(),
                    comparison: None,
                    error: Some(e.to_string()),
                }
            }
        }
    };

    #[cfg(feature = "parallel")]
    let results: Vec<CandidateResult> = candidates.par_iter().enumerate().map(run).collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<CandidateResult> = candidates.iter().enumerate().map(run).collect();

    let entries = results
        .iter()
        .map(|r| ComparisonRegistryEntry {
            candidate: r.candidate,
            comparison_hash: r.comparison.as_ref().map(|c| c.comparison_hash.clone()),
            counts: r.comparison.as_ref().and_then(|c| c.summary.first().copied()),
        })
        .collect();
    let success_count = results.iter().filter(|r| r.comparison.is_some()).count();

    tracing::info!(
        gold_id = %gold.id,
        candidates = candidates.len(),
        succeeded = success_count,
        "Batch comparison finished"
    );

    BatchComparison {
        gold_id: gold.id.clone(),
        config_hash: config.params_hash(),
        results,
        success_count,
        registry: ComparisonRegistry::new(entries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Mention;

    const TEXT: &str = "Alice and Bob";

    fn annotated(id: &str, labels: &[(i64, i64, &str)]) -> AnnotatedText {
        AnnotatedText::new(id, TEXT)
            .with_mentions(labels.iter().map(|&(s, e, l)| Mention::new(s, e, l)))
    }

    #[test]
    fn test_results_in_candidate_order() {
        let gold = annotated("d", &[(0, 5, "Alice"), (10, 13, "Bob")]);
        let candidates = vec![
            annotated("d", &[(0, 5, "Alice")]),
            annotated("d", &[(0, 5, "Alice"), (10, 13, "Bob")]),
            annotated("d", &[]),
        ];

        let batch = compare_against_gold(&gold, &candidates, &CompareConfig::default());
        assert_eq!(batch.success_count, 3);
        let order: Vec<_> = batch.results.iter().map(|r| r.candidate).collect();
        assert_eq!(order, vec![0, 1, 2]);

        let counts = |i: usize| batch.registry.get(i).unwrap().counts.unwrap();
        assert_eq!(counts(0).missed, 1);
        assert_eq!(counts(1).correct, 2);
        assert_eq!(counts(2).missed, 2);
    }

    #[test]
    fn test_failing_candidate_does_not_stop_batch() {
        let gold = annotated("d", &[(0, 5, "Alice")]);
        let candidates = vec![annotated("other", &[]), annotated("d", &[(0, 5, "Alice")])];

        let batch = compare_against_gold(&gold, &candidates, &CompareConfig::default());
        assert_eq!(batch.success_count, 1);
        assert!(batch.results[0].error.is_some());
        assert!(batch.registry.entries[0].comparison_hash.is_none());
        assert!(batch.results[1].comparison.is_some());
    }

    #[test]
    fn test_registry_hash_deterministic() {
        let gold = annotated("d", &[(0, 5, "Alice")]);
        let candidates = vec![annotated("d", &[(0, 5, "Alice")])];
        let a = compare_against_gold(&gold, &candidates, &CompareConfig::default());
        let b = compare_against_gold(&gold, &candidates, &CompareConfig::default());
        assert_eq!(a.registry.registry_hash, b.registry.registry_hash);
    }
}
