//! # mention-compare
//!
//! Aligns several independent entity/coreference annotations of the same
//! text into one synchronized view.
//!
//! The crate answers one question:
//!
//! > For every slice of the text, which entity did each annotator assign?
//!
//! ## Core Contract
//!
//! 1. Re-map span offsets between two versions of a text (`TextAligner`)
//! 2. Cut the text at every mention boundary of every annotator and report,
//!    per slice, the mentions open in each annotation (`Segmenter`)
//! 3. Map one annotator's entity labels onto another's by overlap (`ChainAligner`)
//!
//! ## Architecture
//!
//! ```text
//! mentions ─► TextAligner ─► BoundaryStream ×N ─► Segmenter ─► Segment*
//!                                                     │            │
//!                                               ChainAligner   compare ─► DocumentComparison
//!                                                     │
//!                                               AlignmentMap
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same mention lists → identical segment sequence
//! - Nested mentions resolve innermost-first, equal starts outer-first
//! - Greedy alignment ties break by first co-occurrence

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod align;
pub mod segment;
pub mod chain;
pub mod compare;
pub mod batch;
pub mod canonical;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{AnnotatedText, Attributes, Mention, Offset, OpenEntry, OpenKind, OpenSet, Segment, Span};
pub use align::{AlignerConfig, Realign, TextAligner};
pub use segment::{segment, BoundaryEvent, BoundaryStream, EventKind, SegmentError, Segmenter};
pub use chain::{AlignStrategy, AlignmentMap, CandidateMaps, Chain, ChainAligner, ChainIndex, CoOccurrence};
pub use compare::{
    compare_documents, ChainMarks, CompareConfig, CompareError, DocumentComparison, Mark, Principal,
    SegmentReport, Verdict, VerdictCounts,
};
pub use batch::{compare_against_gold, BatchComparison, CandidateResult, ComparisonRegistry};
pub use canonical::{canonical_hash, canonical_hash_hex, text_fingerprint, to_canonical_bytes};

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};

/// Schema version for all serialized comparison types.
/// Increment on breaking changes to any schema type.
pub const MENTION_COMPARE_SCHEMA_VERSION: &str = "1.0.0";
