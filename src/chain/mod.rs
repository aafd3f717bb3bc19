//! Entity chains and label alignment between annotations.

pub mod aligner;
pub mod index;

pub use aligner::{
    AlignStrategy, AlignmentMap, CandidateMaps, ChainAligner, CoOccurrence, CANDIDATE_WARN_THRESHOLD,
};
pub use index::{Chain, ChainIndex};
