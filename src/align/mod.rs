//! Re-alignment of spans between two versions of a text.

pub mod aligner;
pub mod diff;

pub use aligner::{
    AlignerConfig, Realign, TextAligner, DEFAULT_MAX_EDIT_DISTANCE, MAX_EDIT_DISTANCE_LIMIT,
};
pub use diff::{diff_chars, CharDiff, DiffRun};
