//! Boundary streams and the N-way segmenter.

pub mod boundary;
pub mod segmenter;

pub use boundary::{BoundaryEvent, BoundaryStream, EventKind};
pub use segmenter::{segment, SegmentError, Segmenter};
