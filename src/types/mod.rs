//! Core types: spans, mentions, documents and segments.

pub mod span;
pub mod mention;
pub mod document;
pub mod segment;

pub use span::{char_len, Attributes, Offset, Span};
pub use mention::{sort_mentions, Mention};
pub use document::AnnotatedText;
pub use segment::{OpenEntry, OpenKind, OpenSet, Segment};
