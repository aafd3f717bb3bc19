//! Entity mentions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::span::{Offset, Span};

/// A span tagged with an entity label.
///
/// Mentions sharing a label form a chain. The optional `essential` span marks
/// the minimal part of the mention (for example the head noun) and is used
/// when comparing annotators that disagree on mention extent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    /// Covered range, bound text and attributes.
    #[serde(flatten)]
    pub span: Span,
    /// Entity label, `None` for untagged mentions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Minimal sub-range of the mention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<Span>,
}

impl Mention {
    /// Create a mention over `[start, end)` labelled `entity`.
    pub fn new(start: Offset, end: Offset, entity: impl Into<String>) -> Self {
        Self::from_span(Span::new(start, end), Some(entity.into()))
    }

    /// Create an unlabelled mention.
    pub fn unlabelled(start: Offset, end: Offset) -> Self {
        Self::from_span(Span::new(start, end), None)
    }

    /// Wrap an existing span.
    pub fn from_span(span: Span, entity: Option<String>) -> Self {
        Self {
            span,
            entity,
            essential: None,
        }
    }

    /// Return a copy with the given essential range.
    pub fn with_essential(mut self, start: Offset, end: Offset) -> Self {
        self.essential = Some(self.span.with_range(start, end));
        self
    }

    /// First character.
    pub fn start(&self) -> Offset {
        self.span.start
    }

    /// One past the last character.
    pub fn end(&self) -> Offset {
        self.span.end
    }

    /// Label as `&str`.
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Boundary order: start ascending, then end descending.
    ///
    /// At equal starts the longer mention sorts first and is treated as the
    /// outer one.
    pub fn boundary_cmp(&self, other: &Mention) -> Ordering {
        self.start()
            .cmp(&other.start())
            .then_with(|| other.end().cmp(&self.end()))
    }

    /// The mention reduced to its essential range.
    ///
    /// Keeps entity, attributes and the essential span itself. Without an
    /// essential span this is a plain clone.
    pub fn essential_mention(&self) -> Mention {
        match &self.essential {
            None => self.clone(),
            Some(essential) => Mention {
                span: self.span.with_range(essential.start, essential.end),
                entity: self.entity.clone(),
                essential: Some(essential.clone()),
            },
        }
    }
}

/// Stable sort by [`Mention::boundary_cmp`].
pub fn sort_mentions(mentions: &mut [Mention]) {
    mentions.sort_by(Mention::boundary_cmp);
}

impl PartialEq for Mention {
    fn eq(&self, other: &Self) -> bool {
        self.span == other.span && self.entity == other.entity
    }
}

impl Eq for Mention {}

impl Hash for Mention {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.span.hash(state);
        self.entity.hash(state);
    }
}

impl fmt::Display for Mention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}", self.start(), self.end())?;
        if self.span.text().is_some() {
            write!(f, ", {}", self.span)?;
        }
        if let Some(essential) = &self.essential {
            write!(f, ", min [{}, {})", essential.start, essential.end)?;
        }
        write!(f, "): {}", self.entity().unwrap_or("-"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_order_outer_first() {
        let mut mentions = vec![
            Mention::new(2, 4, "inner"),
            Mention::new(0, 3, "b"),
            Mention::new(2, 8, "outer"),
        ];
        sort_mentions(&mut mentions);

        let labels: Vec<_> = mentions.iter().map(|m| m.entity().unwrap()).collect();
        assert_eq!(labels, vec!["b", "outer", "inner"]);
    }

    #[test]
    fn test_essential_mention() {
        let m = Mention::new(0, 10, "E").with_essential(4, 7);
        let e = m.essential_mention();
        assert_eq!((e.start(), e.end()), (4, 7));
        assert_eq!(e.entity(), Some("E"));

        let plain = Mention::new(1, 2, "F");
        assert_eq!(plain.essential_mention(), plain);
    }

    #[test]
    fn test_equality_includes_entity() {
        assert_ne!(Mention::new(0, 1, "a"), Mention::new(0, 1, "b"));
        assert_eq!(Mention::new(0, 1, "a"), Mention::new(0, 1, "a"));
    }

    #[test]
    fn test_serde_flattens_span() {
        let json = r#"{"start":3,"end":5,"entity":"Paris","attributes":{"type":"LOC"}}"#;
        let m: Mention = serde_json::from_str(json).unwrap();
        assert_eq!((m.start(), m.end()), (3, 5));
        assert_eq!(m.span.attributes.get("type"), Some("LOC"));
    }
}
