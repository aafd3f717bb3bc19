//! Character spans over a shared text buffer.
//!
//! Offsets count Unicode scalar values (`char`s), not bytes. They are signed
//! so that re-alignment can report a span that fell off the front of the
//! destination text instead of silently wrapping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Character offset into a text buffer.
pub type Offset = i64;

/// Count the characters of a text as an [`Offset`].
pub fn char_len(text: &str) -> Offset {
    text.chars().count() as Offset
}

/// Ordered attribute map attached to a span.
///
/// Clones share storage; the first write on a shared map copies it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Attributes(Arc<BTreeMap<String, String>>);

impl Attributes {
    /// Create an empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an attribute.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Set an attribute, copying the map first if it is shared.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        Arc::make_mut(&mut self.0).insert(key.into(), value.into())
    }

    /// Remove an attribute, copying the map first if it is shared.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        if !self.0.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.0).remove(key)
    }

    /// Iterate attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether two maps share the same storage.
    pub fn shares_storage(&self, other: &Attributes) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<BTreeMap<String, String>> for Attributes {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(Arc::new(map))
    }
}

impl From<Attributes> for BTreeMap<String, String> {
    fn from(attrs: Attributes) -> Self {
        Arc::try_unwrap(attrs.0).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<BTreeMap<_, _>>()
            .into()
    }
}

/// Half-open character range `[start, end)`, optionally bound to its text.
///
/// Equality and hashing consider the range and the bound text, never the
/// attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// First character of the span.
    pub start: Offset,
    /// One past the last character of the span.
    pub end: Offset,
    /// Free-form attributes carried through comparison.
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    #[serde(skip)]
    text: Option<Arc<str>>,
}

impl Span {
    /// Create an unbound span.
    pub fn new(start: Offset, end: Offset) -> Self {
        Self {
            start,
            end,
            attributes: Attributes::default(),
            text: None,
        }
    }

    /// Create a span bound to `text`.
    pub fn bound(text: Arc<str>, start: Offset, end: Offset) -> Self {
        Self::new(start, end).with_text(text)
    }

    /// Return a copy bound to `text`.
    pub fn with_text(mut self, text: Arc<str>) -> Self {
        self.text = Some(text);
        self
    }

    /// Return a copy carrying `attributes`.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Return a copy covering `[start, end)` with the same text and attributes.
    pub fn with_range(&self, start: Offset, end: Offset) -> Self {
        Self {
            start,
            end,
            attributes: self.attributes.clone(),
            text: self.text.clone(),
        }
    }

    /// The text this span points into, if bound.
    pub fn text(&self) -> Option<&Arc<str>> {
        self.text.as_ref()
    }

    /// Number of characters covered (zero for inverted ranges).
    pub fn len(&self) -> Offset {
        (self.end - self.start).max(0)
    }

    /// Whether the span covers no characters.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `0 <= start <= end <= text_len`.
    pub fn is_valid_for(&self, text_len: Offset) -> bool {
        self.start >= 0 && self.start <= self.end && self.end <= text_len
    }

    /// Whether the span is well formed against its bound text.
    ///
    /// Unbound spans only need `0 <= start <= end`.
    pub fn is_valid(&self) -> bool {
        match &self.text {
            Some(text) => self.is_valid_for(char_len(text)),
            None => self.start >= 0 && self.start <= self.end,
        }
    }

    /// Whether the two ranges share at least one character.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.end.min(other.end) - self.start.max(other.start) > 0
    }

    /// Whether `other` lies within this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// Whether both spans cover the same range, ignoring text and attributes.
    pub fn same_range(&self, other: &Span) -> bool {
        self.start == other.start && self.end == other.end
    }

    /// The covered characters, or `None` if unbound or out of range.
    pub fn covered_text(&self) -> Option<String> {
        let text = self.text.as_ref()?;
        if !self.is_valid() {
            return None;
        }
        Some(
            text.chars()
                .skip(self.start as usize)
                .take((self.end - self.start) as usize)
                .collect(),
        )
    }
}

impl PartialEq for Span {
    fn eq(&self, other: &Self) -> bool {
        self.same_range(other)
            && match (&self.text, &other.text) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
                _ => false,
            }
    }
}

impl Eq for Span {}

impl Hash for Span {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end.hash(state);
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.covered_text() {
            Some(covered) => write!(f, "{}", covered.replace('\n', " \u{21B5} ")),
            None if self.text.is_none() && self.is_valid() => write!(f, "[{}, {})", self.start, self.end),
            None => write!(f, "({}-{}, invalid)", self.start, self.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[test]
    fn test_covered_text_uses_char_offsets() {
        let t = text("héllo wörld");
        let span = Span::bound(t, 6, 11);
        assert_eq!(span.covered_text().as_deref(), Some("wörld"));
    }

    #[test]
    fn test_invalid_span_has_no_covered_text() {
        let t = text("abc");
        assert_eq!(Span::bound(t.clone(), -1, 2).covered_text(), None);
        assert_eq!(Span::bound(t.clone(), 1, 4).covered_text(), None);
        assert_eq!(Span::bound(t.clone(), 2, 1).covered_text(), None);
        assert_eq!(Span::bound(t, 1, 4).to_string(), "(1-4, invalid)");
    }

    #[test]
    fn test_overlap_and_containment() {
        let outer = Span::new(0, 10);
        let inner = Span::new(2, 8);
        let touching = Span::new(10, 12);

        assert!(outer.overlaps(&inner));
        assert!(!outer.overlaps(&touching));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(inner.same_range(&Span::new(2, 8)));
    }

    #[test]
    fn test_equality_ignores_attributes() {
        let a = Span::new(1, 3).with_attributes([("source", "a")].into_iter().collect());
        let b = Span::new(1, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_attributes_copy_on_write() {
        let mut a: Attributes = [("k", "v")].into_iter().collect();
        let b = a.clone();
        assert!(a.shares_storage(&b));

        a.insert("k2", "v2");
        assert!(!a.shares_storage(&b));
        assert_eq!(b.len(), 1);
        assert_eq!(a.get("k2"), Some("v2"));
    }

    #[test]
    fn test_display_marks_newlines() {
        let span = Span::bound(text("a\nb"), 0, 3);
        assert_eq!(span.to_string(), "a \u{21B5} b");
    }
}
