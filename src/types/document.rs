//! Annotated documents.
//!
//! An [`AnnotatedText`] is one annotator's view of a document: the text and
//! the mentions tagged on it. Mentions are kept bound to the text and sorted
//! in boundary order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::align::TextAligner;
use crate::canonical::{canonical_hash_hex, text_fingerprint};

use super::mention::{sort_mentions, Mention};
use super::span::{char_len, Attributes, Offset};

/// A text with the mentions one annotator tagged on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "AnnotatedTextRepr")]
pub struct AnnotatedText {
    /// Document identifier, shared by all annotations of the same document.
    pub id: String,
    text: Arc<str>,
    #[serde(skip)]
    text_len: Offset,
    mentions: Vec<Mention>,
    /// Document-level attributes.
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

#[derive(Deserialize)]
struct AnnotatedTextRepr {
    id: String,
    text: String,
    #[serde(default)]
    mentions: Vec<Mention>,
    #[serde(default)]
    attributes: Attributes,
}

impl From<AnnotatedTextRepr> for AnnotatedText {
    fn from(repr: AnnotatedTextRepr) -> Self {
        let mut doc = AnnotatedText::new(repr.id, repr.text).with_mentions(repr.mentions);
        doc.attributes = repr.attributes;
        doc
    }
}

impl AnnotatedText {
    /// Create a document with no mentions.
    pub fn new(id: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        let text: Arc<str> = text.into();
        Self {
            id: id.into(),
            text_len: char_len(&text),
            text,
            mentions: Vec::new(),
            attributes: Attributes::default(),
        }
    }

    /// Replace the mentions, binding them to this text and sorting them.
    pub fn with_mentions(mut self, mentions: impl IntoIterator<Item = Mention>) -> Self {
        self.mentions = mentions.into_iter().map(|m| self.bind(m)).collect();
        sort_mentions(&mut self.mentions);
        self
    }

    /// Insert one mention at its sorted position, after any equal-ordered ones.
    pub fn add_mention(&mut self, mention: Mention) {
        let mention = self.bind(mention);
        let at = self
            .mentions
            .partition_point(|m| m.boundary_cmp(&mention) != std::cmp::Ordering::Greater);
        self.mentions.insert(at, mention);
    }

    fn bind(&self, mut mention: Mention) -> Mention {
        mention.span = mention.span.with_text(Arc::clone(&self.text));
        mention.essential = mention
            .essential
            .map(|e| e.with_text(Arc::clone(&self.text)));
        mention
    }

    /// The document text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Shared handle on the document text.
    pub fn text_arc(&self) -> &Arc<str> {
        &self.text
    }

    /// Text length in characters.
    pub fn text_len(&self) -> Offset {
        self.text_len
    }

    /// Mentions in boundary order.
    pub fn mentions(&self) -> &[Mention] {
        &self.mentions
    }

    /// Keep only mentions whose label passes `keep`.
    pub fn filter_entities<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(Option<&str>) -> bool,
    {
        let mut doc = self.clone();
        doc.mentions.retain(|m| keep(m.entity()));
        doc
    }

    /// Drop mentions labelled with one of the `nil` placeholders.
    ///
    /// Unlabelled mentions are kept.
    pub fn without_entities(&self, nil: &BTreeSet<String>) -> Self {
        self.filter_entities(|entity| entity.map_or(true, |e| !nil.contains(e)))
    }

    /// Replace every mention by its essential form and re-sort.
    pub fn essential_mentions(&self) -> Self {
        let mut doc = self.clone();
        doc.mentions = self.mentions.iter().map(Mention::essential_mention).collect();
        sort_mentions(&mut doc.mentions);
        doc
    }

    /// Move all mentions onto `dest_text`.
    ///
    /// Mentions whose start or end becomes negative are dropped. Ranges that
    /// run past the end of the new text are kept for the caller to inspect.
    pub fn realign_to(&self, dest_text: impl Into<Arc<str>>) -> Self {
        let aligner = TextAligner::new(&self.text, dest_text);
        let realigned = aligner.align_all(&self.mentions);

        let before = realigned.len();
        let kept: Vec<Mention> = realigned
            .into_iter()
            .filter(|m| {
                let keep = m.start() >= 0 && m.end() >= 0;
                if !keep {
                    tracing::debug!(
                        document_id = %self.id,
                        start = m.start(),
                        end = m.end(),
                        entity = ?m.entity(),
                        "Dropping mention that fell outside the new text"
                    );
                }
                keep
            })
            .collect();

        if kept.len() < before {
            tracing::info!(
                document_id = %self.id,
                dropped = before - kept.len(),
                kept = kept.len(),
                "Realigned mentions with losses"
            );
        }

        let mut doc = AnnotatedText::new(self.id.clone(), Arc::clone(aligner.dest())).with_mentions(kept);
        doc.attributes = self.attributes.clone();
        doc
    }

    /// SHA-256 hex of the text.
    pub fn text_hash(&self) -> String {
        text_fingerprint(&self.text)
    }

    /// Structural hash of id, text and mentions.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(self)
    }
}
