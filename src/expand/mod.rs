//! Query expansion for Kilns.
//!
//! Turns one free-text query into an ordered list of search-term variants,
//! from most specific to most general, so the search engine can fall back
//! gracefully when an exact phrase yields too few hits.

mod concept;
mod deterministic;

pub use concept::ConceptExpander;
pub use deterministic::DeterministicExpander;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How a variant was derived from the original query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    /// The full normalized query.
    Exact,
    /// A sub-phrase the caller quoted explicitly.
    Quoted,
    /// An adjacent word pair/triple carved out of the query.
    Phrase,
    /// A single significant word.
    Word,
    /// A synonym substitution of another variant.
    Synonym,
}

impl VariantKind {
    /// Human-readable label for relevance explanations.
    pub fn label(&self) -> &'static str {
        match self {
            VariantKind::Exact => "exact phrase",
            VariantKind::Quoted => "quoted phrase",
            VariantKind::Phrase => "partial phrase",
            VariantKind::Word => "keyword",
            VariantKind::Synonym => "synonym",
        }
    }
}

/// One candidate search string produced by an expander.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub text: String,
    pub kind: VariantKind,
}

impl Variant {
    pub fn new(text: impl Into<String>, kind: VariantKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Trait for query expansion strategies.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    /// Expand a raw query into a deduplicated, priority-ordered variant
    /// list. Empty or whitespace-only input fails with a validation error.
    async fn expand(&self, query: &str) -> Result<Vec<Variant>>;
}

/// Words too common to carry search signal.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has", "have",
    "he", "her", "his", "i", "in", "into", "is", "it", "its", "not", "of", "on", "or", "she",
    "that", "the", "their", "them", "then", "there", "they", "this", "to", "was", "were", "what",
    "when", "where", "which", "who", "will", "with", "you",
];

/// Lowercase, strip punctuation, collapse whitespace.
pub(crate) fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_alphanumeric() || ch == '\'' {
            out.extend(ch.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether a normalized word is worth searching on its own.
pub(crate) fn is_content_word(word: &str) -> bool {
    word.len() > 2 && !STOP_WORDS.contains(&word)
}
