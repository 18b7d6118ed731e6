//! Deterministic query expansion.
//!
//! Pure function of the query and the configured synonym table: the same
//! input always yields the same variant list, in the same order.

use super::{is_content_word, normalize, QueryExpander, Variant, VariantKind};
use crate::error::{KilnsError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Rule-based expander; the required fallback for every configuration.
pub struct DeterministicExpander {
    synonyms: HashMap<String, Vec<String>>,
    max_phrase_variants: usize,
    quoted: Regex,
}

impl DeterministicExpander {
    pub fn new(synonyms: HashMap<String, Vec<String>>, max_phrase_variants: usize) -> Self {
        Self {
            synonyms,
            max_phrase_variants,
            quoted: Regex::new(r#""([^"]+)""#).expect("quoted-phrase pattern is valid"),
        }
    }

    /// Steps 1-5: exact phrase, quoted sub-phrases, adjacent word
    /// pairs/triples, then significant single words by decreasing length.
    fn base_variants(&self, query: &str) -> Result<Vec<Variant>> {
        let full = normalize(query);
        if full.is_empty() {
            return Err(KilnsError::Validation("Empty query".to_string()));
        }

        let mut variants = vec![Variant::new(full.clone(), VariantKind::Exact)];

        for cap in self.quoted.captures_iter(query) {
            let phrase = normalize(&cap[1]);
            if !phrase.is_empty() {
                variants.push(Variant::new(phrase, VariantKind::Quoted));
            }
        }

        let words: Vec<&str> = full.split(' ').filter(|w| is_content_word(w)).collect();

        // Adjacent trigrams and bigrams over the content words, ranked by
        // total character length as an information proxy.
        let mut phrases: Vec<(usize, usize, String)> = Vec::new();
        for width in [3, 2] {
            for (pos, w) in words.windows(width).enumerate() {
                phrases.push((w.iter().map(|s| s.len()).sum(), pos, w.join(" ")));
            }
        }
        phrases.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        for (_, _, text) in phrases.into_iter().take(self.max_phrase_variants) {
            variants.push(Variant::new(text, VariantKind::Phrase));
        }

        let mut singles: Vec<(usize, usize, &str)> = words
            .iter()
            .enumerate()
            .map(|(pos, w)| (w.len(), pos, *w))
            .collect();
        singles.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        for (_, _, word) in singles {
            variants.push(Variant::new(word, VariantKind::Word));
        }

        Ok(variants)
    }

    /// Step 6: append synonym substitutions immediately after each source
    /// variant so a synonym never outranks the variant it came from.
    fn apply_synonyms(&self, base: Vec<Variant>) -> Vec<Variant> {
        let mut out = Vec::with_capacity(base.len());
        for variant in base {
            let words: Vec<&str> = variant.text.split(' ').collect();
            let mut subs = Vec::new();
            for (i, word) in words.iter().enumerate() {
                if let Some(alternatives) = self.synonyms.get(*word) {
                    for alt in alternatives {
                        let alt = normalize(alt);
                        if alt.is_empty() || alt == *word {
                            continue;
                        }
                        let mut replaced = words.clone();
                        replaced[i] = &alt;
                        subs.push(Variant::new(replaced.join(" "), VariantKind::Synonym));
                    }
                }
            }
            out.push(variant);
            out.extend(subs);
        }
        out
    }

    fn dedup(variants: Vec<Variant>) -> Vec<Variant> {
        let mut seen = HashSet::new();
        variants
            .into_iter()
            .filter(|v| seen.insert(v.text.clone()))
            .collect()
    }
}

#[async_trait]
impl QueryExpander for DeterministicExpander {
    async fn expand(&self, query: &str) -> Result<Vec<Variant>> {
        let base = self.base_variants(query)?;
        Ok(Self::dedup(self.apply_synonyms(base)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expander() -> DeterministicExpander {
        DeterministicExpander::new(HashMap::new(), 4)
    }

    fn expander_with_synonyms() -> DeterministicExpander {
        let mut synonyms = HashMap::new();
        synonyms.insert(
            "narnia".to_string(),
            vec!["narnea".to_string(), "narnya".to_string()],
        );
        DeterministicExpander::new(synonyms, 4)
    }

    fn texts(variants: &[Variant]) -> Vec<&str> {
        variants.iter().map(|v| v.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_rejects_empty_query() {
        for query in ["", "   ", "..,!"] {
            let err = expander().expand(query).await.unwrap_err();
            assert!(matches!(err, KilnsError::Validation(_)), "{:?}", query);
        }
    }

    #[tokio::test]
    async fn test_exact_phrase_comes_first() {
        let variants = expander()
            .expand("Lewis discusses medieval literature")
            .await
            .unwrap();
        assert_eq!(variants[0].text, "lewis discusses medieval literature");
        assert_eq!(variants[0].kind, VariantKind::Exact);
    }

    #[tokio::test]
    async fn test_quoted_phrases_follow_exact() {
        let variants = expander()
            .expand("letters about \"mother Kirk\" and doubt")
            .await
            .unwrap();
        assert_eq!(variants[1].text, "mother kirk");
        assert_eq!(variants[1].kind, VariantKind::Quoted);
    }

    #[tokio::test]
    async fn test_phrase_variants_preserve_word_order() {
        let variants = expander()
            .expand("medieval literature tutor")
            .await
            .unwrap();
        let texts = texts(&variants);
        assert!(texts.contains(&"medieval literature tutor"));
        assert!(texts.contains(&"medieval literature"));
        assert!(texts.contains(&"literature tutor"));
        assert!(!texts.contains(&"literature medieval"));
    }

    #[tokio::test]
    async fn test_single_words_ordered_by_length() {
        let variants = expander().expand("the tutor of literature").await.unwrap();
        let words: Vec<&str> = variants
            .iter()
            .filter(|v| v.kind == VariantKind::Word)
            .map(|v| v.text.as_str())
            .collect();
        assert_eq!(words, vec!["literature", "tutor"]);
    }

    #[tokio::test]
    async fn test_stop_words_dropped_from_fallbacks() {
        let variants = expander().expand("joy in the morning").await.unwrap();
        let words: Vec<&str> = variants
            .iter()
            .filter(|v| v.kind == VariantKind::Word)
            .map(|v| v.text.as_str())
            .collect();
        assert_eq!(words, vec!["morning", "joy"]);
    }

    #[tokio::test]
    async fn test_synonyms_follow_their_source() {
        let variants = expander_with_synonyms().expand("narnia").await.unwrap();
        let texts = texts(&variants);
        assert_eq!(texts, vec!["narnia", "narnea", "narnya"]);
        assert_eq!(variants[1].kind, VariantKind::Synonym);
    }

    #[tokio::test]
    async fn test_synonyms_substitute_inside_phrases() {
        let variants = expander_with_synonyms()
            .expand("return to narnia")
            .await
            .unwrap();
        let texts = texts(&variants);
        let exact = texts.iter().position(|t| *t == "return to narnia").unwrap();
        let syn = texts.iter().position(|t| *t == "return to narnea").unwrap();
        assert_eq!(syn, exact + 1);
    }

    #[tokio::test]
    async fn test_output_is_deduplicated() {
        let variants = expander().expand("narnia narnia").await.unwrap();
        let texts = texts(&variants);
        let mut sorted = texts.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(texts.len(), sorted.len());
    }

    #[tokio::test]
    async fn test_expansion_is_pure() {
        let exp = expander_with_synonyms();
        let query = "Lewis and the \"problem of pain\" in wartime";
        let first = exp.expand(query).await.unwrap();
        let second = exp.expand(query).await.unwrap();
        assert_eq!(first, second);
    }
}
