//! LLM-backed concept expansion.
//!
//! Asks a chat model to restate a conceptual query as concrete phrases and
//! keywords likely to appear in conversational transcripts. Optional
//! strategy; the engine falls back to [`DeterministicExpander`] on any
//! failure or timeout.

use super::{normalize, QueryExpander, Variant, VariantKind};
use crate::error::{KilnsError, Result};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are an expert in C.S. Lewis scholarship helping search \
conversational transcripts of readings from his letters and diaries. Restate conceptual \
queries as concrete search phrases and keywords that would actually be spoken aloud.";

/// Concept-search expander backed by a chat model.
pub struct ConceptExpander {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl ConceptExpander {
    pub fn new(model: &str) -> Self {
        Self {
            client: create_client(),
            model: model.to_string(),
        }
    }

    fn build_prompt(query: &str) -> String {
        format!(
            r#"QUERY: "{}"

Respond with JSON only, in this shape:
{{"phrases": ["short phrase likely to be spoken", "..."], "keywords": ["word1", "word2"]}}

Guidelines:
- phrases: 2-5 short contextual phrases (2-4 words each) describing the situation,
  the emotions involved, or how a narrator would recount it
- keywords: 3-8 single discriminating words; no generic words like "lewis" or "letter"
- cover the scenario, not just its nouns: what is happening, who is involved,
  how it would be told aloud"#,
            query
        )
    }

    /// Parse the model reply, tolerating prose around the JSON object.
    fn parse_reply(reply: &str) -> Result<ConceptReply> {
        let json_start = reply.find('{');
        let json_end = reply.rfind('}');

        let json_str = match (json_start, json_end) {
            (Some(start), Some(end)) if end > start => &reply[start..=end],
            _ => reply,
        };

        serde_json::from_str(json_str).map_err(|e| {
            KilnsError::Expansion(format!(
                "Failed to parse concept reply: {}. Reply was: {}",
                e,
                &reply[..reply.len().min(500)]
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ConceptReply {
    #[serde(default)]
    phrases: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

#[async_trait]
impl QueryExpander for ConceptExpander {
    async fn expand(&self, query: &str) -> Result<Vec<Variant>> {
        let full = normalize(query);
        if full.is_empty() {
            return Err(KilnsError::Validation("Empty query".to_string()));
        }

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()
                .map_err(|e| KilnsError::Expansion(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(Self::build_prompt(query))
                .build()
                .map_err(|e| KilnsError::Expansion(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.3)
            .build()
            .map_err(|e| KilnsError::Expansion(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| KilnsError::OpenAI(format!("Concept expansion error: {}", e)))?;

        let reply = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| KilnsError::Expansion("Empty concept reply".to_string()))?;

        let parsed = Self::parse_reply(&reply)?;
        debug!(
            "Concept expansion produced {} phrases, {} keywords",
            parsed.phrases.len(),
            parsed.keywords.len()
        );

        // The exact query always leads so concept variants can never outrank
        // a literal match.
        let mut seen = HashSet::new();
        let mut variants = Vec::new();
        seen.insert(full.clone());
        variants.push(Variant::new(full, VariantKind::Exact));

        for phrase in parsed.phrases {
            let text = normalize(&phrase);
            if !text.is_empty() && seen.insert(text.clone()) {
                variants.push(Variant::new(text, VariantKind::Phrase));
            }
        }
        for keyword in parsed.keywords {
            let text = normalize(&keyword);
            if !text.is_empty() && seen.insert(text.clone()) {
                variants.push(Variant::new(text, VariantKind::Word));
            }
        }

        Ok(variants)
    }
}
