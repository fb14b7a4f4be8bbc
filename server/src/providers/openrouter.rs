//! OpenAI-compatible chat-completions client
//!
//! Serves both growth suggestions and moderation. Replies are plain text
//! that may be wrapped in a Markdown code fence around the JSON payload.

use async_trait::async_trait;
use clockchain_graph::Node;
use serde::Deserialize;
use std::time::Duration;

use super::{
    strip_code_fences, Candidate, Moderation, ModerationProvider, ProviderError, ProviderResult,
    SuggestionProvider, Verdict,
};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";

/// Suggestions beyond this many are ignored
pub const MAX_CANDIDATES: usize = 5;

const EXPANSION_PROMPT: &str = r#"You are a historian. Given this historical event, suggest 3-5 closely related historical events.

Event: {name}
Date: {year}/{month}/{day}
Location: {country}, {region}, {city}
Description: {description}

Return a JSON array of objects, each with:
- "name": event name
- "year": integer (negative for BCE)
- "month": lowercase month name (e.g. "march")
- "day": integer
- "time": 4-digit 24hr string (e.g. "1400")
- "country": lowercase, hyphenated
- "region": lowercase, hyphenated
- "city": lowercase, hyphenated
- "description": one sentence description
- "tags": list of lowercase hyphenated tags
- "figures": list of historical figure names
- "edge_type": one of "causes", "contemporaneous", "same_location", "thematic"

Return ONLY the JSON array, no other text."#;

const MODERATION_PROMPT: &str = r#"You are a content moderation system for a historical education platform.

Evaluate this query for a historical scene generation:
"{query}"

Classify as ONE of:
- "approve": innocuous historical topic, safe to generate
- "sensitive": involves violence, controversy, or mature themes but is historically significant and educational; approve with a disclaimer
- "reject": harmful, hateful, exploitative, or not a genuine historical query

Return ONLY a JSON object: {"verdict": "approve"|"sensitive"|"reject", "reason": "brief explanation"}"#;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawModeration {
    #[serde(default)]
    verdict: String,
    #[serde(default)]
    reason: String,
}

/// Chat-completions client
pub struct OpenRouterClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Send a single user message and return the reply text
    async fn complete(&self, prompt: &str) -> ProviderResult<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let url = format!("{}/chat/completions", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let chat: ChatResponse = res.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::malformed("chat response has no content"))
    }
}

fn expansion_prompt(node: &Node) -> String {
    EXPANSION_PROMPT
        .replace("{name}", &node.name)
        .replace("{year}", &node.year.to_string())
        .replace("{month}", &node.month)
        .replace("{day}", &node.day.to_string())
        .replace("{country}", &node.country)
        .replace("{region}", &node.region)
        .replace("{city}", &node.city)
        .replace("{description}", &node.description)
}

/// Parse a suggestion reply into at most `MAX_CANDIDATES` candidates
pub fn parse_candidates(text: &str) -> ProviderResult<Vec<Candidate>> {
    let mut candidates: Vec<Candidate> = serde_json::from_str(strip_code_fences(text))?;
    if candidates.is_empty() {
        return Err(ProviderError::malformed("no candidates suggested"));
    }
    candidates.truncate(MAX_CANDIDATES);
    Ok(candidates)
}

pub fn parse_moderation(text: &str) -> ProviderResult<Moderation> {
    let raw: RawModeration = serde_json::from_str(strip_code_fences(text))?;
    Ok(Moderation {
        verdict: Verdict::parse(&raw.verdict),
        reason: raw.reason,
    })
}

#[async_trait]
impl SuggestionProvider for OpenRouterClient {
    async fn suggest(&self, node: &Node) -> ProviderResult<Vec<Candidate>> {
        let reply = self.complete(&expansion_prompt(node)).await?;
        parse_candidates(&reply)
    }
}

#[async_trait]
impl ModerationProvider for OpenRouterClient {
    async fn classify(&self, query: &str) -> ProviderResult<Moderation> {
        let reply = self
            .complete(&MODERATION_PROMPT.replace("{query}", query))
            .await?;
        let moderation = parse_moderation(&reply)?;
        tracing::info!(
            "Moderation verdict for {:?}: {:?} ({})",
            query,
            moderation.verdict,
            moderation.reason
        );
        Ok(moderation)
    }
}
