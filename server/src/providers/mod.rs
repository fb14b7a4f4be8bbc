//! External capability providers
//!
//! Growth suggestions, moderation and rendering are reached through async
//! traits so the loops and the job manager run against in-process fakes in
//! tests and against HTTP clients in the binary.

pub mod flash;
pub mod openrouter;

use async_trait::async_trait;
use clockchain_graph::{
    slugify, EdgeType, GraphError, Layer, MonthValue, Node, NodeDraft, NodeUpdate, PathFields,
    Visibility, DEFAULT_TIME,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

pub use flash::FlashClient;
pub use openrouter::OpenRouterClient;

/// Failure talking to an external provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Provider transport error: {0}")]
    Transport(String),

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A related moment proposed by the growth-suggestion provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub year: i32,
    pub month: MonthValue,
    pub day: u8,
    #[serde(default = "default_time")]
    pub time: String,
    pub country: String,
    pub region: String,
    pub city: String,
    #[serde(default, alias = "one_liner")]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub figures: Vec<String>,
    #[serde(default = "default_edge_type")]
    pub edge_type: String,
}

fn default_time() -> String {
    DEFAULT_TIME.to_string()
}

fn default_edge_type() -> String {
    EdgeType::Thematic.to_string()
}

impl Candidate {
    /// Layer 1 public draft, created by `system`
    ///
    /// Fails if any path field would not survive the codec.
    pub fn to_draft(&self) -> Result<NodeDraft, GraphError> {
        let fields = PathFields {
            year: self.year,
            month: self.month.number()?,
            day: self.day,
            time: self.time.clone(),
            country: self.country.clone(),
            region: self.region.clone(),
            city: self.city.clone(),
            slug: slugify(&self.name),
        };
        let draft = NodeDraft {
            fields,
            attrs: NodeUpdate {
                name: Some(self.name.clone()),
                description: Some(self.description.clone()),
                tags: Some(self.tags.iter().cloned().collect::<BTreeSet<_>>()),
                figures: Some(self.figures.iter().cloned().collect::<BTreeSet<_>>()),
                layer: Some(Layer::Enriched),
                visibility: Some(Visibility::Public),
                created_by: Some("system".to_string()),
                ..Default::default()
            },
        };
        draft.id()?;
        Ok(draft)
    }

    pub fn edge_type(&self) -> Result<EdgeType, GraphError> {
        self.edge_type.parse()
    }
}

#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    /// Propose moments related to `node`
    async fn suggest(&self, node: &Node) -> ProviderResult<Vec<Candidate>>;
}

/// Moderation outcome for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approve,
    /// Allowed, but generated content carries a disclaimer
    Sensitive,
    Reject,
}

impl Verdict {
    /// Unrecognized verdicts are treated as `Reject`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "approve" => Self::Approve,
            "sensitive" => Self::Sensitive,
            _ => Self::Reject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Moderation {
    pub verdict: Verdict,
    pub reason: String,
}

#[async_trait]
pub trait ModerationProvider: Send + Sync {
    async fn classify(&self, query: &str) -> ProviderResult<Moderation>;
}

/// Correlation context echoed by the renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub source: String,
    pub worker: String,
    pub job_id: String,
}

impl RequestContext {
    pub fn for_job(job_id: impl Into<String>) -> Self {
        Self {
            source: "clockchain".to_string(),
            worker: "renderer".to_string(),
            job_id: job_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderRequest {
    pub query: String,
    pub preset: String,
    pub request_context: RequestContext,
}

/// Descriptive metadata the renderer returns alongside the content
///
/// Only consulted when a job has no pre-existing target node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderMetadata {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub month: Option<MonthValue>,
    pub day: Option<u8>,
    pub time_of_day: Option<String>,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub figures: Vec<String>,
    pub summary: Option<String>,
    pub era: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendered {
    pub render_id: String,
    pub slug: String,
    pub share_url: String,
    pub metadata: RenderMetadata,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: RenderRequest) -> ProviderResult<Rendered>;
}

/// Strip a surrounding Markdown code fence, with or without a language tag
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate_json() -> &'static str {
        r#"{
            "name": "Apollo 12 Launch",
            "year": 1969,
            "month": "november",
            "day": 14,
            "time": "1622",
            "country": "united-states",
            "region": "florida",
            "city": "cape-canaveral",
            "one_liner": "Second crewed landing mission lifts off",
            "tags": ["space"],
            "figures": ["Pete Conrad"],
            "edge_type": "causes"
        }"#
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("  [2] "), "[2]");
        assert_eq!(strip_code_fences("```[3]```"), "[3]");
    }

    #[test]
    fn test_verdict_parse() {
        assert_eq!(Verdict::parse("approve"), Verdict::Approve);
        assert_eq!(Verdict::parse(" Sensitive "), Verdict::Sensitive);
        assert_eq!(Verdict::parse("reject"), Verdict::Reject);
        assert_eq!(Verdict::parse("maybe"), Verdict::Reject);
    }

    #[test]
    fn test_candidate_to_draft() {
        let candidate: Candidate = serde_json::from_str(candidate_json()).unwrap();
        let draft = candidate.to_draft().unwrap();
        assert_eq!(
            draft.id().unwrap(),
            "/1969/november/14/1622/united-states/florida/cape-canaveral/apollo-12-launch"
        );
        assert_eq!(draft.attrs.layer, Some(Layer::Enriched));
        assert_eq!(draft.attrs.visibility, Some(Visibility::Public));
        assert_eq!(draft.attrs.created_by.as_deref(), Some("system"));
        assert_eq!(candidate.edge_type().unwrap(), EdgeType::Causes);
    }

    #[test]
    fn test_candidate_defaults() {
        let candidate: Candidate = serde_json::from_str(
            r#"{"name":"X","year":1,"month":3,"day":1,"country":"a","region":"b","city":"c"}"#,
        )
        .unwrap();
        assert_eq!(candidate.time, "1200");
        assert_eq!(candidate.edge_type, "thematic");
        assert!(candidate.to_draft().is_ok());
    }

    #[test]
    fn test_candidate_with_bad_fields_fails_codec() {
        let mut candidate: Candidate = serde_json::from_str(candidate_json()).unwrap();
        candidate.city = "Cape Canaveral".into();
        assert!(candidate.to_draft().is_err());

        let mut candidate: Candidate = serde_json::from_str(candidate_json()).unwrap();
        candidate.month = MonthValue::Name("smarch".into());
        assert!(candidate.to_draft().is_err());
    }

    #[test]
    fn test_request_context() {
        let ctx = RequestContext::for_job("job-1");
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"source": "clockchain", "worker": "renderer", "job_id": "job-1"})
        );
    }
}
