//! Scene-rendering service client

use async_trait::async_trait;
use clockchain_graph::MonthValue;
use serde::Deserialize;
use std::time::Duration;

use super::{ProviderError, ProviderResult, RenderMetadata, RenderRequest, Rendered, Renderer};

const GENERATE_SYNC_PATH: &str = "/api/v1/timepoints/generate/sync";

#[derive(Debug, Default, Deserialize)]
struct FlashResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    timepoint_id: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    share_url: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    month: Option<MonthValue>,
    #[serde(default)]
    day: Option<u8>,
    #[serde(default)]
    time_of_day: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    era: Option<String>,
    #[serde(default)]
    grounding: Option<Grounding>,
    #[serde(default)]
    characters: Option<Characters>,
    #[serde(default)]
    moment: Option<Moment>,
}

#[derive(Debug, Default, Deserialize)]
struct Grounding {
    #[serde(default)]
    verified_year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct Characters {
    #[serde(default)]
    characters: Vec<Character>,
}

#[derive(Debug, Default, Deserialize)]
struct Character {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Moment {
    #[serde(default)]
    plot_summary: Option<String>,
}

impl FlashResponse {
    fn into_rendered(self) -> ProviderResult<Rendered> {
        let render_id = self
            .id
            .or(self.timepoint_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::malformed("render response has no id"))?;

        // A grounded year overrides the model's guess
        let year = self
            .grounding
            .and_then(|g| g.verified_year)
            .or(self.year);

        let figures = self
            .characters
            .map(|c| c.characters.into_iter().filter_map(|c| c.name).collect())
            .unwrap_or_default();

        Ok(Rendered {
            render_id,
            slug: self.slug.unwrap_or_default(),
            share_url: self.share_url.unwrap_or_default(),
            metadata: RenderMetadata {
                name: self.name,
                year,
                month: self.month,
                day: self.day,
                time_of_day: self.time_of_day,
                location: self.location,
                tags: self.tags.unwrap_or_default(),
                figures,
                summary: self
                    .moment
                    .and_then(|m| m.plot_summary)
                    .filter(|s| !s.is_empty()),
                era: self.era,
            },
        })
    }
}

/// Synchronous render client
pub struct FlashClient {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl FlashClient {
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        })
    }
}

#[async_trait]
impl Renderer for FlashClient {
    async fn render(&self, request: RenderRequest) -> ProviderResult<Rendered> {
        tracing::info!(
            "Render request for job {}: query={:?} preset={}",
            request.request_context.job_id,
            request.query,
            request.preset
        );

        let url = format!("{}{}", self.base_url, GENERATE_SYNC_PATH);
        let res = self
            .client
            .post(&url)
            .header("X-Service-Key", &self.service_key)
            .json(&request)
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

        let body: FlashResponse = res.json().await?;
        body.into_rendered()
    }
}
