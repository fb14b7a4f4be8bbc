//! Render job registry
//!
//! Jobs live in memory for the lifetime of the process. Each job moves
//! strictly forward, `queued -> running -> succeeded | failed`, and is
//! executed by exactly one worker drawn from a bounded pool.

use chrono::{DateTime, Utc};
use clockchain_graph::{
    slugify, url, ContentRef, GraphStore, Layer, NodeDraft, NodeUpdate, PathFields, Visibility,
    DEFAULT_TIME,
};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::JobConfig;
use crate::error::{Result, ServerError};
use crate::providers::{
    ModerationProvider, ProviderError, RenderRequest, Rendered, Renderer, RequestContext, Verdict,
};

pub const DEFAULT_PRESET: &str = "balanced";

/// Longest description kept from a render summary
const SUMMARY_LIMIT: usize = 200;

const TIME_OF_DAY: [(&str, &str); 14] = [
    ("dawn", "0600"),
    ("early morning", "0700"),
    ("morning", "0900"),
    ("late morning", "1100"),
    ("midday", "1200"),
    ("noon", "1200"),
    ("early afternoon", "1300"),
    ("afternoon", "1400"),
    ("late afternoon", "1600"),
    ("evening", "1800"),
    ("dusk", "1900"),
    ("night", "2100"),
    ("late night", "2300"),
    ("midnight", "0000"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Only the single forward step out of each state is allowed
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

/// Inputs of a render job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobParams {
    pub query: String,
    pub preset: String,
    /// Visibility of a node created from the render
    pub visibility: Visibility,
    pub requested_by: Option<String>,
    /// Set when moderation classified the query as sensitive
    pub disclaimer: bool,
}

impl JobParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            preset: DEFAULT_PRESET.to_string(),
            visibility: Visibility::Draft,
            requested_by: None,
            disclaimer: false,
        }
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn requested_by(mut self, who: impl Into<String>) -> Self {
        self.requested_by = Some(who.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    #[serde(rename = "job_id")]
    pub id: String,
    pub status: JobStatus,
    /// Node the content belongs to; set on success for query jobs
    pub target: Option<String>,
    pub params: JobParams,
    pub content: Option<ContentRef>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Job registry and worker pool
pub struct JobManager {
    store: Arc<GraphStore>,
    renderer: Arc<dyn Renderer>,
    moderation: Option<Arc<dyn ModerationProvider>>,
    jobs: DashMap<String, Job>,
    permits: Semaphore,
    config: JobConfig,
}

impl JobManager {
    pub fn new(store: Arc<GraphStore>, renderer: Arc<dyn Renderer>, config: JobConfig) -> Self {
        Self {
            store,
            renderer,
            moderation: None,
            jobs: DashMap::new(),
            permits: Semaphore::new(config.max_concurrent.max(1)),
            config,
        }
    }

    /// Screen user-initiated submissions through a moderation provider
    pub fn with_moderation(mut self, moderation: Arc<dyn ModerationProvider>) -> Self {
        self.moderation = Some(moderation);
        self
    }

    /// Render content for an existing node
    pub fn submit(self: &Arc<Self>, node_id: &str, params: JobParams) -> Result<String> {
        if !self.store.contains(node_id) {
            return Err(clockchain_graph::GraphError::not_found(node_id).into());
        }
        let id = self.enqueue(Some(node_id.to_string()), params);
        self.spawn(id.clone());
        Ok(id)
    }

    /// Render from a free-text query; the node is created from the render
    pub fn submit_query(self: &Arc<Self>, params: JobParams) -> Result<String> {
        if params.query.trim().is_empty() {
            return Err(ServerError::invalid_input("query must not be empty"));
        }
        let id = self.enqueue(None, params);
        self.spawn(id.clone());
        Ok(id)
    }

    /// Moderate a user query, then submit it
    ///
    /// A rejected query never gets a job record. A provider failure blocks
    /// the submission as well.
    pub async fn submit_moderated(
        self: &Arc<Self>,
        target: Option<&str>,
        mut params: JobParams,
    ) -> Result<String> {
        if target.is_none() && params.query.trim().is_empty() {
            return Err(ServerError::invalid_input("query must not be empty"));
        }
        if let Some(target) = target {
            if !self.store.contains(target) {
                return Err(clockchain_graph::GraphError::not_found(target).into());
            }
        }

        if let Some(moderation) = &self.moderation {
            let classified =
                tokio::time::timeout(self.config.provider_timeout, moderation.classify(&params.query))
                    .await
                    .map_err(|_| ProviderError::Timeout)
                    .and_then(|r| r);
            let outcome = match classified {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("Moderation failed for {:?}: {}", params.query, e);
                    return Err(e.into());
                }
            };

            match outcome.verdict {
                Verdict::Reject => {
                    tracing::info!("Rejected query {:?}: {}", params.query, outcome.reason);
                    return Err(ServerError::ModerationRejected {
                        reason: outcome.reason,
                    });
                }
                Verdict::Sensitive => params.disclaimer = true,
                Verdict::Approve => {}
            }
        }

        match target {
            Some(target) => self.submit(target, params),
            None => self.submit_query(params),
        }
    }

    /// Snapshot of a job; never waits on a worker
    pub fn get(&self, job_id: &str) -> Result<Job> {
        self.jobs
            .get(job_id)
            .map(|j| j.clone())
            .ok_or_else(|| ServerError::JobNotFound(job_id.to_string()))
    }

    /// Whether `node_id` has a queued or running job
    pub fn has_active_job_for(&self, node_id: &str) -> bool {
        self.jobs
            .iter()
            .any(|j| j.status.is_active() && j.target.as_deref() == Some(node_id))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn enqueue(&self, target: Option<String>, params: JobParams) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let job = Job {
            id: id.clone(),
            status: JobStatus::Queued,
            target,
            params,
            content: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.jobs.insert(id.clone(), job);
        tracing::info!("Job {} queued", id);
        id
    }

    fn spawn(self: &Arc<Self>, job_id: String) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run(&job_id).await;
        });
    }

    /// Apply a forward transition; false if the job is missing or the step is illegal
    fn advance(&self, job_id: &str, next: JobStatus, update: impl FnOnce(&mut Job)) -> bool {
        let Some(mut job) = self.jobs.get_mut(job_id) else {
            return false;
        };
        if !job.status.can_advance_to(next) {
            tracing::warn!(
                "Job {} cannot move from {:?} to {:?}",
                job_id,
                job.status,
                next
            );
            return false;
        }
        job.status = next;
        match next {
            JobStatus::Running => job.started_at = Some(Utc::now()),
            JobStatus::Succeeded | JobStatus::Failed => job.completed_at = Some(Utc::now()),
            JobStatus::Queued => {}
        }
        update(&mut job);
        true
    }

    /// Execute a queued job to a terminal state
    ///
    /// Claiming the job (`queued -> running`) happens once; a second call for
    /// the same id returns without touching it.
    pub async fn run(&self, job_id: &str) {
        let Ok(_permit) = self.permits.acquire().await else {
            return;
        };
        if !self.advance(job_id, JobStatus::Running, |_| {}) {
            return;
        }
        let Ok(job) = self.get(job_id) else {
            return;
        };
        tracing::info!("Job {} running: {:?}", job.id, job.params.query);

        let request = RenderRequest {
            query: job.params.query.clone(),
            preset: job.params.preset.clone(),
            request_context: RequestContext::for_job(&job.id),
        };
        let rendered = tokio::time::timeout(self.config.provider_timeout, self.renderer.render(request))
            .await
            .map_err(|_| ProviderError::Timeout)
            .and_then(|r| r);

        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(e) => {
                self.fail(job_id, e.to_string());
                return;
            }
        };

        match &job.target {
            Some(target) => self.complete_existing(&job, target, rendered),
            None => self.complete_query(&job, rendered),
        }
    }

    fn fail(&self, job_id: &str, error: String) {
        tracing::error!("Job {} failed: {}", job_id, error);
        self.advance(job_id, JobStatus::Failed, |j| j.error = Some(error));
    }

    fn complete_existing(&self, job: &Job, target: &str, rendered: Rendered) {
        let content = content_ref(&rendered);
        let stored = content.clone();
        self.advance(&job.id, JobStatus::Succeeded, |j| j.content = Some(stored));
        tracing::info!("Job {} succeeded for {}", job.id, target);

        let update = NodeUpdate {
            layer: Some(Layer::Rendered),
            content: Some(content),
            disclaimer: job.params.disclaimer.then_some(true),
            ..Default::default()
        };
        if let Err(e) = self.store.update_node(target, update) {
            tracing::error!(
                "Job {} succeeded but writing content to {} failed: {}",
                job.id,
                target,
                e
            );
        }
    }

    fn complete_query(&self, job: &Job, rendered: Rendered) {
        let draft = match draft_from_render(&job.params, &rendered) {
            Ok(draft) => draft,
            Err(e) => {
                self.fail(&job.id, format!("render metadata is not addressable: {}", e));
                return;
            }
        };
        let Ok(node_id) = draft.id() else {
            self.fail(&job.id, "render metadata is not addressable".to_string());
            return;
        };

        let content = content_ref(&rendered);
        let target = node_id.clone();
        self.advance(&job.id, JobStatus::Succeeded, |j| {
            j.target = Some(target);
            j.content = Some(content);
        });
        tracing::info!("Job {} succeeded: {}", job.id, node_id);

        if let Err(e) = self.store.add_node(draft) {
            tracing::error!(
                "Job {} succeeded but creating {} failed: {}",
                job.id,
                node_id,
                e
            );
        }
    }
}

fn content_ref(rendered: &Rendered) -> ContentRef {
    ContentRef {
        render_id: rendered.render_id.clone(),
        slug: rendered.slug.clone(),
        share_url: rendered.share_url.clone(),
    }
}

/// HHMM for a time-of-day phrase, noon when unknown
pub fn time_of_day_to_time(phrase: Option<&str>) -> String {
    let Some(phrase) = phrase else {
        return DEFAULT_TIME.to_string();
    };
    let phrase = phrase.trim().to_lowercase();
    TIME_OF_DAY
        .iter()
        .find(|(name, _)| *name == phrase)
        .map(|(_, time)| time.to_string())
        .unwrap_or_else(|| DEFAULT_TIME.to_string())
}

/// Split `city, ..., region, country` into kebab-case `(country, region, city)`
///
/// Missing parts are filled from the city.
pub fn parse_location(location: &str) -> (String, String, String) {
    let parts: Vec<String> = location
        .split(',')
        .map(slugify)
        .filter(|p| !p.is_empty())
        .collect();

    match parts.as_slice() {
        [] => ("unknown".into(), "unknown".into(), "unknown".into()),
        [city] => (city.clone(), city.clone(), city.clone()),
        [city, country] => (country.clone(), city.clone(), city.clone()),
        [city, .., region, country] => (country.clone(), region.clone(), city.clone()),
    }
}

/// Map renderer metadata onto a layer 2 node draft
pub fn draft_from_render(
    params: &JobParams,
    rendered: &Rendered,
) -> clockchain_graph::Result<NodeDraft> {
    let meta = &rendered.metadata;
    let name = meta
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| params.query.trim().to_string());

    let month = match &meta.month {
        Some(m) => m.number()?,
        None => 1,
    };
    let day = meta.day.filter(|d| *d > 0).unwrap_or(1);
    let (country, region, city) = parse_location(meta.location.as_deref().unwrap_or(""));

    let slug_source = if rendered.slug.is_empty() {
        name.as_str()
    } else {
        rendered.slug.as_str()
    };

    let fields = PathFields {
        year: meta.year.unwrap_or(0),
        month,
        day,
        time: time_of_day_to_time(meta.time_of_day.as_deref()),
        country,
        region,
        city,
        slug: slugify(slug_source),
    };
    url::encode(&fields)?;

    let description: String = meta
        .summary
        .clone()
        .unwrap_or_else(|| params.query.clone())
        .chars()
        .take(SUMMARY_LIMIT)
        .collect();

    Ok(NodeDraft {
        fields,
        attrs: NodeUpdate {
            name: Some(name),
            description: Some(description),
            tags: Some(meta.tags.iter().cloned().collect::<BTreeSet<_>>()),
            figures: Some(meta.figures.iter().cloned().collect::<BTreeSet<_>>()),
            layer: Some(Layer::Rendered),
            visibility: Some(params.visibility),
            created_by: Some(
                params
                    .requested_by
                    .clone()
                    .unwrap_or_else(|| "system".to_string()),
            ),
            content: Some(content_ref(rendered)),
            era: meta.era.clone(),
            disclaimer: Some(params.disclaimer),
            ..Default::default()
        },
    })
}
