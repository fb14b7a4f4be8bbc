//! Backend wiring
//!
//! Owns the graph store and whichever provider-backed components the
//! configuration enables. Tool handlers reach everything through here.

use clockchain_graph::GraphStore;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::{DailyConfig, ExpansionConfig, Settings};
use crate::daily::DailyWorker;
use crate::error::{Result, ServerError};
use crate::expander::GraphExpander;
use crate::jobs::JobManager;
use crate::providers::{FlashClient, ModerationProvider, OpenRouterClient, SuggestionProvider};

pub struct Backend {
    store: Arc<GraphStore>,
    jobs: Option<Arc<JobManager>>,
    expander: Option<Arc<GraphExpander>>,
    admin_key: Option<String>,
}

impl Backend {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self {
            store,
            jobs: None,
            expander: None,
            admin_key: None,
        }
    }

    pub fn with_jobs(mut self, jobs: Arc<JobManager>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn with_expander(mut self, expander: Arc<GraphExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn with_admin_key(mut self, key: impl Into<String>) -> Self {
        self.admin_key = Some(key.into()).filter(|k| !k.is_empty());
        self
    }

    /// Open the store, seed it if empty, and build the configured providers
    ///
    /// Rendering needs a scene-service URL. Suggestions and moderation need
    /// an OpenRouter key; without one, submissions go unscreened.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = Arc::new(GraphStore::open(&settings.data_dir)?);
        tracing::info!(
            "Opened store at {} ({} nodes, {} edges)",
            settings.data_dir.display(),
            store.node_count(),
            store.edge_count()
        );

        if let Some(seed_file) = &settings.seed_file {
            if let Some(report) = store.seed_if_empty(seed_file)? {
                tracing::info!(
                    "Seeded {} nodes and {} edges ({} nodes skipped)",
                    report.nodes_created,
                    report.edges_created,
                    report.nodes_skipped
                );
            }
        }

        let timeout = settings.provider_timeout();
        let openrouter = match &settings.openrouter_api_key {
            Some(key) if !key.is_empty() => Some(Arc::new(OpenRouterClient::new(
                &settings.openrouter_url,
                key,
                &settings.openrouter_model,
                timeout,
            )?)),
            _ => {
                tracing::warn!("OPENROUTER_API_KEY not set; expansion and moderation disabled");
                None
            }
        };

        let mut backend = Self::new(store.clone());
        if let Some(key) = &settings.admin_key {
            backend = backend.with_admin_key(key.as_str());
        }

        match &settings.flash_url {
            Some(url) if !url.is_empty() => {
                let key = settings.flash_service_key.clone().unwrap_or_default();
                let renderer = Arc::new(FlashClient::new(url, key, timeout)?);
                let mut jobs = JobManager::new(store.clone(), renderer, settings.jobs());
                if let Some(client) = &openrouter {
                    let moderation: Arc<dyn ModerationProvider> = client.clone();
                    jobs = jobs.with_moderation(moderation);
                }
                backend = backend.with_jobs(Arc::new(jobs));
            }
            _ => tracing::warn!("FLASH_URL not set; render jobs disabled"),
        }

        if let Some(client) = openrouter {
            let suggestions: Arc<dyn SuggestionProvider> = client;
            backend = backend.with_expander(Arc::new(GraphExpander::new(
                store,
                suggestions,
                settings.expansion(),
                timeout,
            )));
        }

        Ok(backend)
    }

    /// Spawn the periodic loops that are both enabled and possible
    pub fn start_loops(
        &self,
        expansion: &ExpansionConfig,
        daily: &DailyConfig,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        match (&self.expander, expansion.enabled) {
            (Some(expander), true) => handles.push(Arc::clone(expander).start()),
            (None, true) => tracing::warn!("Expansion enabled but no suggestion provider"),
            _ => {}
        }

        match (&self.jobs, daily.enabled) {
            (Some(jobs), true) => {
                let worker = DailyWorker::new(self.store.clone(), jobs.clone(), daily.clone());
                handles.push(Arc::new(worker).start());
            }
            (None, true) => tracing::warn!("Daily loop enabled but no renderer"),
            _ => {}
        }

        handles
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn jobs(&self) -> Result<&Arc<JobManager>> {
        self.jobs
            .as_ref()
            .ok_or_else(|| ServerError::Config("no renderer configured".to_string()))
    }

    pub fn expander(&self) -> Result<&Arc<GraphExpander>> {
        self.expander
            .as_ref()
            .ok_or_else(|| ServerError::Config("no suggestion provider configured".to_string()))
    }

    /// Gate for privileged tools; refused outright when no admin key is configured
    pub fn check_admin(&self, supplied: Option<&str>) -> Result<()> {
        match (&self.admin_key, supplied) {
            (Some(expected), Some(given)) if expected == given => Ok(()),
            _ => Err(ServerError::Forbidden("admin key required".to_string())),
        }
    }

    pub fn expander_opt(&self) -> Option<&Arc<GraphExpander>> {
        self.expander.as_ref()
    }
}
