//! Today-in-history render loop
//!
//! Once per period, public moments that fall on the current UTC month/day
//! and have no rendered content yet are ranked and the top few submitted
//! as render jobs.

use chrono::{Datelike, NaiveDate, Utc};
use clockchain_graph::{GraphStore, Layer, Node, Visibility};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::DailyConfig;
use crate::jobs::{JobManager, JobParams, DEFAULT_PRESET};

pub struct DailyWorker {
    store: Arc<GraphStore>,
    jobs: Arc<JobManager>,
    config: DailyConfig,
}

impl DailyWorker {
    pub fn new(store: Arc<GraphStore>, jobs: Arc<JobManager>, config: DailyConfig) -> Self {
        Self {
            store,
            jobs,
            config,
        }
    }

    /// Public, unrendered moments on `date` without an active job, best first
    pub fn candidates(&self, date: NaiveDate) -> Vec<Node> {
        let events = self
            .store
            .today_in_history(date.month() as u8, date.day() as u8);
        tracing::info!(
            "Today in history ({}/{}): {} events found",
            date.month(),
            date.day(),
            events.len()
        );

        let mut ranked: Vec<(usize, Node)> = events
            .into_iter()
            .filter(|n| n.is_public() && !n.has_content() && n.layer < Layer::Rendered)
            .filter(|n| !self.jobs.has_active_job_for(&n.id))
            .map(|n| (self.store.degree(&n.id).unwrap_or(0), n))
            .collect();

        ranked.sort_by(|(deg_a, a), (deg_b, b)| {
            deg_b
                .cmp(deg_a)
                .then_with(|| b.layer.cmp(&a.layer))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.into_iter().map(|(_, n)| n).collect()
    }

    /// Submit render jobs for up to `cap` candidates; returns the job ids
    pub fn run_once_for(&self, date: NaiveDate) -> Vec<String> {
        let mut submitted = Vec::new();
        for node in self.candidates(date).into_iter().take(self.config.cap) {
            let query = format!("{} ({})", node.name, node.year);
            let params = JobParams::new(query.clone())
                .with_preset(DEFAULT_PRESET)
                .with_visibility(Visibility::Public);
            match self.jobs.submit(&node.id, params) {
                Ok(job_id) => {
                    tracing::info!("Daily generation queued: {} (job {})", query, job_id);
                    submitted.push(job_id);
                }
                Err(e) => tracing::warn!("Daily submission for {} failed: {}", node.id, e),
            }
        }
        submitted
    }

    pub fn run_once(&self) -> Vec<String> {
        self.run_once_for(Utc::now().date_naive())
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "Daily worker starting (interval={}s)",
                self.config.interval.as_secs()
            );
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once();
            }
        })
    }
}
