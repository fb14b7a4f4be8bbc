//! Frontier-driven graph growth
//!
//! One cycle picks the lowest-id under-connected node, asks the suggestion
//! provider for related moments, and integrates them as layer 1 public
//! nodes linked back to the frontier node. Scheduled and on-demand cycles
//! share one in-flight lock.

use chrono::{DateTime, Utc};
use clockchain_graph::{Edge, GraphStore, AUTO_LINK_WEIGHT};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ExpansionConfig;
use crate::providers::{ProviderError, SuggestionProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionPhase {
    Idle,
    SelectingFrontier,
    AwaitingSuggestions,
    Integrating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExpansionOutcome {
    /// Nothing under-connected; no provider call was made
    NoFrontier,
    /// Another cycle holds the lock
    InFlight,
    /// Provider failure or invalid suggestions; nothing was written
    Abandoned { reason: String },
    Expanded {
        source: String,
        added_nodes: usize,
        added_edges: usize,
        rejected_edges: usize,
    },
}

/// Resets the phase to idle however the cycle ends
struct PhaseGuard<'a>(&'a RwLock<ExpansionPhase>);

impl<'a> PhaseGuard<'a> {
    fn enter(&self, phase: ExpansionPhase) {
        *self.0.write() = phase;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.0.write() = ExpansionPhase::Idle;
    }
}

pub struct GraphExpander {
    store: Arc<GraphStore>,
    provider: Arc<dyn SuggestionProvider>,
    config: ExpansionConfig,
    timeout: Duration,
    in_flight: Mutex<()>,
    phase: RwLock<ExpansionPhase>,
    last_run: RwLock<Option<DateTime<Utc>>>,
}

impl GraphExpander {
    pub fn new(
        store: Arc<GraphStore>,
        provider: Arc<dyn SuggestionProvider>,
        config: ExpansionConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            timeout,
            in_flight: Mutex::new(()),
            phase: RwLock::new(ExpansionPhase::Idle),
            last_run: RwLock::new(None),
        }
    }

    pub fn phase(&self) -> ExpansionPhase {
        *self.phase.read()
    }

    /// Completion time of the last cycle that got past the lock
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        *self.last_run.read()
    }

    /// Run a single cycle unless one is already in flight
    pub async fn run_once(&self) -> ExpansionOutcome {
        let Ok(_cycle) = self.in_flight.try_lock() else {
            tracing::debug!("Expansion cycle already in flight");
            return ExpansionOutcome::InFlight;
        };

        let outcome = self.cycle().await;
        *self.last_run.write() = Some(Utc::now());

        match &outcome {
            ExpansionOutcome::Expanded {
                source,
                added_nodes,
                added_edges,
                rejected_edges,
            } => tracing::info!(
                "Expansion from {} added {} nodes, {} edges ({} edges rejected)",
                source,
                added_nodes,
                added_edges,
                rejected_edges
            ),
            ExpansionOutcome::Abandoned { reason } => {
                tracing::warn!("Expansion cycle abandoned: {}", reason)
            }
            ExpansionOutcome::NoFrontier => tracing::info!("No frontier nodes to expand"),
            ExpansionOutcome::InFlight => {}
        }
        outcome
    }

    async fn cycle(&self) -> ExpansionOutcome {
        let phase = PhaseGuard(&self.phase);

        phase.enter(ExpansionPhase::SelectingFrontier);
        let frontier = self.store.frontier(self.config.frontier_threshold);
        let Some(source_id) = frontier.into_iter().next() else {
            return ExpansionOutcome::NoFrontier;
        };
        let source = match self.store.get_node(&source_id) {
            Ok(node) => node,
            Err(e) => {
                return ExpansionOutcome::Abandoned {
                    reason: format!("frontier node {} vanished: {}", source_id, e),
                }
            }
        };
        tracing::info!("Expanding from node: {}", source_id);

        phase.enter(ExpansionPhase::AwaitingSuggestions);
        let suggested = tokio::time::timeout(self.timeout, self.provider.suggest(&source))
            .await
            .map_err(|_| ProviderError::Timeout)
            .and_then(|r| r);
        let mut candidates = match suggested {
            Ok(c) if c.is_empty() => {
                return ExpansionOutcome::Abandoned {
                    reason: "provider suggested nothing".to_string(),
                }
            }
            Ok(c) => c,
            Err(e) => {
                return ExpansionOutcome::Abandoned {
                    reason: e.to_string(),
                }
            }
        };
        candidates.truncate(self.config.max_candidates);

        // Validate everything before the first write
        let mut drafts = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            match candidate.to_draft() {
                Ok(draft) => drafts.push(draft),
                Err(e) => {
                    return ExpansionOutcome::Abandoned {
                        reason: format!("invalid candidate {:?}: {}", candidate.name, e),
                    }
                }
            }
        }

        phase.enter(ExpansionPhase::Integrating);
        let mut added_nodes = 0;
        let mut added_edges = 0;
        let mut rejected_edges = 0;

        for (candidate, draft) in candidates.iter().zip(drafts) {
            let id = match draft.id() {
                Ok(id) => id,
                Err(_) => continue,
            };

            // Existing nodes are never downgraded
            if !self.store.contains(&id) {
                match self.store.add_node(draft) {
                    Ok(_) => added_nodes += 1,
                    Err(e) => {
                        tracing::error!("Failed to add suggested node {}: {}", id, e);
                        continue;
                    }
                }
            }

            let kind = match candidate.edge_type() {
                Ok(kind) => kind,
                Err(e) => {
                    tracing::debug!("Rejected edge {} -> {}: {}", source_id, id, e);
                    rejected_edges += 1;
                    continue;
                }
            };
            let edge = Edge::new(source_id.clone(), id.clone(), kind).with_weight(AUTO_LINK_WEIGHT);
            match self.store.add_edge(edge) {
                Ok(true) => added_edges += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!("Rejected edge {} -> {}: {}", source_id, id, e);
                    rejected_edges += 1;
                }
            }
        }

        ExpansionOutcome::Expanded {
            source: source_id,
            added_nodes,
            added_edges,
            rejected_edges,
        }
    }

    /// Run cycles on the configured interval until the task is aborted
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "Graph expander starting (interval={}s)",
                self.config.interval.as_secs()
            );
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
