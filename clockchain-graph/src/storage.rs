//! RocksDB-backed graph store
//!
//! Nodes and edges are persisted under prefixed keys with bincode values and
//! mirrored into an in-memory [`GraphIndex`] guarded by a single `RwLock`.
//! Every mutation is written to RocksDB before the in-memory state changes,
//! so a failed write leaves both untouched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use chrono::Utc;
use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};

use crate::edge::{Direction, Edge, EdgeKey, EdgeType, Neighbor};
use crate::error::{GraphError, Result};
use crate::index::GraphIndex;
use crate::node::{Layer, Node, NodeDraft, NodeInput, NodeUpdate, Visibility};
use crate::search::{search_index, SearchConfig, SearchResult};
use crate::url;

pub(crate) const NODE_PREFIX: &str = "node:";
pub(crate) const EDGE_PREFIX: &str = "edge:";

/// Weight of inferred contemporaneous and same-location edges
pub const AUTO_LINK_WEIGHT: f32 = 0.5;
/// Weight of inferred thematic edges
pub const THEMATIC_WEIGHT: f32 = 0.3;

fn node_key(id: &str) -> String {
    format!("{}{}", NODE_PREFIX, id)
}

/// Result of an upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddNodeOutcome {
    pub id: String,
    /// False when an existing node was merged instead
    pub created: bool,
    /// Edges inferred by auto-linking (always 0 on merge)
    pub edges_created: usize,
}

/// One `(segment, count)` pair from a browse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseItem {
    pub segment: String,
    pub count: usize,
}

/// Aggregate counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub layer_counts: BTreeMap<String, usize>,
    pub edge_type_counts: BTreeMap<String, usize>,
    pub visibility_counts: BTreeMap<String, usize>,
}

/// Edge as found in seed files and ingest payloads
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeInput {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", alias = "edge_type", default = "default_edge_type")]
    pub kind: String,
    #[serde(default)]
    pub weight: Option<f32>,
    #[serde(default)]
    pub theme: Option<String>,
}

fn default_edge_type() -> String {
    EdgeType::Thematic.to_string()
}

/// Bulk subgraph payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub nodes: Vec<NodeInput>,
    #[serde(default)]
    pub edges: Vec<EdgeInput>,
}

/// Counts from a bulk ingest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub nodes_created: usize,
    pub nodes_merged: usize,
    pub nodes_skipped: usize,
    pub edges_created: usize,
    pub edges_skipped: usize,
}

/// Persistent spatiotemporal graph
pub struct GraphStore {
    db: DB,
    state: RwLock<GraphIndex>,
}

impl GraphStore {
    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        // Run migration if needed before opening database
        crate::migration::migrate_if_needed(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_background_jobs(2);
        opts.set_bytes_per_sync(1048576); // 1MB
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        crate::migration::ensure_version(&db)?;

        log::info!("GraphStore opened at: {}", path.display());

        let store = Self {
            db,
            state: RwLock::new(GraphIndex::default()),
        };
        store.load_cache()?;
        Ok(store)
    }

    /// Load persisted nodes and edges into memory
    fn load_cache(&self) -> Result<()> {
        let mut state = self.state.write();
        let mut skipped = 0;
        let mut edges = Vec::new();

        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = item?;
            let key_str = String::from_utf8_lossy(&key);

            if let Some(id) = key_str.strip_prefix(NODE_PREFIX) {
                match bincode::deserialize::<Node>(&value) {
                    Ok(node) => state.insert_node(node),
                    Err(e) => {
                        log::warn!("Failed to deserialize node {}: {}. Skipping.", id, e);
                        skipped += 1;
                    }
                }
            } else if key_str.starts_with(EDGE_PREFIX) {
                match bincode::deserialize::<Edge>(&value) {
                    Ok(edge) => edges.push(edge),
                    Err(e) => {
                        log::warn!("Failed to deserialize edge {}: {}. Skipping.", key_str, e);
                        skipped += 1;
                    }
                }
            }
        }

        // Edges after nodes so dangling records can be detected
        for edge in edges {
            if state.contains_node(&edge.source) && state.contains_node(&edge.target) {
                state.insert_edge(edge);
            } else {
                log::warn!(
                    "Edge {} -> {} references a missing node. Skipping.",
                    edge.source,
                    edge.target
                );
                skipped += 1;
            }
        }

        log::info!(
            "Loaded {} nodes and {} edges from disk",
            state.node_count(),
            state.edge_count()
        );
        if skipped > 0 {
            log::warn!("Skipped {} records due to deserialization errors", skipped);
        }
        Ok(())
    }

    /// Insert a node, or merge supplied fields into the existing one
    ///
    /// A new node is auto-linked against every existing node in the same
    /// write: contemporaneous for years at most one apart, same_location for
    /// an identical (country, region, city), thematic for any shared tag.
    /// Merges never re-run auto-linking.
    pub fn add_node(&self, draft: NodeDraft) -> Result<AddNodeOutcome> {
        let now = Utc::now();
        let id = draft.id()?;
        let mut state = self.state.write();

        if let Some(existing) = state.node(&id) {
            let mut merged = existing.clone();
            draft.attrs.apply(&mut merged, now)?;
            self.db
                .put(node_key(&id).as_bytes(), bincode::serialize(&merged)?)?;
            state.insert_node(merged);
            log::debug!("Merged fields into existing node {}", id);
            return Ok(AddNodeOutcome {
                id,
                created: false,
                edges_created: 0,
            });
        }

        let node = draft.into_node(now)?;
        let links = infer_links(&state, &node);

        let mut batch = WriteBatch::default();
        batch.put(node_key(&id).as_bytes(), bincode::serialize(&node)?);
        for edge in &links {
            batch.put(edge.key().storage_key().as_bytes(), bincode::serialize(edge)?);
        }
        self.db.write(batch)?;

        let edges_created = links.len();
        state.insert_node(node);
        for edge in links {
            state.insert_edge(edge);
        }

        log::debug!("Created node {} with {} inferred edges", id, edges_created);
        Ok(AddNodeOutcome {
            id,
            created: true,
            edges_created,
        })
    }

    /// Merge supplied fields into an existing node
    pub fn update_node(&self, id: &str, update: NodeUpdate) -> Result<Node> {
        let now = Utc::now();
        let mut state = self.state.write();
        let mut node = state
            .node(id)
            .cloned()
            .ok_or_else(|| GraphError::not_found(id))?;

        update.apply(&mut node, now)?;
        self.db
            .put(node_key(id).as_bytes(), bincode::serialize(&node)?)?;
        state.insert_node(node.clone());
        Ok(node)
    }

    /// Flip a node to public
    pub fn publish(&self, id: &str) -> Result<Node> {
        self.update_node(
            id,
            NodeUpdate {
                visibility: Some(Visibility::Public),
                ..Default::default()
            },
        )
    }

    pub fn get_node(&self, id: &str) -> Result<Node> {
        self.state
            .read()
            .node(id)
            .cloned()
            .ok_or_else(|| GraphError::not_found(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().contains_node(id)
    }

    /// Insert an edge; `Ok(false)` if the triple already exists
    pub fn add_edge(&self, edge: Edge) -> Result<bool> {
        if edge.source == edge.target {
            return Err(GraphError::invalid_field(
                "target",
                format!("self-loop on {}", edge.source),
            ));
        }

        let mut state = self.state.write();
        for endpoint in [&edge.source, &edge.target] {
            if !state.contains_node(endpoint) {
                return Err(GraphError::referential(endpoint.as_str()));
            }
        }
        if state.contains_edge(&edge.key()) {
            return Ok(false);
        }

        self.db.put(
            edge.key().storage_key().as_bytes(),
            bincode::serialize(&edge)?,
        )?;
        Ok(state.insert_edge(edge))
    }

    /// Outgoing edges, then incoming, with the far endpoint resolved
    pub fn neighbors(&self, id: &str) -> Result<Vec<Neighbor>> {
        let state = self.state.read();
        if !state.contains_node(id) {
            return Err(GraphError::not_found(id));
        }

        let resolve = |direction: Direction, far: &str, edge: &Edge| Neighbor {
            direction,
            node_id: far.to_string(),
            node_name: state.node(far).map(|n| n.name.clone()).unwrap_or_default(),
            kind: edge.kind,
            weight: edge.weight,
            theme: edge.theme.clone(),
        };

        let mut out: Vec<Neighbor> = state
            .outgoing(id)
            .map(|e| resolve(Direction::Outgoing, &e.target, e))
            .collect();
        out.extend(
            state
                .incoming(id)
                .map(|e| resolve(Direction::Incoming, &e.source, e)),
        );
        Ok(out)
    }

    /// Count of all incident edges
    pub fn degree(&self, id: &str) -> Result<usize> {
        let state = self.state.read();
        if !state.contains_node(id) {
            return Err(GraphError::not_found(id));
        }
        Ok(state.degree(id))
    }

    /// Check a triple, or any type between the pair when `kind` is `None`
    pub fn has_edge(&self, source: &str, target: &str, kind: Option<EdgeType>) -> bool {
        let state = self.state.read();
        match kind {
            Some(kind) => state.contains_edge(&EdgeKey::new(source, target, kind)),
            None => EdgeType::ALL
                .iter()
                .any(|k| state.contains_edge(&EdgeKey::new(source, target, *k))),
        }
    }

    pub fn search(&self, query: &str, config: &SearchConfig) -> Vec<SearchResult> {
        search_index(&self.state.read(), query, config)
    }

    /// Public nodes grouped by the next path segment after `prefix`
    pub fn browse(&self, prefix: &str) -> Result<Vec<BrowseItem>> {
        let wanted = url::decode_partial(prefix)?.segments();
        let depth = wanted.len();
        let state = self.state.read();

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for id in state.public_ids() {
            let segments: Vec<&str> = id.trim_matches('/').split('/').collect();
            if segments.len() <= depth {
                continue;
            }
            if segments.iter().zip(&wanted).all(|(have, want)| *have == want) {
                *counts.entry(segments[depth].to_string()).or_insert(0) += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(segment, count)| BrowseItem { segment, count })
            .collect())
    }

    /// Ids with total degree strictly below `threshold`, ascending
    pub fn frontier(&self, threshold: usize) -> Vec<String> {
        let state = self.state.read();
        state
            .nodes()
            .filter(|n| state.degree(&n.id) < threshold)
            .map(|n| n.id.clone())
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        let state = self.state.read();
        let mut stats = GraphStats {
            total_nodes: state.node_count(),
            total_edges: state.edge_count(),
            ..Default::default()
        };
        for node in state.nodes() {
            *stats
                .layer_counts
                .entry(node.layer.to_string())
                .or_insert(0) += 1;
            *stats
                .visibility_counts
                .entry(node.visibility.to_string())
                .or_insert(0) += 1;
        }
        for edge in state.edges() {
            *stats
                .edge_type_counts
                .entry(edge.kind.to_string())
                .or_insert(0) += 1;
        }
        stats
    }

    /// Public nodes on a month number and day, ascending by id
    pub fn today_in_history(&self, month: u8, day: u8) -> Vec<Node> {
        let state = self.state.read();
        let ids: BTreeSet<&String> = state.on_month_day(month, day).collect();
        ids.into_iter()
            .filter_map(|id| state.node(id))
            .filter(|n| n.is_public())
            .cloned()
            .collect()
    }

    /// One uniformly chosen public node at layer 1 or above
    pub fn random_public(&self) -> Option<Node> {
        let state = self.state.read();
        state
            .public_ids()
            .filter_map(|id| state.node(id))
            .filter(|n| n.layer >= Layer::Enriched)
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    /// Bulk ingest; bad nodes and edges are skipped and counted
    pub fn ingest(&self, nodes: Vec<NodeInput>, edges: Vec<EdgeInput>) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for input in nodes {
            match input.into_draft().and_then(|d| self.add_node(d)) {
                Ok(outcome) if outcome.created => report.nodes_created += 1,
                Ok(_) => report.nodes_merged += 1,
                Err(e) if e.is_validation() => {
                    log::warn!("Skipping ingested node: {}", e);
                    report.nodes_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        for input in edges {
            let kind = match input.kind.parse::<EdgeType>() {
                Ok(kind) => kind,
                Err(e) => {
                    log::warn!("Skipping ingested edge {} -> {}: {}", input.source, input.target, e);
                    report.edges_skipped += 1;
                    continue;
                }
            };
            let mut edge = Edge::new(input.source, input.target, kind)
                .with_weight(input.weight.unwrap_or(1.0));
            edge.theme = input.theme.filter(|t| !t.is_empty());

            match self.add_edge(edge) {
                Ok(true) => report.edges_created += 1,
                Ok(false) => {}
                Err(e) if e.is_validation() => {
                    log::warn!("Skipping ingested edge: {}", e);
                    report.edges_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        log::info!(
            "Ingested {} new nodes, {} merged, {} edges ({} nodes and {} edges skipped)",
            report.nodes_created,
            report.nodes_merged,
            report.edges_created,
            report.nodes_skipped,
            report.edges_skipped
        );
        Ok(report)
    }

    /// Load a seed file into an empty store; `None` when nothing was loaded
    pub fn seed_if_empty(&self, path: impl AsRef<Path>) -> Result<Option<IngestReport>> {
        let path = path.as_ref();
        let count = self.node_count();
        if count > 0 {
            log::info!("Store already has {} nodes, skipping seed", count);
            return Ok(None);
        }
        if !path.exists() {
            log::warn!("Seed file {} not found, starting empty", path.display());
            return Ok(None);
        }

        log::info!("Seeding empty store from {}", path.display());
        let bytes = std::fs::read(path)?;
        let seeds: SeedFile = serde_json::from_slice(&bytes)?;
        self.ingest(seeds.nodes, seeds.edges).map(Some)
    }

    pub fn node_count(&self) -> usize {
        self.state.read().node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.state.read().edge_count()
    }
}

/// Edges a newly created node gets against the current graph, both directions
fn infer_links(state: &GraphIndex, node: &Node) -> Vec<Edge> {
    let mut candidates: Vec<(&String, EdgeType, f32, Option<String>)> = Vec::new();

    let lo = node.year.saturating_sub(1);
    let hi = node.year.saturating_add(1);
    for other in state.year_range(lo, hi) {
        candidates.push((other, EdgeType::Contemporaneous, AUTO_LINK_WEIGHT, None));
    }

    for other in state.at_location(&node.location_key()) {
        candidates.push((other, EdgeType::SameLocation, AUTO_LINK_WEIGHT, None));
    }

    let mut shared: HashMap<&String, BTreeSet<&str>> = HashMap::new();
    for tag in &node.tags {
        for other in state.with_tag(tag) {
            shared.entry(other).or_default().insert(tag.as_str());
        }
    }
    for (other, tags) in shared {
        let theme = tags.into_iter().collect::<Vec<_>>().join(", ");
        candidates.push((other, EdgeType::Thematic, THEMATIC_WEIGHT, Some(theme)));
    }

    let mut seen: BTreeSet<EdgeKey> = BTreeSet::new();
    let mut links = Vec::new();
    for (other, kind, weight, theme) in candidates {
        if *other == node.id {
            continue;
        }
        for (source, target) in [(&node.id, other), (other, &node.id)] {
            let key = EdgeKey::new(source.as_str(), target.as_str(), kind);
            if state.contains_edge(&key) || !seen.insert(key) {
                continue;
            }
            let mut edge = Edge::new(source.as_str(), target.as_str(), kind).with_weight(weight);
            edge.theme = theme.clone();
            links.push(edge);
        }
    }
    links
}
