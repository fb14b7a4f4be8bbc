//! Text search over moments
//!
//! Case-insensitive substring matching over name, description, tags and
//! figures. Each hit scores by its strongest field: name 1.0, description
//! 0.7, tag or figure 0.4.

use serde::{Deserialize, Serialize};

use crate::index::GraphIndex;
use crate::node::{Node, NodeSummary};

pub const NAME_SCORE: f32 = 1.0;
pub const DESCRIPTION_SCORE: f32 = 0.7;
pub const MEMBERSHIP_SCORE: f32 = 0.4;

/// Search configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Maximum results to return (default: 20)
    pub limit: usize,
    /// Only return public nodes
    pub public_only: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: 20,
            public_only: true,
        }
    }
}

impl SearchConfig {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Which field produced the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    Name,
    Description,
    Tag,
    Figure,
}

impl MatchReason {
    pub fn score(&self) -> f32 {
        match self {
            Self::Name => NAME_SCORE,
            Self::Description => DESCRIPTION_SCORE,
            Self::Tag | Self::Figure => MEMBERSHIP_SCORE,
        }
    }
}

/// Search result with score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub node: NodeSummary,
    pub score: f32,
    pub reason: MatchReason,
}

/// Strongest matching field of `node` for an already lower-cased query
pub fn match_node(node: &Node, query_lower: &str) -> Option<MatchReason> {
    if node.name.to_lowercase().contains(query_lower) {
        return Some(MatchReason::Name);
    }
    if node.description.to_lowercase().contains(query_lower) {
        return Some(MatchReason::Description);
    }
    if node
        .tags
        .iter()
        .any(|t| t.to_lowercase().contains(query_lower))
    {
        return Some(MatchReason::Tag);
    }
    if node
        .figures
        .iter()
        .any(|f| f.to_lowercase().contains(query_lower))
    {
        return Some(MatchReason::Figure);
    }
    None
}

/// Score and rank the index for `query`
///
/// Ordered by score descending, ties by ascending id. A blank query
/// matches nothing.
pub(crate) fn search_index(
    index: &GraphIndex,
    query: &str,
    config: &SearchConfig,
) -> Vec<SearchResult> {
    let query_lower = query.trim().to_lowercase();
    if query_lower.is_empty() || config.limit == 0 {
        return Vec::new();
    }

    let mut results: Vec<SearchResult> = index
        .nodes()
        .filter(|node| !config.public_only || node.is_public())
        .filter_map(|node| {
            match_node(node, &query_lower).map(|reason| SearchResult {
                node: node.summary(),
                score: reason.score(),
                reason,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node.path.cmp(&b.node.path))
    });
    results.truncate(config.limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn node(slug: &str, name: &str, description: &str, tags: &[&str], public: bool) -> Node {
        let mut builder = Node::builder()
            .date(1969, 7, 20)
            .location("united-states", "florida", "cape-canaveral")
            .slug(slug)
            .name(name)
            .description(description)
            .tags(tags.iter().copied());
        if public {
            builder = builder.public();
        }
        builder.build().unwrap().into_node(Utc::now()).unwrap()
    }

    fn index() -> GraphIndex {
        let mut index = GraphIndex::default();
        index.insert_node(node("c-landing", "Moon Landing", "", &[], true));
        index.insert_node(node("b-launch", "Saturn V Launch", "Rocket to the moon", &[], true));
        index.insert_node(node("a-eva", "First EVA", "", &["moonwalk"], true));
        index.insert_node(node("d-secret", "Moon Secret", "", &[], false));
        index.insert_node(node("e-landing", "Moon Landing Replay", "", &[], true));
        index
    }

    #[test]
    fn test_search_config_default() {
        let config = SearchConfig::default();
        assert_eq!(config.limit, 20);
        assert!(config.public_only);
    }

    #[test]
    fn test_relevance_order() {
        let results = search_index(&index(), "MOON", &SearchConfig::default());
        let names: Vec<_> = results.iter().map(|r| r.node.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Moon Landing",
                "Moon Landing Replay",
                "Saturn V Launch",
                "First EVA"
            ]
        );
        assert_eq!(results[0].score, NAME_SCORE);
        assert_eq!(results[2].reason, MatchReason::Description);
        assert_eq!(results[3].reason, MatchReason::Tag);
    }

    #[test]
    fn test_search_excludes_drafts() {
        let results = search_index(&index(), "secret", &SearchConfig::default());
        assert!(results.is_empty());

        let config = SearchConfig {
            public_only: false,
            ..Default::default()
        };
        assert_eq!(search_index(&index(), "secret", &config).len(), 1);
    }

    #[test]
    fn test_limit_and_blank_query() {
        let config = SearchConfig::default().with_limit(2);
        assert_eq!(search_index(&index(), "moon", &config).len(), 2);
        assert!(search_index(&index(), "   ", &SearchConfig::default()).is_empty());
    }

    #[test]
    fn test_figure_match() {
        let mut n = node("f-armstrong", "Small Step", "", &[], true);
        n.figures.insert("Neil Armstrong".into());
        assert_eq!(match_node(&n, "armstrong"), Some(MatchReason::Figure));
        assert_eq!(match_node(&n, "aldrin"), None);
    }
}
