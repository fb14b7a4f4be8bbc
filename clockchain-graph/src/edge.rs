//! Edge types and records

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Separator between the parts of an edge key; never valid inside a path
pub(crate) const KEY_SEP: char = '\x1f';

/// Relationship kinds between two moments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Explicit causal link, never inferred
    Causes,
    /// Years at most one apart
    Contemporaneous,
    /// Same country, region and city
    SameLocation,
    /// Overlapping tags
    Thematic,
}

impl EdgeType {
    pub const ALL: [EdgeType; 4] = [
        EdgeType::Causes,
        EdgeType::Contemporaneous,
        EdgeType::SameLocation,
        EdgeType::Thematic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Causes => "causes",
            Self::Contemporaneous => "contemporaneous",
            Self::SameLocation => "same_location",
            Self::Thematic => "thematic",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "causes" => Ok(Self::Causes),
            "contemporaneous" => Ok(Self::Contemporaneous),
            "same_location" => Ok(Self::SameLocation),
            "thematic" => Ok(Self::Thematic),
            _ => Err(GraphError::InvalidEdgeType(s.to_string())),
        }
    }
}

/// Primary key of an edge: a (source, target, type) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
    pub kind: EdgeType,
}

impl EdgeKey {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
        }
    }

    /// RocksDB key for this triple
    pub fn storage_key(&self) -> String {
        format!(
            "edge:{}{sep}{}{sep}{}",
            self.source,
            self.target,
            self.kind,
            sep = KEY_SEP
        )
    }
}

/// A directed, typed, weighted relation between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeType,
    pub weight: f32,
    /// Human-readable reason, set for thematic edges
    #[serde(default)]
    pub theme: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            weight: 1.0,
            theme: None,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source.clone(), self.target.clone(), self.kind)
    }
}

/// Direction of an edge relative to the node it was looked up from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// An incident edge with its far endpoint resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neighbor {
    pub direction: Direction,
    /// Id of the endpoint that is not the queried node
    pub node_id: String,
    pub node_name: String,
    #[serde(rename = "type")]
    pub kind: EdgeType,
    pub weight: f32,
    pub theme: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_type_parse() {
        assert_eq!("causes".parse::<EdgeType>().unwrap(), EdgeType::Causes);
        assert_eq!(
            "Same_Location".parse::<EdgeType>().unwrap(),
            EdgeType::SameLocation
        );
        let err = "inspired".parse::<EdgeType>().unwrap_err();
        assert!(matches!(err, GraphError::InvalidEdgeType(ref s) if s == "inspired"));
    }

    #[test]
    fn test_edge_type_serde_names() {
        let json = serde_json::to_string(&EdgeType::SameLocation).unwrap();
        assert_eq!(json, "\"same_location\"");
        for kind in EdgeType::ALL {
            assert_eq!(kind.as_str().parse::<EdgeType>().unwrap(), kind);
        }
    }

    #[test]
    fn test_storage_key_is_unambiguous() {
        let key = EdgeKey::new("/a", "/b", EdgeType::Thematic);
        assert_eq!(key.storage_key(), "edge:/a\x1f/b\x1fthematic");
    }

    #[test]
    fn test_edge_builder() {
        let edge = Edge::new("/a", "/b", EdgeType::Thematic)
            .with_weight(0.3)
            .with_theme("space, science");
        assert_eq!(edge.weight, 0.3);
        assert_eq!(edge.theme.as_deref(), Some("space, science"));
        assert_eq!(edge.key(), EdgeKey::new("/a", "/b", EdgeType::Thematic));
    }
}
