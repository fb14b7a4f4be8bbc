//! Error types for clockchain-graph

use thiserror::Error;

/// Errors that can occur in the graph store
#[derive(Debug, Error)]
pub enum GraphError {
    /// RocksDB error
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// Serialization error (bincode)
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A field violates its shape
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// A canonical path failed to decode
    #[error("Malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    /// Unknown edge type name
    #[error("Invalid edge type: {0}. Must be one of causes, contemporaneous, same_location, thematic")]
    InvalidEdgeType(String),

    /// Node not found
    #[error("Node not found: {0}")]
    NotFound(String),

    /// Edge endpoint does not exist
    #[error("Edge endpoint does not exist: {0}")]
    Referential(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl GraphError {
    /// Create an invalid field error
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Create a malformed path error
    pub fn malformed_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create a referential error
    pub fn referential(id: impl Into<String>) -> Self {
        Self::Referential(id.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for errors caused by caller input rather than the store itself
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidField { .. }
                | Self::MalformedPath { .. }
                | Self::InvalidEdgeType(_)
                | Self::Referential(_)
        )
    }

    /// True when the addressed node does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_field_display() {
        let err = GraphError::invalid_field("country", "must be kebab-case");
        assert_eq!(
            err.to_string(),
            "Invalid field 'country': must be kebab-case"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn test_not_found_classification() {
        let err = GraphError::not_found("/1969/july/20/2056/us/fl/cc/x");
        assert!(err.is_not_found());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_referential_is_validation() {
        assert!(GraphError::referential("/missing").is_validation());
        assert!(GraphError::InvalidEdgeType("likes".into()).is_validation());
    }
}
