//! Error types for the Clockchain server.

use clockchain_graph::GraphError;
use thiserror::Error;

use crate::mcp::protocol::JsonRpcError;
use crate::providers::ProviderError;

/// JSON-RPC code for an unknown node or job
pub const NOT_FOUND_CODE: i32 = -32001;
/// JSON-RPC code for a downstream provider failure; the caller may retry later
pub const UNAVAILABLE_CODE: i32 = -32002;
/// JSON-RPC code for a privileged tool called without valid credentials
pub const FORBIDDEN_CODE: i32 = -32003;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Rejected by moderation: {reason}")]
    ModerationRejected { reason: String },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the caller can do about an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Fix the request and try again
    InvalidInput,
    /// The referenced node or job does not exist
    NotFound,
    /// A downstream service failed; try later
    Unavailable,
    /// Credentials missing or wrong
    Forbidden,
    Internal,
}

impl ServerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Graph(e) if e.is_validation() => ErrorClass::InvalidInput,
            Self::Graph(e) if e.is_not_found() => ErrorClass::NotFound,
            Self::Graph(_) => ErrorClass::Internal,
            Self::JobNotFound(_) => ErrorClass::NotFound,
            Self::ModerationRejected { .. } | Self::InvalidInput(_) => ErrorClass::InvalidInput,
            Self::Provider(_) => ErrorClass::Unavailable,
            Self::Forbidden(_) => ErrorClass::Forbidden,
            Self::Config(_) | Self::Io(_) => ErrorClass::Internal,
        }
    }
}

impl From<ServerError> for JsonRpcError {
    fn from(err: ServerError) -> Self {
        let message = err.to_string();
        match err.class() {
            ErrorClass::InvalidInput => JsonRpcError::invalid_params(message),
            ErrorClass::NotFound => JsonRpcError::new(NOT_FOUND_CODE, message),
            ErrorClass::Unavailable => JsonRpcError::new(UNAVAILABLE_CODE, message),
            ErrorClass::Forbidden => JsonRpcError::new(FORBIDDEN_CODE, message),
            ErrorClass::Internal => JsonRpcError::internal_error(message),
        }
    }
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
