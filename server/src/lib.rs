//! Clockchain Server Library
//!
//! Render job management, the frontier expansion and today-in-history
//! loops, and the JSON-RPC tool surface over the Clockchain graph store.

pub mod backend;
pub mod config;
pub mod daily;
pub mod error;
pub mod expander;
pub mod jobs;
pub mod mcp;
pub mod providers;

pub use backend::Backend;
pub use config::Settings;
pub use error::{Result, ServerError};
pub use expander::{ExpansionOutcome, GraphExpander};
pub use jobs::{Job, JobManager, JobParams, JobStatus};
