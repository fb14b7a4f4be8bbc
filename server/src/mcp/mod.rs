//! JSON-RPC tool surface
//!
//! Exposes the graph, render jobs and expansion to AI clients as a set of
//! tools over line-delimited JSON-RPC 2.0 on stdio.
//!
//! ## Usage
//!
//! ```bash
//! clockchain --data-dir ./data --seed-file seeds.json
//! ```

pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::*;
pub use server::McpServer;
