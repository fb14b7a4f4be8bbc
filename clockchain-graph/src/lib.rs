//! Clockchain Graph
//!
//! Persistent spatiotemporal graph of historical moments. Every moment is
//! addressed by a canonical path derived from its own date and location,
//! and new moments are linked to existing ones automatically.
//!
//! ## Features
//!
//! - **Canonical paths** - `/1969/july/20/2056/united-states/florida/cape-canaveral/apollo-11`
//! - **Auto-linking** - contemporaneous, same-location and thematic edges inferred on insert
//! - **Frontier queries** - find under-connected moments to grow the graph from
//! - **RocksDB persistence** - bincode records with in-memory secondary indexes
//!
//! ## Example
//!
//! ```ignore
//! use clockchain_graph::{GraphStore, Node, SearchConfig};
//!
//! let store = GraphStore::open(&data_dir)?;
//!
//! let draft = Node::builder()
//!     .date(1969, 7, 20)
//!     .time("2056")
//!     .location("united-states", "florida", "cape-canaveral")
//!     .name("Apollo 11 Moon Landing")
//!     .tag("space")
//!     .public()
//!     .build()?;
//!
//! let outcome = store.add_node(draft)?;
//! let hits = store.search("apollo", &SearchConfig::default());
//! ```

pub mod edge;
pub mod error;
mod index;
pub mod migration;
pub mod node;
pub mod search;
pub mod storage;
pub mod tdf;
pub mod temporal;
pub mod url;

// Re-exports for convenience
pub use edge::{Direction, Edge, EdgeKey, EdgeType, Neighbor};
pub use error::{GraphError, Result};
pub use node::{
    ContentRef, Layer, MonthValue, Node, NodeBuilder, NodeBuilderError, NodeDraft, NodeInput,
    NodeSummary, NodeUpdate, Visibility, DEFAULT_TIME,
};
pub use search::{MatchReason, SearchConfig, SearchResult};
pub use storage::{
    AddNodeOutcome, BrowseItem, EdgeInput, GraphStats, GraphStore, IngestReport, SeedFile,
    AUTO_LINK_WEIGHT, THEMATIC_WEIGHT,
};
pub use temporal::RecordTimestamps;
pub use url::{decode, decode_partial, encode, slugify, PathFields, PathPrefix};
